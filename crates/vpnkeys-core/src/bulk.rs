//! Bulk operation coordinator
//!
//! A batch is a sequence of independent single-key operations processed in
//! input order. Ids are not deduplicated, so a repeated id repeats its side
//! effect. Unknown ids and invalid items are skipped, other per-item
//! failures are recorded, and only an unavailable dependency aborts the
//! rest of the batch.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::keys::KeyStore;
use crate::notify::KeyNotifier;
use crate::sessions::SessionLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOperation {
    Block,
    Unblock,
    Delete,
    SendTg,
    SendMail,
    Fix,
    ClearTraffic,
}

impl BulkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperation::Block => "block",
            BulkOperation::Unblock => "unblock",
            BulkOperation::Delete => "delete",
            BulkOperation::SendTg => "send_tg",
            BulkOperation::SendMail => "send_mail",
            BulkOperation::Fix => "fix",
            BulkOperation::ClearTraffic => "clear_traffic",
        }
    }

    /// Result label reported by the HTTP surface
    pub fn result_label(&self) -> &'static str {
        match self {
            BulkOperation::Block => "blocked_bulk",
            BulkOperation::Unblock => "unblocked_bulk",
            BulkOperation::Delete => "deleted_bulk",
            BulkOperation::SendTg | BulkOperation::SendMail => "sent_bulk",
            BulkOperation::Fix => "fixed_bulk",
            BulkOperation::ClearTraffic => "cleared_bulk",
        }
    }
}

impl fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "block" => Ok(BulkOperation::Block),
            "unblock" => Ok(BulkOperation::Unblock),
            "delete" => Ok(BulkOperation::Delete),
            "send_tg" => Ok(BulkOperation::SendTg),
            "send_mail" => Ok(BulkOperation::SendMail),
            "fix" => Ok(BulkOperation::Fix),
            "clear_traffic" => Ok(BulkOperation::ClearTraffic),
            other => Err(Error::Validation(format!(
                "unknown bulk operation '{}'",
                other
            ))),
        }
    }
}

/// Per-item outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Applied,
    /// Idempotent no-op, e.g. blocking an already blocked key
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    pub id: i32,
    pub code: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkSummary {
    pub operation: BulkOperation,
    pub requested: usize,
    pub applied: usize,
    pub unchanged: usize,
    /// Ids skipped as unknown or invalid
    pub skipped: Vec<i32>,
    pub failed: Vec<BulkFailure>,
}

impl BulkSummary {
    fn new(operation: BulkOperation, requested: usize) -> Self {
        Self {
            operation,
            requested,
            applied: 0,
            unchanged: 0,
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Items the operation went through for, changed or not
    pub fn processed(&self) -> usize {
        self.applied + self.unchanged
    }
}

#[derive(Clone)]
pub struct BulkCoordinator {
    keys: KeyStore,
    ledger: SessionLedger,
    notifier: KeyNotifier,
}

impl BulkCoordinator {
    pub fn new(keys: KeyStore, ledger: SessionLedger, notifier: KeyNotifier) -> Self {
        Self {
            keys,
            ledger,
            notifier,
        }
    }

    pub async fn run(&self, operation: BulkOperation, ids: &[i32]) -> Result<BulkSummary> {
        self.execute(operation, ids, None).await
    }

    /// `send_mail` batch with an optional recipient override for every key
    pub async fn send_mail(&self, ids: &[i32], recipient: Option<&str>) -> Result<BulkSummary> {
        self.execute(BulkOperation::SendMail, ids, recipient).await
    }

    async fn execute(
        &self,
        operation: BulkOperation,
        ids: &[i32],
        recipient: Option<&str>,
    ) -> Result<BulkSummary> {
        let mut summary = BulkSummary::new(operation, ids.len());

        for &id in ids {
            match self.apply(operation, id, recipient).await {
                Ok(Outcome::Applied) => summary.applied += 1,
                Ok(Outcome::Unchanged) => summary.unchanged += 1,
                Err(e) if e.is_fatal() => {
                    warn!(
                        "Bulk {} aborted at key {} after {} item(s): {}",
                        operation,
                        id,
                        summary.processed(),
                        e
                    );
                    return Err(e);
                }
                Err(e) if e.is_skippable() => {
                    warn!("Bulk {} skipped key {}: {}", operation, id, e);
                    summary.skipped.push(id);
                }
                Err(e) => {
                    warn!("Bulk {} failed for key {}: {}", operation, id, e);
                    summary.failed.push(BulkFailure {
                        id,
                        code: e.code(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Bulk {}: {} requested, {} applied, {} unchanged, {} skipped, {} failed",
            operation,
            summary.requested,
            summary.applied,
            summary.unchanged,
            summary.skipped.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    async fn apply(&self, operation: BulkOperation, id: i32, recipient: Option<&str>) -> Result<Outcome> {
        let changed = match operation {
            BulkOperation::Block => self.keys.block(id).await?.changed,
            BulkOperation::Unblock => self.keys.unblock(id).await?.changed,
            BulkOperation::Fix => self.keys.fix(id).await?.changed,
            BulkOperation::Delete => {
                self.keys.delete(id).await?;
                true
            }
            BulkOperation::SendTg => {
                self.notifier.send_via_bot(id).await?;
                true
            }
            BulkOperation::SendMail => {
                self.notifier.send_via_mail(id, recipient).await?;
                true
            }
            BulkOperation::ClearTraffic => self.ledger.clear(id).await? > 0,
        };
        Ok(if changed {
            Outcome::Applied
        } else {
            Outcome::Unchanged
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names_roundtrip() {
        for op in [
            BulkOperation::Block,
            BulkOperation::Unblock,
            BulkOperation::Delete,
            BulkOperation::SendTg,
            BulkOperation::SendMail,
            BulkOperation::Fix,
            BulkOperation::ClearTraffic,
        ] {
            assert_eq!(op.as_str().parse::<BulkOperation>().unwrap(), op);
        }
        assert!(matches!(
            "explode".parse::<BulkOperation>(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_result_labels() {
        assert_eq!(BulkOperation::Block.result_label(), "blocked_bulk");
        assert_eq!(BulkOperation::SendMail.result_label(), "sent_bulk");
        assert_eq!(BulkOperation::ClearTraffic.result_label(), "cleared_bulk");
    }
}

//! Query/filter engine over keys and their usage
//!
//! A criterion name plus an optional raw value resolves into an ordered,
//! fully materialized list of [`KeyView`]s. Every list carries its own
//! 1-based index.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    QueryTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use vpnkeys_db::entities::{access_key, vpn_config};

use crate::error::{Error, Result};
use crate::format::format_bytes;
use crate::keys::is_expired;
use crate::sessions::{KeyUsage, SessionLedger};
use crate::{Config, Key};

/// Named filter/sort mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Criterion {
    All,
    Name,
    Email,
    Status,
    Port,
    Config,
    Protocol,
    Days,
    Created,
    Updated,
    Date,
    Expired,
    ExpiredDays,
    Traffic,
    Sessions,
    ConnectedTime,
    FreeKeys,
}

impl Criterion {
    pub const ALL: [Criterion; 17] = [
        Criterion::All,
        Criterion::Name,
        Criterion::Email,
        Criterion::Status,
        Criterion::Port,
        Criterion::Config,
        Criterion::Protocol,
        Criterion::Days,
        Criterion::Created,
        Criterion::Updated,
        Criterion::Date,
        Criterion::Expired,
        Criterion::ExpiredDays,
        Criterion::Traffic,
        Criterion::Sessions,
        Criterion::ConnectedTime,
        Criterion::FreeKeys,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::All => "all",
            Criterion::Name => "name",
            Criterion::Email => "email",
            Criterion::Status => "status",
            Criterion::Port => "port",
            Criterion::Config => "config",
            Criterion::Protocol => "protocol",
            Criterion::Days => "days",
            Criterion::Created => "created",
            Criterion::Updated => "updated",
            Criterion::Date => "date",
            Criterion::Expired => "expired",
            Criterion::ExpiredDays => "expired_days",
            Criterion::Traffic => "traffic",
            Criterion::Sessions => "sessions",
            Criterion::ConnectedTime => "connected_time",
            Criterion::FreeKeys => "free_keys",
        }
    }

    /// Whether the criterion filters by a caller-supplied value
    pub fn takes_value(&self) -> bool {
        matches!(
            self,
            Criterion::Name
                | Criterion::Email
                | Criterion::Status
                | Criterion::Port
                | Criterion::Config
                | Criterion::Protocol
                | Criterion::Days
                | Criterion::Created
                | Criterion::Updated
                | Criterion::Date
        )
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Criterion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Criterion::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| {
                let known: Vec<&str> = Criterion::ALL.iter().map(|c| c.as_str()).collect();
                Error::Validation(format!(
                    "unknown criterion '{}', expected one of: {}",
                    name,
                    known.join(", ")
                ))
            })
    }
}

/// A value that either parsed into its intended type or is kept verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coerced<T> {
    Typed(T),
    Raw(String),
}

impl<T> Coerced<T> {
    pub fn typed(&self) -> Option<&T> {
        match self {
            Coerced::Typed(value) => Some(value),
            Coerced::Raw(_) => None,
        }
    }
}

/// Parsed filter value of a criterion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    None,
    Text(String),
    Int(Coerced<i32>),
    Bool(Coerced<bool>),
    Date(NaiveDate),
}

fn coerce_bool(raw: &str) -> Coerced<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Coerced::Typed(true),
        "false" | "0" | "no" | "off" => Coerced::Typed(false),
        _ => Coerced::Raw(raw.to_string()),
    }
}

fn coerce_int(raw: &str) -> Coerced<i32> {
    raw.trim()
        .parse()
        .map(Coerced::Typed)
        .unwrap_or_else(|_| Coerced::Raw(raw.to_string()))
}

/// Coerce a raw query value for `criterion`.
///
/// Unparseable integers and booleans are passed through as [`Coerced::Raw`]
/// and match no key. A missing value for a value-taking criterion and a
/// malformed date are validation errors.
pub fn parse_value(criterion: Criterion, raw: Option<&str>) -> Result<FilterValue> {
    if !criterion.takes_value() {
        return Ok(FilterValue::None);
    }
    let raw = raw.ok_or_else(|| {
        Error::Validation(format!("criterion '{}' requires a value", criterion))
    })?;

    Ok(match criterion {
        Criterion::Port | Criterion::Config | Criterion::Days => FilterValue::Int(coerce_int(raw)),
        Criterion::Status => FilterValue::Bool(coerce_bool(raw)),
        Criterion::Created | Criterion::Updated | Criterion::Date => {
            let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
                Error::Validation(format!("'{}' is not a YYYY-MM-DD date: {}", raw, e))
            })?;
            FilterValue::Date(date)
        }
        _ => FilterValue::Text(raw.to_string()),
    })
}

/// A key rendered for listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyView {
    /// Position within this result set, starting at 1
    pub index: usize,
    pub id: i32,
    pub name: String,
    pub days: i32,
    pub email: Option<String>,
    pub config_id: i32,
    pub port: Option<i32>,
    pub protocol: Option<vpn_config::Protocol>,
    pub address: Option<String>,
    pub status: bool,
    pub connected: bool,
    pub expired: bool,
    pub days_left: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub total_bytes: i64,
    /// `total_bytes` in human units
    pub traffic: String,
    pub sessions: u64,
    /// Seconds
    pub connected_time: i64,
}

impl KeyView {
    pub fn render(
        index: usize,
        key: &Key,
        config: Option<&Config>,
        usage: KeyUsage,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            index,
            id: key.id,
            name: key.name.clone(),
            days: key.days,
            email: key.email.clone(),
            config_id: key.config_id,
            port: config.map(|c| c.port),
            protocol: config.map(|c| c.protocol),
            address: config.map(|c| c.address.clone()),
            status: key.status,
            connected: key.connected,
            expired: is_expired(key, now),
            days_left: (key.expires_at - now).num_days().max(0),
            created: key.created,
            updated: key.updated,
            expiry: key.expires_at,
            total_bytes: usage.total_bytes,
            traffic: format_bytes(usage.total_bytes),
            sessions: usage.sessions,
            connected_time: usage.connected_time,
        }
    }
}

fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + chrono::Duration::days(1))
}

fn on_day(column: access_key::Column, date: NaiveDate) -> Condition {
    let (start, end) = day_bounds(date);
    Condition::all().add(column.gte(start)).add(column.lt(end))
}

fn config_column_in(column: vpn_config::Column, value: sea_orm::Value) -> Condition {
    Condition::all().add(
        access_key::Column::ConfigId.in_subquery(
            vpn_config::Entity::find()
                .select_only()
                .column(vpn_config::Column::Id)
                .filter(column.eq(value))
                .into_query(),
        ),
    )
}

/// Filter for a criterion, or `None` when nothing can match
fn filter_for(criterion: Criterion, value: &FilterValue, now: DateTime<Utc>) -> Option<Condition> {
    let all = Condition::all();
    match (criterion, value) {
        (Criterion::Name, FilterValue::Text(name)) => {
            Some(all.add(access_key::Column::Name.eq(name.as_str())))
        }
        (Criterion::Email, FilterValue::Text(email)) => {
            Some(all.add(access_key::Column::Email.eq(email.as_str())))
        }
        (Criterion::Status, FilterValue::Bool(status)) => status
            .typed()
            .map(|s| all.add(access_key::Column::Status.eq(*s))),
        (Criterion::Config, FilterValue::Int(id)) => id
            .typed()
            .map(|id| all.add(access_key::Column::ConfigId.eq(*id))),
        (Criterion::Days, FilterValue::Int(days)) => days
            .typed()
            .map(|d| all.add(access_key::Column::Days.eq(*d))),
        (Criterion::Port, FilterValue::Int(port)) => port
            .typed()
            .map(|p| config_column_in(vpn_config::Column::Port, (*p).into())),
        (Criterion::Protocol, FilterValue::Text(raw)) => raw
            .parse::<vpn_config::Protocol>()
            .ok()
            .map(|p| config_column_in(vpn_config::Column::Protocol, p.as_str().into())),
        (Criterion::Created, FilterValue::Date(date)) => {
            Some(on_day(access_key::Column::Created, *date))
        }
        (Criterion::Updated, FilterValue::Date(date)) => {
            Some(on_day(access_key::Column::Updated, *date))
        }
        (Criterion::Date, FilterValue::Date(date)) => Some(
            Condition::any()
                .add(on_day(access_key::Column::Created, *date))
                .add(on_day(access_key::Column::Updated, *date)),
        ),
        (Criterion::Expired, _) => Some(all.add(access_key::Column::ExpiresAt.lt(now))),
        (Criterion::FreeKeys, _) => Some(
            all.add(access_key::Column::Connected.eq(false))
                .add(access_key::Column::Status.eq(true)),
        ),
        (
            Criterion::All
            | Criterion::ExpiredDays
            | Criterion::Traffic
            | Criterion::Sessions
            | Criterion::ConnectedTime,
            _,
        ) => Some(all),
        // Value shape that does not belong to the criterion
        _ => None,
    }
}

/// Order a creation-ordered list for the criterion; stable, so ties keep
/// creation order
fn order_for(criterion: Criterion, views: &mut [KeyView]) {
    match criterion {
        Criterion::Expired | Criterion::ExpiredDays => views.sort_by_key(|v| v.expiry),
        Criterion::Traffic => views.sort_by(|a, b| b.total_bytes.cmp(&a.total_bytes)),
        Criterion::Sessions => views.sort_by(|a, b| b.sessions.cmp(&a.sessions)),
        Criterion::ConnectedTime => views.sort_by(|a, b| b.connected_time.cmp(&a.connected_time)),
        _ => {}
    }
}

#[derive(Clone)]
pub struct KeyQuery {
    db: DatabaseConnection,
    ledger: SessionLedger,
}

impl KeyQuery {
    pub fn new(db: DatabaseConnection, ledger: SessionLedger) -> Self {
        Self { db, ledger }
    }

    /// Resolve a criterion given by name, e.g. from a query string
    pub async fn list(&self, by: &str, value: Option<&str>) -> Result<Vec<KeyView>> {
        let criterion: Criterion = by.parse()?;
        self.list_by_criteria(criterion, value).await
    }

    pub async fn list_by_criteria(
        &self,
        criterion: Criterion,
        raw: Option<&str>,
    ) -> Result<Vec<KeyView>> {
        let value = parse_value(criterion, raw)?;
        let now = Utc::now();

        let Some(condition) = filter_for(criterion, &value, now) else {
            debug!("Criterion {} with value {:?} matches nothing", criterion, value);
            return Ok(Vec::new());
        };
        let keys = access_key::Entity::find()
            .filter(condition)
            .order_by_asc(access_key::Column::Created)
            .order_by_asc(access_key::Column::Id)
            .all(&self.db)
            .await?;

        let mut views = self.render_all(&keys, now).await?;
        order_for(criterion, &mut views);
        for (position, view) in views.iter_mut().enumerate() {
            view.index = position + 1;
        }

        debug!("Criterion {} matched {} key(s)", criterion, views.len());
        Ok(views)
    }

    /// Keys of one config, in creation order
    pub async fn list_by_config(&self, config_id: i32) -> Result<Vec<KeyView>> {
        if vpn_config::Entity::find_by_id(config_id)
            .one(&self.db)
            .await?
            .is_none()
        {
            return Err(Error::config_not_found(config_id));
        }
        self.list_by_criteria(Criterion::Config, Some(&config_id.to_string()))
            .await
    }

    /// One key rendered on its own (index 1)
    pub async fn view(&self, key_id: i32) -> Result<KeyView> {
        let (key, config) = access_key::Entity::find_by_id(key_id)
            .find_also_related(vpn_config::Entity)
            .one(&self.db)
            .await?
            .ok_or_else(|| Error::key_not_found(key_id))?;
        let usage = self.ledger.usage_of_key(key_id).await?;
        Ok(KeyView::render(1, &key, config.as_ref(), usage, Utc::now()))
    }

    async fn render_all(&self, keys: &[Key], now: DateTime<Utc>) -> Result<Vec<KeyView>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let configs: HashMap<i32, Config> = vpn_config::Entity::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        let usage = self.ledger.usage_by_key().await?;

        Ok(keys
            .iter()
            .map(|key| {
                KeyView::render(
                    0,
                    key,
                    configs.get(&key.config_id),
                    usage.get(&key.id).copied().unwrap_or_default(),
                    now,
                )
            })
            .collect())
    }
}

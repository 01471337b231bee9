//! External command execution with captured output

use std::ffi::OsStr;
use tokio::process::Command;
use tracing::debug;

use vpnkeys_core::CollaboratorError;

/// Run `program args...` to completion.
///
/// Success yields trimmed stdout. A non-zero exit yields an error carrying
/// stderr, or stdout when stderr is empty.
pub async fn run<I, S>(program: &str, args: I) -> Result<String, CollaboratorError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    debug!(
        "Running {} {}",
        program,
        args.iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let output = Command::new(program)
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| CollaboratorError(format!("failed to execute {}: {}", program, e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if output.status.success() {
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let detail = if stderr.is_empty() { stdout } else { stderr };
    Err(CollaboratorError(format!(
        "{} exited with {}: {}",
        program, output.status, detail
    )))
}

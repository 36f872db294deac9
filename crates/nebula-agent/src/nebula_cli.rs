//! Thin async wrapper around the `nebula` daemon binary, grounded on
//! `nebula-cert`'s `CertCli` -- every call shells out and can fail with
//! `ErrorKind::External`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use nebula_error::{NebulaError, Result};
use tokio::process::{Child, Command};
use tokio::time::timeout;

/// Version-probe subprocess timeout (spec §5).
pub const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// `-test -config` validation subprocess timeout.
pub const VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Invokes a `nebula` executable found at `binary_path`.
#[derive(Debug, Clone)]
pub struct NebulaCli {
    binary_path: String,
}

impl NebulaCli {
    #[must_use]
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self { binary_path: binary_path.into() }
    }

    /// `nebula -version`, parsed from a `Version: x.y.z` line. Returns
    /// `None` if the binary is missing, times out, or the output doesn't
    /// contain a recognizable version line -- callers treat that as
    /// "unknown" and skip upgrade checks rather than failing the cycle.
    pub async fn version(&self) -> Option<String> {
        let output = timeout(VERSION_PROBE_TIMEOUT, Command::new(&self.binary_path).arg("-version").output())
            .await
            .ok()?
            .ok()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.lines().find_map(|line| line.strip_prefix("Version:").map(|v| v.trim().to_string()))
    }

    /// `nebula -test -config <path>`. `Ok(())` on a zero exit; otherwise an
    /// `External` error carrying stderr, so the supervisor can log why it
    /// refused to restart.
    pub async fn validate_config(&self, config_path: &Path) -> Result<()> {
        let output = timeout(
            VALIDATE_TIMEOUT,
            Command::new(&self.binary_path).args(["-test", "-config"]).arg(config_path).output(),
        )
        .await
        .map_err(|_| NebulaError::external("nebula -test -config timed out"))?
        .map_err(|err| NebulaError::external(format!("failed to spawn nebula: {err}")))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(NebulaError::validation(format!("nebula config validation failed: {stderr}")))
    }

    /// Spawn `nebula -config <path>` detached, stdout/stderr captured so the
    /// supervisor can surface them if the process exits immediately.
    ///
    /// On Unix the child naturally survives the agent's own signal handling
    /// since it isn't part of the agent's process group session in the way
    /// a foreground child would be; on Windows, `CREATE_NEW_PROCESS_GROUP`
    /// plus `DETACHED_PROCESS` achieves the same independence (spec §4.5).
    pub fn spawn_detached(&self, config_path: &Path) -> Result<Child> {
        let mut command = Command::new(&self.binary_path);
        command.arg("-config").arg(config_path).stdout(Stdio::piped()).stderr(Stdio::piped());

        #[cfg(windows)]
        {
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            std::os::windows::process::CommandExt::creation_flags(
                &mut command,
                DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP,
            );
        }

        command.spawn().map_err(|err| NebulaError::external(format!("failed to spawn nebula: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_version_line() {
        let stdout = "Version: 1.9.7\nBuild: abc123\n";
        let parsed =
            stdout.lines().find_map(|line| line.strip_prefix("Version:").map(|v| v.trim().to_string()));
        assert_eq!(parsed.as_deref(), Some("1.9.7"));
    }

    #[tokio::test]
    async fn version_of_a_nonexistent_binary_is_none() {
        let cli = NebulaCli::new("/nonexistent/nebula-binary-for-tests");
        assert!(cli.version().await.is_none());
    }
}

//! Thin async wrapper around the external `nebula-cert` CLI binary.
//!
//! Every call shells out, so every call can fail with `ErrorKind::External`
//! (nonzero exit, or the process outliving its timeout). stderr is surfaced
//! verbatim in the error message; `sign` additionally classifies one known
//! message into a validation error, per the taxonomy in spec §7.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nebula_error::{NebulaError, Result};
use tokio::process::Command;
use tokio::time::timeout;

/// Default timeout for `keygen`/`ca`/`sign`/`print` subprocess calls.
pub const DEFAULT_SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Certificate validity window and content-hash fingerprint parsed from
/// `nebula-cert print -json`.
#[derive(Debug, Clone)]
pub struct CertInfo {
    /// Start of the certificate's validity window.
    pub not_before: DateTime<Utc>,
    /// End of the certificate's validity window.
    pub not_after: DateTime<Utc>,
    /// `None` when the field is absent or unparseable; tolerated per spec.
    pub fingerprint: Option<String>,
}

/// Invokes the `nebula-cert` binary found at `binary_path`.
#[derive(Debug, Clone)]
pub struct CertCli {
    binary_path: String,
    timeout: Duration,
}

impl CertCli {
    /// Point at a `nebula-cert` executable, using the default 30s timeout.
    #[must_use]
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self { binary_path: binary_path.into(), timeout: DEFAULT_SUBPROCESS_TIMEOUT }
    }

    /// Override the per-call timeout (tests use a shorter one).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, args: &[&str], cwd: &Path) -> Result<Output> {
        let mut command = Command::new(&self.binary_path);
        command.args(args).current_dir(cwd);

        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| NebulaError::external(format!("nebula-cert {args:?} timed out")))?
            .map_err(|err| {
                NebulaError::external(format!("failed to spawn nebula-cert: {err}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("did not contain a valid PEM") {
                return Err(NebulaError::validation(format!(
                    "nebula-cert rejected the supplied key material: {stderr}"
                )));
            }
            return Err(NebulaError::external(format!(
                "nebula-cert {args:?} exited with {}: {stderr}",
                output.status
            )));
        }
        Ok(output)
    }

    /// `nebula-cert keygen -out-key <out_key> -out-pub <out_pub>`.
    pub async fn keygen(&self, cwd: &Path, out_key: &Path, out_pub: &Path) -> Result<()> {
        self.run(
            &[
                "keygen",
                "-out-key",
                &out_key.to_string_lossy(),
                "-out-pub",
                &out_pub.to_string_lossy(),
            ],
            cwd,
        )
        .await?;
        Ok(())
    }

    /// `nebula-cert ca -name <name> -duration <duration_hours>h`, writing
    /// `ca.crt`/`ca.key` into `cwd`.
    pub async fn ca(&self, cwd: &Path, name: &str, duration_hours: i64) -> Result<()> {
        self.run(&["ca", "-name", name, "-duration", &format!("{duration_hours}h")], cwd).await?;
        Ok(())
    }

    /// `nebula-cert sign -name <name> -ip <ip>... -duration <h>h -ca-crt
    /// <ca_crt> -ca-key <ca_key> -in-pub <in_pub> -out-crt <out_crt> [-groups
    /// <csv>]`.
    #[allow(clippy::too_many_arguments)]
    pub async fn sign(
        &self,
        cwd: &Path,
        name: &str,
        ips: &[String],
        duration_hours: i64,
        ca_crt: &Path,
        ca_key: &Path,
        in_pub: &Path,
        out_crt: &Path,
        groups_csv: Option<&str>,
    ) -> Result<()> {
        let mut args: Vec<String> = vec!["sign".into(), "-name".into(), name.into()];
        for ip in ips {
            args.push("-ip".into());
            args.push(ip.clone());
        }
        args.push("-duration".into());
        args.push(format!("{duration_hours}h"));
        args.push("-ca-crt".into());
        args.push(ca_crt.to_string_lossy().into_owned());
        args.push("-ca-key".into());
        args.push(ca_key.to_string_lossy().into_owned());
        args.push("-in-pub".into());
        args.push(in_pub.to_string_lossy().into_owned());
        args.push("-out-crt".into());
        args.push(out_crt.to_string_lossy().into_owned());
        if let Some(groups) = groups_csv {
            args.push("-groups".into());
            args.push(groups.into());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs, cwd).await?;
        Ok(())
    }

    /// `nebula-cert print -json -path <path>`, best-effort parsed.
    pub async fn print_json(&self, cwd: &Path, path: &Path) -> Result<CertInfo> {
        let output = self.run(&["print", "-json", "-path", &path.to_string_lossy()], cwd).await?;
        let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        parse_cert_info(&value)
    }
}

fn find_str<'a>(value: &'a serde_json::Value, keys: &[&str]) -> Option<&'a str> {
    for key in keys {
        if let Some(s) = value.get(key).and_then(serde_json::Value::as_str) {
            return Some(s);
        }
        if let Some(details) = value.get("details") {
            if let Some(s) = details.get(key).and_then(serde_json::Value::as_str) {
                return Some(s);
            }
        }
    }
    None
}

fn parse_cert_info(value: &serde_json::Value) -> Result<CertInfo> {
    let not_before = find_str(value, &["notBefore", "not_before", "NotBefore"])
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            NebulaError::external("nebula-cert print -json missing a parseable notBefore")
        })?;
    let not_after = find_str(value, &["notAfter", "not_after", "NotAfter"])
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            NebulaError::external("nebula-cert print -json missing a parseable notAfter")
        })?;
    let fingerprint =
        find_str(value, &["fingerprint", "Fingerprint"]).map(std::string::ToString::to_string);
    Ok(CertInfo { not_before, not_after, fingerprint })
}

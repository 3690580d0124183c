use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};

/// Verify that the container engine daemon is reachable.
pub fn ensure_available(engine: &str) -> Result<()> {
    let status = Command::new(engine)
        .args(["version", "--format", "{{.Server.Version}}"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("failed to invoke `{engine}`; is it installed and on PATH?"))?;

    if !status.success() {
        bail!("{engine} daemon is not running (exit {status})");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_available_does_not_panic() {
        // CI may or may not have Docker.
        let _ = ensure_available("docker");
    }

    #[test]
    fn missing_engine_is_an_error() {
        let err = ensure_available("no-such-engine-shipcheck").unwrap_err();
        assert!(err.to_string().contains("no-such-engine-shipcheck"));
    }
}

//! Device bridge invocation
//!
//! Everything that talks to the device outside the agent socket goes through the
//! `hdc` command line tool. [`Bridge`] is the capability to run it; [`Hdc`] runs
//! the real executable.

use crate::error::{DriverError, Result};
use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Capability to run the device bridge.
///
/// `args` never include the executable itself.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Run the bridge to completion and return its output.
    async fn exec(&self, args: &[String]) -> Result<String>;

    /// Start the bridge in the background and return without waiting on it.
    fn spawn(&self, args: &[String]) -> Result<()>;
}

/// The real `hdc` executable
#[derive(Debug, Clone)]
pub struct Hdc {
    program: PathBuf,
}

impl Hdc {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Hdc {
    fn default() -> Self {
        Self::new("hdc")
    }
}

/// Reject argument lists the bridge cannot make sense of.
pub(crate) fn check_args(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(DriverError::BridgeInvocation("empty argument list".into()));
    }
    if let Some(pos) = args.iter().position(|a| a.trim().is_empty()) {
        return Err(DriverError::BridgeInvocation(format!(
            "blank argument at position {pos} in {args:?}"
        )));
    }
    Ok(())
}

#[async_trait]
impl Bridge for Hdc {
    async fn exec(&self, args: &[String]) -> Result<String> {
        check_args(args)?;
        debug!("=====run command: {} {}", self.program.display(), args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DriverError::Bridge(format!("{}: {e}", self.program.display())))?;

        let mut out = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            out.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        if !output.status.success() {
            debug!("bridge exited with {}", output.status);
        }
        debug!("return: {}", out.trim());
        Ok(out)
    }

    fn spawn(&self, args: &[String]) -> Result<()> {
        check_args(args)?;
        debug!("=====spawn command: {} {}", self.program.display(), args.join(" "));

        let failed = |e: std::io::Error| DriverError::Bridge(format!("{}: {e}", self.program.display()));

        // tokio needs a runtime to spawn; a session dropped after its runtime
        // has gone still gets its cleanup through std.
        if tokio::runtime::Handle::try_current().is_err() {
            std::process::Command::new(&self.program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(failed)?;
            return Ok(());
        }

        // The child is not killed on drop, so it outlives this handle.
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(failed)?;
        Ok(())
    }
}

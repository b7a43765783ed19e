//! In-memory doubles for the bridge seam.
//!
//! [`RecordingBridge`] answers bridge invocations from canned output and keeps a
//! log of everything it was asked to run, so device and session behaviour can
//! be exercised without a phone attached.

use crate::bridge::{check_args, Bridge};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// One recorded bridge invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
    /// Started in the background rather than run to completion
    pub detached: bool,
}

impl Invocation {
    pub fn line(&self) -> String {
        self.args.join(" ")
    }
}

#[derive(Debug, Default)]
struct State {
    rules: Vec<(String, String)>,
    log: Vec<Invocation>,
}

/// Bridge double that replays canned output.
///
/// Clones share their state, so a test can keep one clone for assertions while
/// the session owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingBridge {
    state: Arc<Mutex<State>>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer any invocation whose command line contains `pattern` with `output`.
    /// Earlier rules win.
    pub fn respond(&self, pattern: &str, output: &str) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state.rules.push((pattern.to_string(), output.to_string()));
        }
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state
            .lock()
            .map(|state| state.log.clone())
            .unwrap_or_default()
    }

    /// Command lines of every invocation, in order
    pub fn lines(&self) -> Vec<String> {
        self.invocations().iter().map(Invocation::line).collect()
    }

    pub fn count_containing(&self, pattern: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(pattern)).count()
    }

    fn record(&self, args: &[String], detached: bool) -> String {
        let Ok(mut state) = self.state.lock() else {
            return String::new();
        };
        state.log.push(Invocation {
            args: args.to_vec(),
            detached,
        });
        let line = args.join(" ");
        state
            .rules
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Bridge for RecordingBridge {
    async fn exec(&self, args: &[String]) -> Result<String> {
        check_args(args)?;
        Ok(self.record(args, false))
    }

    fn spawn(&self, args: &[String]) -> Result<()> {
        check_args(args)?;
        self.record(args, true);
        Ok(())
    }
}

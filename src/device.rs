//! Device abstraction - one phone reached through the bridge, addressed by serial

use crate::bridge::Bridge;
use crate::error::{DriverError, Result};
use log::{debug, info, warn};
use std::path::Path;
use std::time::Duration;

/// Where the agent writes screenshots on the device
pub const REMOTE_SCREENSHOT_PATH: &str = "/data/local/tmp/aa.png";

/// Agent invocation timeout in milliseconds, long enough to outlive any session
const AGENT_TIMEOUT_MS: u64 = 86_400_000;

const SCREENSHOT_RECV_WAIT: Duration = Duration::from_secs(5);

/// Device represents a connected phone, similar to an ADB device
#[derive(Debug, Clone)]
pub struct Device<B> {
    bridge: B,
    serial: String,
}

impl<B: Bridge> Device<B> {
    /// Create a new device from a bridge and serial
    pub fn new(bridge: B, serial: &str) -> Result<Self> {
        if serial.trim().is_empty() {
            return Err(DriverError::BridgeInvocation("empty device serial".into()));
        }
        Ok(Self {
            bridge,
            serial: serial.to_string(),
        })
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    fn target_args<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut full = vec!["-t".to_string(), self.serial.clone()];
        full.extend(args.into_iter().map(str::to_string));
        full
    }

    /// Run `hdc -t <serial> <args>` and return its output
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        self.bridge.exec(&self.target_args(args.iter().copied())).await
    }

    /// Run a shell command split on whitespace, as the bridge receives separate words
    pub async fn shell(&self, cmd: &str) -> Result<String> {
        let args = self.target_args(std::iter::once("shell").chain(cmd.split_whitespace()));
        self.bridge.exec(&args).await
    }

    /// Run a shell command passed as one argument, for pipelines and `;` chains
    pub async fn shell_quoted(&self, cmd: &str) -> Result<String> {
        self.bridge.exec(&self.target_args(["shell", cmd])).await
    }

    /// Start a shell command in the background without waiting for it
    pub fn shell_detached(&self, cmd: &str) -> Result<()> {
        let args = self.target_args(std::iter::once("shell").chain(cmd.split_whitespace()));
        self.bridge.spawn(&args)
    }

    pub async fn forward(&self, local: u16, remote: u16) -> Result<String> {
        let (l, r) = (format!("tcp:{local}"), format!("tcp:{remote}"));
        self.run(&["fport", &l, &r]).await
    }

    pub async fn remove_forward(&self, local: u16, remote: u16) -> Result<String> {
        let (l, r) = (format!("tcp:{local}"), format!("tcp:{remote}"));
        self.run(&["fport", "rm", &l, &r]).await
    }

    /// Start removing a forward without waiting for the bridge
    pub fn forward_removal_detached(&self, local: u16, remote: u16) -> Result<()> {
        let (l, r) = (format!("tcp:{local}"), format!("tcp:{remote}"));
        self.bridge.spawn(&self.target_args(["fport", "rm", l.as_str(), r.as_str()]))
    }

    pub async fn list_forwards(&self) -> Result<String> {
        self.run(&["fport", "ls"]).await
    }

    /// Pids of processes whose command line carries `key`; empty when none run.
    pub async fn pid_of(&self, key: &str) -> Result<Vec<u32>> {
        let probes = [
            format!("ps -ef | grep {key}|grep -v grep"),
            format!("ps | grep {key}|grep -v grep"),
        ];
        for probe in &probes {
            let out = self.shell_quoted(probe).await?;
            info!("get_pid outputs==={out}");
            let pids = parse_pids(&out, key);
            if !pids.is_empty() {
                return Ok(pids);
            }
        }
        Ok(Vec::new())
    }

    /// Whether anything on the device holds a socket on `port`
    pub async fn listener_on(&self, port: u16) -> Result<bool> {
        let out = self
            .shell_quoted(&format!("netstat -anpl | grep -v unix | grep {port}"))
            .await?;
        let out = out.replace("grep: (standard input): Invalid argument", "");
        Ok(!out.trim().is_empty())
    }

    /// Launch the UI test agent detached; it keeps running after this returns.
    pub fn launch_agent(&self, bundle: &str, runner: &str, port: u16) -> Result<()> {
        self.shell_detached(&format!(
            "aa test -b {bundle} -m entry_test -s unittest {runner} \
             -s class ActsAbilityTest#uiTestProcess{port} -s timeout {AGENT_TIMEOUT_MS}"
        ))
    }

    pub async fn start_app(&self, bundle: &str, ability: &str) -> Result<()> {
        self.shell(&format!("aa start -a {ability} -b {bundle} -D"))
            .await
            .map(drop)
    }

    pub async fn stop_app(&self, bundle: &str) -> Result<()> {
        self.shell(&format!("aa force-stop {bundle}")).await.map(drop)
    }

    /// Install a package; `Ok(false)` when the bridge did not report success
    pub async fn install_app(&self, path: &Path) -> Result<bool> {
        let path = path.to_string_lossy();
        let out = self.run(&["install", &path]).await?;
        Ok(out.contains("successfully"))
    }

    pub async fn uninstall_app(&self, bundle: &str) -> Result<bool> {
        let out = self.run(&["uninstall", bundle]).await?;
        Ok(out.contains("successfully"))
    }

    /// Check the serial is listed by `hdc list targets`
    pub async fn is_online(&self) -> Result<bool> {
        let out = self
            .bridge
            .exec(&["list".to_string(), "targets".to_string()])
            .await?;
        if out.contains("[Empty]") {
            return Ok(false);
        }
        Ok(out.lines().any(|line| line.trim() == self.serial))
    }

    /// Capture the screen on the device and pull the PNG to `local`.
    pub async fn capture_screen(&self, local: &Path) -> Result<()> {
        let remote = REMOTE_SCREENSHOT_PATH;
        let cap = self
            .shell_quoted(&format!(
                "rm -rf {remote};sync;uitest screenCap -p {remote};sync"
            ))
            .await?;
        let cap = cap.trim();
        if !cap.starts_with("ScreenCap saved to") {
            return Err(DriverError::Screenshot(format!("screen shot failed! {cap}")));
        }

        let local_str = local.to_string_lossy();
        let out = self.run(&["file", "recv", remote, &local_str]).await?;
        debug!("recv: {}", out.trim());

        let received = wait_for_file(local, SCREENSHOT_RECV_WAIT).await;

        if let Err(e) = self.shell(&format!("rm -rf {remote}")).await {
            warn!("failed to remove {remote} on device: {e}");
        }

        if received {
            Ok(())
        } else {
            Err(DriverError::Screenshot(format!(
                "{} not received within {}s",
                local.display(),
                SCREENSHOT_RECV_WAIT.as_secs()
            )))
        }
    }
}

async fn wait_for_file(path: &Path, wait: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Extract pids from `ps` output rows of the form `shell <pid> ... <key>`.
fn parse_pids(output: &str, key: &str) -> Vec<u32> {
    let key = key.trim();
    output
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let user = tokens.iter().position(|t| *t == "shell")?;
            let pid = tokens.get(user + 1)?.parse::<u32>().ok()?;
            tokens[user + 2..]
                .iter()
                .any(|t| t.starts_with(key))
                .then_some(pid)
        })
        .collect()
}

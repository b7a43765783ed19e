//! Transport manager - the forwarded port and the agent socket
//!
//! The agent listens on a fixed port on the device. We forward a local port to
//! it through the bridge, connect to `127.0.0.1:<local>`, and greet it with
//! `hello` before any command is sent.

use crate::bridge::Bridge;
use crate::config::SessionConfig;
use crate::device::Device;
use crate::error::{DriverError, Result};
use async_trait::async_trait;
use log::{error, info, warn};
use std::collections::HashSet;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Greeting sent right after connecting
pub const HELLO: &[u8] = b"hello";

/// Size of every receive on the agent socket
pub const SOCKET_BUFFER_SIZE: usize = 1024;

const CONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Hands out local ports, never the same one twice.
#[derive(Debug, Default)]
pub struct PortAllocator {
    used: HashSet<u16>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an ephemeral port, release it, and return its number.
    ///
    /// Only this allocator's own history is checked; another process may still
    /// grab the port before we use it.
    pub fn allocate(&mut self) -> Result<u16> {
        loop {
            let port = {
                let listener = std::net::TcpListener::bind(("0.0.0.0", 0))?;
                listener.local_addr()?.port()
            };
            if self.used.insert(port) {
                return Ok(port);
            }
        }
    }

    /// Record a port chosen elsewhere so it is never handed out.
    pub fn reserve(&mut self, port: u16) {
        self.used.insert(port);
    }

    pub fn is_used(&self, port: u16) -> bool {
        self.used.contains(&port)
    }
}

/// A byte channel to the agent that can rebuild itself.
#[async_trait]
pub trait Transport: Send {
    /// Write one whole frame.
    async fn send_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Read whatever is pending without waiting; `WouldBlock` when nothing is.
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Tear the channel down and bring up a fresh one.
    async fn reconnect(&mut self) -> Result<()>;
}

/// Owns the port forward, the agent process, and the socket for one device
pub struct TransportManager<B> {
    device: Device<B>,
    agent_bundle: String,
    agent_key: String,
    runner: String,
    local_port: u16,
    agent_port: u16,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    ports: PortAllocator,
}

impl<B: Bridge> TransportManager<B> {
    /// Create a manager; no process is started and no socket opened yet.
    pub fn new(bridge: B, config: &SessionConfig) -> Result<Self> {
        let device = Device::new(bridge, &config.serial)?;
        let mut ports = PortAllocator::new();
        let local_port = match config.local_port {
            Some(port) => {
                ports.reserve(port);
                port
            }
            None => ports.allocate()?,
        };
        info!(
            "transport for {} on local port {local_port} -> agent port {}",
            config.serial, config.agent_port
        );

        Ok(Self {
            device,
            agent_bundle: config.agent_bundle.clone(),
            agent_key: config.agent_key(),
            runner: config.runner.clone(),
            local_port,
            agent_port: config.agent_port,
            connect_timeout: config.connect_timeout(),
            stream: None,
            ports,
        })
    }

    pub fn device(&self) -> &Device<B> {
        &self.device
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn agent_port(&self) -> u16 {
        self.agent_port
    }

    pub fn ports(&mut self) -> &mut PortAllocator {
        &mut self.ports
    }

    /// A fresh local port, distinct from every one this manager handed out
    pub fn allocate_local_port(&mut self) -> Result<u16> {
        self.ports.allocate()
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Launch the agent unless it already runs.
    pub async fn ensure_agent_running(&self) -> Result<()> {
        let key = &self.agent_key;
        match self.device.pid_of(key).await {
            Ok(pids) if !pids.is_empty() => {
                info!("{key} is running, pid is {pids:?}");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => warn!("pid lookup for {key} failed: {e}"),
        }

        if self.device.listener_on(self.local_port).await? {
            let out = self
                .device
                .remove_forward(self.local_port, self.agent_port)
                .await?;
            info!("removed stale forward: {}", out.trim());
        }

        info!("launching agent {key}");
        self.device
            .launch_agent(&self.agent_bundle, &self.runner, self.agent_port)
    }

    /// Keep trying to reach the agent until `timeout` runs out.
    pub async fn connect(&mut self, timeout: Duration) -> Result<()> {
        info!("start socket client init");
        self.stream = None;
        let started = Instant::now();

        while started.elapsed() < timeout {
            let remaining = timeout.saturating_sub(started.elapsed());
            match self.open_socket(remaining).await {
                Ok(stream) => {
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    warn!("socket client init failed: {e}");
                    tokio::time::sleep(CONNECT_BACKOFF).await;
                }
            }
        }
        Err(DriverError::TransportTimeout(timeout.as_secs()))
    }

    async fn open_socket(&self, remaining: Duration) -> Result<TcpStream> {
        let out = self.device.forward(self.local_port, self.agent_port).await?;
        info!("{}", out.trim());
        let out = self.device.list_forwards().await?;
        info!("{}", out.trim());

        let mut stream = TcpStream::connect(("127.0.0.1", self.local_port)).await?;
        // Abort pending data on close instead of draining it.
        #[allow(deprecated)]
        stream.set_linger(Some(Duration::ZERO))?;

        stream.write_all(HELLO).await?;
        stream.flush().await?;

        let mut buf = [0u8; SOCKET_BUFFER_SIZE];
        let n = tokio::time::timeout(remaining, stream.read(&mut buf))
            .await
            .map_err(|_| DriverError::Transport("no hello reply from agent".into()))??;
        if n == 0 {
            return Err(DriverError::Transport(
                "agent closed the socket during hello".into(),
            ));
        }
        info!(
            "socket client init ok. got hello message: {}",
            String::from_utf8_lossy(&buf[..n])
        );
        Ok(stream)
    }

    /// Agent up and socket connected.
    pub async fn start(&mut self) -> Result<()> {
        self.ensure_agent_running().await?;
        self.connect(self.connect_timeout).await
    }

    /// Close the socket, stop the agent, drop the forward. Never fails.
    pub async fn teardown(&mut self) {
        info!("stop test runner");
        self.stream = None;
        if let Err(e) = self.device.stop_app(&self.agent_bundle).await {
            error!("failed to stop {}: {e}", self.agent_bundle);
        }
        match self
            .device
            .remove_forward(self.local_port, self.agent_port)
            .await
        {
            Ok(out) => info!("{}", out.trim()),
            Err(e) => warn!("failed to remove forward tcp:{}: {e}", self.local_port),
        }
    }

    /// Teardown that does not wait: the stop and forward removal are started
    /// in the background and only their launch failures are logged.
    pub fn abandon(&mut self) {
        info!("abandon test runner on tcp:{}", self.local_port);
        self.stream = None;
        if let Err(e) = self
            .device
            .shell_detached(&format!("aa force-stop {}", self.agent_bundle))
        {
            error!("failed to stop {}: {e}", self.agent_bundle);
        }
        if let Err(e) = self.device.forward_removal_detached(self.local_port, self.agent_port) {
            warn!("failed to remove forward tcp:{}: {e}", self.local_port);
        }
    }
}

#[async_trait]
impl<B: Bridge> Transport for TransportManager<B> {
    async fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        stream.write_all(frame).await?;
        stream.flush().await
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.as_ref() {
            Some(stream) => stream.try_read(buf),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        warn!("reconnecting to agent on tcp:{}", self.local_port);
        self.teardown().await;
        self.ensure_agent_running().await?;
        self.connect(self.connect_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBridge;

    fn config(local_port: Option<u16>) -> SessionConfig {
        SessionConfig {
            local_port,
            ..SessionConfig::new("SER1")
        }
    }

    #[test]
    fn allocated_ports_are_never_reused() {
        let mut ports = PortAllocator::new();
        let mut seen = HashSet::new();
        for _ in 0..16 {
            assert!(seen.insert(ports.allocate().unwrap()));
        }
        for port in &seen {
            assert!(ports.is_used(*port));
        }
    }

    #[test]
    fn allocators_do_not_share_history() {
        let mut a = PortAllocator::new();
        let b = PortAllocator::new();
        let port = a.allocate().unwrap();
        assert!(a.is_used(port));
        assert!(!b.is_used(port));
    }

    #[test]
    fn configured_port_is_reserved() {
        let mut manager = TransportManager::new(RecordingBridge::new(), &config(Some(40123))).unwrap();
        assert_eq!(manager.local_port(), 40123);
        assert!(manager.ports().is_used(40123));
        assert!(!manager.is_connected());
    }

    #[test]
    fn fresh_ports_skip_the_configured_one() {
        let mut manager = TransportManager::new(RecordingBridge::new(), &config(Some(40129))).unwrap();
        let port = manager.allocate_local_port().unwrap();
        assert_ne!(port, 40129);
        assert!(manager.ports().is_used(port));
    }

    #[tokio::test]
    async fn running_agent_is_left_alone() {
        let bridge = RecordingBridge::new();
        bridge.respond(
            "ps -ef",
            "shell 999 1 0 ? 00:00:01 aa test -s class ActsAbilityTest#uiTestProcess29100\n",
        );
        let manager = TransportManager::new(bridge.clone(), &config(Some(40124))).unwrap();
        manager.ensure_agent_running().await.unwrap();

        assert!(bridge.invocations().iter().all(|i| !i.detached));
        assert_eq!(bridge.count_containing("netstat"), 0);
    }

    #[tokio::test]
    async fn stale_forward_is_removed_before_launch() {
        let bridge = RecordingBridge::new();
        bridge.respond("netstat", "tcp 0 0 127.0.0.1:40125 LISTEN\n");
        let manager = TransportManager::new(bridge.clone(), &config(Some(40125))).unwrap();
        manager.ensure_agent_running().await.unwrap();

        let log = bridge.invocations();
        let rm = log
            .iter()
            .position(|i| i.line() == "-t SER1 fport rm tcp:40125 tcp:29100")
            .unwrap();
        let launch = log.iter().position(|i| i.detached).unwrap();
        assert!(rm < launch);
        assert!(log[launch].line().contains("ActsAbilityTest#uiTestProcess29100"));
    }

    #[tokio::test]
    async fn launch_without_stale_listener_skips_forward_removal() {
        let bridge = RecordingBridge::new();
        let manager = TransportManager::new(bridge.clone(), &config(Some(40126))).unwrap();
        manager.ensure_agent_running().await.unwrap();

        assert_eq!(bridge.count_containing("fport rm"), 0);
        assert_eq!(bridge.invocations().iter().filter(|i| i.detached).count(), 1);
    }

    #[tokio::test]
    async fn teardown_stops_agent_and_forward() {
        let bridge = RecordingBridge::new();
        let mut manager = TransportManager::new(bridge.clone(), &config(Some(40127))).unwrap();
        manager.teardown().await;

        assert_eq!(
            bridge.lines(),
            vec![
                "-t SER1 shell aa force-stop com.harmony.uitest".to_string(),
                "-t SER1 fport rm tcp:40127 tcp:29100".to_string(),
            ]
        );
    }

    #[test]
    fn abandon_spawns_stop_and_forward_removal() {
        let bridge = RecordingBridge::new();
        let mut manager = TransportManager::new(bridge.clone(), &config(Some(40130))).unwrap();
        manager.abandon();

        let log = bridge.invocations();
        assert!(log.iter().all(|i| i.detached));
        assert_eq!(
            bridge.lines(),
            vec![
                "-t SER1 shell aa force-stop com.harmony.uitest".to_string(),
                "-t SER1 fport rm tcp:40130 tcp:29100".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn send_without_socket_is_not_connected() {
        let mut manager = TransportManager::new(RecordingBridge::new(), &config(Some(40128))).unwrap();
        let err = manager.send_frame(b"{}").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        let mut buf = [0u8; 8];
        assert_eq!(
            manager.try_recv(&mut buf).unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
    }
}

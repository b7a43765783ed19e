//! Session - one transport manager and request engine bound to one device

use crate::bridge::Bridge;
use crate::config::SessionConfig;
use crate::device::Device;
use crate::engine::RequestEngine;
use crate::error::{DriverError, Result};
use crate::protocol::{Command, Reply, WaitHints};
use crate::transport::TransportManager;
use log::info;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

/// One agent connection.
///
/// Dropping a session that was never stopped still stops the agent and removes
/// the forward, through detached bridge invocations.
pub struct Session<B: Bridge> {
    engine: RequestEngine<TransportManager<B>>,
    stopped: bool,
}

impl<B: Bridge> Session<B> {
    /// Create a session without touching the device yet
    pub fn new(bridge: B, config: &SessionConfig) -> Result<Self> {
        let transport = TransportManager::new(bridge, config)?;
        Ok(Self {
            engine: RequestEngine::new(transport, config.discovery_timeout()),
            stopped: false,
        })
    }

    /// Create a session and bring the agent connection up
    pub async fn open(bridge: B, config: &SessionConfig) -> Result<Self> {
        let mut session = Self::new(bridge, config)?;
        session.start().await?;
        Ok(session)
    }

    /// Make sure the agent runs and connect to it
    pub async fn start(&mut self) -> Result<()> {
        self.engine.transport_mut().start().await?;
        self.stopped = false;
        Ok(())
    }

    pub fn device(&self) -> &Device<B> {
        self.engine.transport().device()
    }

    pub fn serial(&self) -> &str {
        self.device().serial()
    }

    pub fn local_port(&self) -> u16 {
        self.engine.transport().local_port()
    }

    pub fn is_connected(&self) -> bool {
        !self.stopped && self.engine.transport().is_connected()
    }

    pub async fn request(&mut self, command: &Command) -> Result<Reply> {
        if self.stopped {
            return Err(DriverError::SessionClosed);
        }
        self.engine.request(command).await
    }

    pub async fn send(&mut self, frame: Map<String, Value>, hints: WaitHints) -> Result<Reply> {
        if self.stopped {
            return Err(DriverError::SessionClosed);
        }
        self.engine.send(frame, hints).await
    }

    /// Close the socket, stop the agent and remove the forward. Never fails.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        info!("stopping session for {}", self.serial());
        self.engine.transport_mut().teardown().await;
        self.stopped = true;
    }
}

impl<B: Bridge> Drop for Session<B> {
    fn drop(&mut self) {
        if !self.stopped {
            self.engine.transport_mut().abandon();
        }
    }
}

impl<B: Bridge> fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("serial", &self.serial())
            .field("local_port", &self.local_port())
            .field("stopped", &self.stopped)
            .finish()
    }
}

/// A session shared by a driver and its handles
pub type SharedSession<B> = Arc<Mutex<Session<B>>>;

/// Handle-side reference to a session; never keeps it alive.
pub struct SessionRef<B: Bridge> {
    inner: Weak<Mutex<Session<B>>>,
}

impl<B: Bridge> Clone for SessionRef<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: Bridge> SessionRef<B> {
    pub fn new(session: &SharedSession<B>) -> Self {
        Self {
            inner: Arc::downgrade(session),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub async fn request(&self, command: &Command) -> Result<Reply> {
        let session = self.inner.upgrade().ok_or(DriverError::SessionClosed)?;
        let mut session = session.lock().await;
        session.request(command).await
    }
}

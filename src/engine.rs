//! Request engine - correlation, deadlines and recovery
//!
//! One request is in flight at a time. Each attempt stamps a fresh correlation
//! id into the outgoing document and polls the transport until a document
//! echoing that id arrives or the wait budget runs out. Frames for other ids
//! are dropped. Transport faults get exactly one reconnect-and-resend; every
//! agent-level outcome is handed straight back.

use crate::error::{DriverError, Result};
use crate::protocol::{expand_embedded_json, Command, FrameDecoder, Reply, WaitHints, UUID_FIELD};
use crate::transport::{Transport, SOCKET_BUFFER_SIZE};
use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use std::io;
use std::time::Duration;
use tokio::time::Instant;

/// Whole-command attempts; the second only follows a transport fault
pub const MAX_ATTEMPTS: usize = 2;

/// Raw writes tried per attempt, reconnecting between them
pub const WRITE_RETRIES: usize = 3;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Error descriptions starting with this mean nothing matched the locator
pub const NOT_FOUND_PREFIX: &str = "no ele";

/// Fresh correlation id: time-ordered, hyphens stripped
pub fn new_correlation_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

pub struct RequestEngine<T> {
    transport: T,
    discovery_timeout: Duration,
    decoder: FrameDecoder,
}

impl<T: Transport> RequestEngine<T> {
    pub fn new(transport: T, discovery_timeout: Duration) -> Self {
        Self {
            transport,
            discovery_timeout,
            decoder: FrameDecoder::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// How long to wait for a response: discovery timeout plus the command's hints
    pub fn response_budget(&self, hints: WaitHints) -> Duration {
        let extra = hints.total();
        if extra.is_finite() && extra > 0.0 {
            self.discovery_timeout + Duration::from_secs_f64(extra)
        } else {
            self.discovery_timeout
        }
    }

    /// Send a typed command and wait for its reply.
    pub async fn request(&mut self, command: &Command) -> Result<Reply> {
        self.send(command.to_frame(), command.wait_hints()).await
    }

    /// Send a raw command document and wait for its reply.
    ///
    /// `frame` must not carry a correlation id; one is added per attempt.
    pub async fn send(&mut self, frame: Map<String, Value>, hints: WaitHints) -> Result<Reply> {
        let started = Instant::now();
        info!("#### start request");

        let mut attempt = 1;
        let outcome = loop {
            match self.attempt(&frame, hints).await {
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    warn!("request attempt {attempt} failed: {e}; reconnecting");
                    if let Err(e) = self.reconnect().await {
                        break Err(e);
                    }
                    attempt += 1;
                }
                other => break other,
            }
        };

        info!(
            "#### end request,after {:.3}s",
            started.elapsed().as_secs_f64()
        );
        outcome
    }

    async fn attempt(&mut self, frame: &Map<String, Value>, hints: WaitHints) -> Result<Reply> {
        let id = new_correlation_id();
        let mut frame = frame.clone();
        frame.insert(UUID_FIELD.to_string(), Value::String(id.clone()));
        let frame = Value::Object(frame);
        info!("data_dict: {frame}");

        let bytes = serde_json::to_vec(&frame)?;
        self.write_frame(&bytes).await?;

        let budget = self.response_budget(hints);
        let reply = self.wait_for_reply(&id, budget).await?;
        info!("re_dict: {:?}", reply.as_map());
        check_status(reply)
    }

    async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        let mut tries = 0;
        loop {
            tries += 1;
            match self.transport.send_frame(bytes).await {
                Ok(()) => return Ok(()),
                Err(e) if tries < WRITE_RETRIES => {
                    error!("socket send failed ({tries}/{WRITE_RETRIES}): {e}");
                    self.reconnect().await?;
                }
                Err(e) => {
                    return Err(DriverError::Transport(format!(
                        "send failed after {WRITE_RETRIES} tries: {e}"
                    )))
                }
            }
        }
    }

    async fn wait_for_reply(&mut self, id: &str, budget: Duration) -> Result<Reply> {
        let deadline = Instant::now() + budget;
        let mut buf = [0u8; SOCKET_BUFFER_SIZE];

        loop {
            while let Some(value) = self.decoder.next_frame()? {
                let mut body = match value {
                    Value::Object(body) => body,
                    other => {
                        debug!("discarding non-object frame: {other}");
                        continue;
                    }
                };
                if body.get(UUID_FIELD).and_then(Value::as_str) == Some(id) {
                    body.remove(UUID_FIELD);
                    let body = body
                        .into_iter()
                        .map(|(k, v)| (k, expand_embedded_json(v)))
                        .collect();
                    return Ok(Reply::new(body));
                }
                debug!(
                    "discarding frame for {:?}, waiting on {id}",
                    body.get(UUID_FIELD)
                );
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DriverError::ResponseTimeout(budget.as_secs_f64()));
            }

            match self.transport.try_recv(&mut buf) {
                Ok(0) => {
                    return Err(DriverError::Transport(
                        "agent closed the connection".into(),
                    ))
                }
                Ok(n) => {
                    debug!("recv: {}", String::from_utf8_lossy(&buf[..n]));
                    self.decoder.push(&buf[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
                }
                Err(e) => {
                    error!("socket recv failed: {e}");
                    return Err(DriverError::Transport(e.to_string()));
                }
            }
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.decoder.clear();
        self.transport.reconnect().await
    }
}

fn check_status(reply: Reply) -> Result<Reply> {
    if !reply.is_error() {
        return Ok(reply);
    }
    let description = reply.description();
    if description.starts_with(NOT_FOUND_PREFIX) {
        Err(DriverError::ElementNotFound(description))
    } else {
        Err(DriverError::Agent(description))
    }
}

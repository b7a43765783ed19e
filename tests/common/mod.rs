//! In-process stand-in for the on-device agent.
//!
//! Listens on a loopback port, answers the greeting, then decodes request
//! documents and answers each one through a handler, echoing its `uuid`.

#![allow(dead_code)]

use hmdriver::protocol::FrameDecoder;
use hmdriver::transport::HELLO;
use hmdriver::SessionConfig;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const GREETING: &[u8] = b"hello ok";

/// What the agent does with one request
pub enum Answer {
    /// Send this document back with the request's `uuid` added
    Reply(Value),
    /// Never answer
    Silence,
    /// Drop the connection without answering
    Hangup,
}

type Handler = dyn Fn(&Value, usize) -> Answer + Send + Sync;

#[derive(Default)]
struct State {
    frames: Vec<Value>,
    connections: usize,
}

pub struct FakeAgent {
    pub port: u16,
    state: Arc<Mutex<State>>,
}

impl FakeAgent {
    /// Start listening. The handler sees each request and how many requests
    /// came before it, across all connections.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Value, usize) -> Answer + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State::default()));
        let handler: Arc<Handler> = Arc::new(handler);

        let accept_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                accept_state.lock().unwrap().connections += 1;
                let state = accept_state.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, state, handler).await;
                });
            }
        });

        Self { port, state }
    }

    /// Every request received, in order
    pub fn frames(&self) -> Vec<Value> {
        self.state.lock().unwrap().frames.clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.frames()
            .iter()
            .map(|f| f["action"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    /// Session config that reaches this agent straight through the loopback port
    pub fn config(&self) -> SessionConfig {
        SessionConfig {
            local_port: Some(self.port),
            connect_timeout_s: 5,
            ..SessionConfig::new("FAKE0001")
        }
    }
}

async fn serve(
    mut stream: TcpStream,
    state: Arc<Mutex<State>>,
    handler: Arc<Handler>,
) -> std::io::Result<()> {
    let mut hello = vec![0u8; HELLO.len()];
    stream.read_exact(&mut hello).await?;
    stream.write_all(GREETING).await?;

    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        decoder.push(&buf[..n]);
        while let Ok(Some(frame)) = decoder.next_frame() {
            let seen = {
                let mut state = state.lock().unwrap();
                state.frames.push(frame.clone());
                state.frames.len() - 1
            };
            match handler(&frame, seen) {
                Answer::Reply(mut body) => {
                    body["uuid"] = frame["uuid"].clone();
                    stream.write_all(body.to_string().as_bytes()).await?;
                }
                Answer::Silence => {}
                Answer::Hangup => return Ok(()),
            }
        }
    }
}

/// Replies shaped like a phone showing a settings screen
pub fn phone(frame: &Value, _seen: usize) -> Answer {
    let ok = |data: Value| Answer::Reply(json!({"ret": "ok", "data": data}));
    match frame["action"].as_str().unwrap_or_default() {
        "find" => match frame["data"].as_str() {
            Some("btn_sign") => Answer::Reply(json!({
                "ret": "ok",
                "euid": "E1",
                "property": {"id": "btn_sign", "text": "Sign in"}
            })),
            _ => Answer::Reply(json!({"ret": "error", "description": "no ele matched"})),
        },
        "finds" => ok(json!([
            {"euid": "E2", "property": {"text": "设置"}},
            {"euid": "E3", "property": {"text": "设置"}}
        ])),
        "get" => match frame["property"].as_str().unwrap_or_default() {
            "info" => ok(json!({"id": "btn_sign", "text": "Sign in"})),
            "bounds" => ok(json!("{\"left\":0,\"top\":100,\"right\":200,\"bottom\":300}")),
            "isClickable" => ok(json!("true")),
            "text" => ok(json!("Sign in")),
            other => Answer::Reply(json!({
                "ret": "error",
                "description": format!("unknown property {other}")
            })),
        },
        "operate" => ok(json!(true)),
        "window" => match frame["operate"].as_str().unwrap_or_default() {
            "find" => Answer::Reply(json!({
                "ret": "ok",
                "euid": "W1",
                "property": {}
            })),
            "get" => match frame["property"].as_str().unwrap_or_default() {
                "info" => ok(json!({"title": "Settings", "windowMode": 0})),
                "isFocused" => ok(json!(true)),
                _ => ok(Value::Null),
            },
            _ => ok(Value::Null),
        },
        "screenSize" => ok(json!({"x": 1260, "y": 2720})),
        "getRotation" => ok(json!(1)),
        "currentBundle" => ok(json!("com.huawei.hmos.settings")),
        _ => ok(Value::Null),
    }
}

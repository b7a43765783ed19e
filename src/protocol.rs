//! Wire protocol spoken with the on-device agent
//!
//! Requests are single JSON documents carrying an `action` plus per-action
//! operands; the agent answers with a JSON document echoing the request's
//! `uuid`. There is no length prefix: documents are cut out of the byte
//! stream by [`FrameDecoder`].

use crate::error::{DriverError, Result};
use crate::types::{By, DisplayRotation, Params, Point, UiDirection};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

/// Field the engine stamps the correlation id into
pub const UUID_FIELD: &str = "uuid";

/// Gesture speeds outside this range fall back to [`DEFAULT_SPEED`], in px/s
pub const SPEED_RANGE: std::ops::RangeInclusive<i64> = 200..=40000;
pub const DEFAULT_SPEED: u32 = 600;

pub fn clamp_speed(speed: i64) -> u32 {
    if SPEED_RANGE.contains(&speed) {
        speed as u32
    } else {
        DEFAULT_SPEED
    }
}

/// A press-move-release gesture
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub from: Point,
    pub to: Point,
    pub speed: u32,
    /// Intended gesture duration in seconds
    pub time_s: f64,
}

impl Stroke {
    /// Derive the speed that covers the longer axis in `time_s` seconds.
    pub fn new(from: Point, to: Point, time_s: f64) -> Self {
        let distance = from.x.abs_diff(to.x).max(from.y.abs_diff(to.y));
        let speed = if time_s > 0.0 {
            (distance as f64 / time_s) as i64
        } else {
            0
        };
        Self {
            from,
            to,
            speed: clamp_speed(speed),
            time_s,
        }
    }

    fn fields(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("startx".into(), self.from.x.to_string().into());
        map.insert("starty".into(), self.from.y.to_string().into());
        map.insert("endx".into(), self.to.x.to_string().into());
        map.insert("endy".into(), self.to.y.to_string().into());
        map.insert("speed".into(), self.speed.to_string().into());
        map.insert("time_s".into(), self.time_s.to_string().into());
        map
    }
}

/// Operation performed on an element handle
#[derive(Debug, Clone, PartialEq)]
pub enum ElementOp {
    Click,
    DoubleClick,
    LongClick,
    Clear,
    Input(String),
    ScrollToTop { speed: f64 },
    ScrollToBottom { speed: f64 },
    /// Drag onto another element, by euid
    DragTo(String),
    PinchOut { scale: f64 },
    PinchIn { scale: f64 },
    /// Scroll this container until an element matching the locator shows up
    ScrollSearch { by: By, data: String },
}

impl ElementOp {
    pub fn name(&self) -> &'static str {
        match self {
            ElementOp::Click => "click",
            ElementOp::DoubleClick => "doubleClick",
            ElementOp::LongClick => "longClick",
            ElementOp::Clear => "clear",
            ElementOp::Input(_) => "input",
            ElementOp::ScrollToTop { .. } => "scrollToTop",
            ElementOp::ScrollToBottom { .. } => "scrollToBottom",
            ElementOp::DragTo(_) => "dragTo",
            ElementOp::PinchOut { .. } => "pinchOut",
            ElementOp::PinchIn { .. } => "pinchIn",
            ElementOp::ScrollSearch { .. } => "scrollSearch",
        }
    }

    fn operand(&self) -> Option<(&'static str, Value)> {
        match self {
            ElementOp::Click | ElementOp::DoubleClick | ElementOp::LongClick | ElementOp::Clear => {
                None
            }
            ElementOp::Input(text) => Some(("text", json!(text))),
            ElementOp::ScrollToTop { speed } | ElementOp::ScrollToBottom { speed } => {
                Some(("param", json!(speed)))
            }
            ElementOp::DragTo(euid) => Some(("param", json!(euid))),
            ElementOp::PinchOut { scale } | ElementOp::PinchIn { scale } => {
                Some(("param", json!(scale)))
            }
            ElementOp::ScrollSearch { by, data } => {
                Some(("param", json!({"by": by.as_str(), "data": data})))
            }
        }
    }
}

/// Operation performed on a window handle
#[derive(Debug, Clone, PartialEq)]
pub enum WindowAction {
    Focus,
    MoveTo { x: i32, y: i32 },
    Maximize,
    Minimize,
    Resume,
    Close,
}

impl WindowAction {
    pub fn name(&self) -> &'static str {
        match self {
            WindowAction::Focus => "focus",
            WindowAction::MoveTo { .. } => "moveTo",
            WindowAction::Maximize => "maximize",
            WindowAction::Minimize => "minimize",
            WindowAction::Resume => "resume",
            WindowAction::Close => "close",
        }
    }
}

/// Command sent from client to agent
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Find one element, waiting up to `timeout_s` on the device
    Find {
        by: By,
        data: String,
        params: Option<Params>,
        timeout_s: u64,
    },

    /// Find every element matching; filters travel as top-level fields
    Finds { by: By, data: String, filters: Params },

    /// Read one property of an element, or `info` for all of them
    Get { euid: String, property: String },

    Operate { euid: String, op: ElementOp },

    FindWindow { filter: Params },

    WindowGet { wuid: String, property: String },

    WindowAction { wuid: String, action: WindowAction },

    Click(Point),
    DoubleClick(Point),
    LongClick(Point),
    Swipe(Stroke),
    Drag(Stroke),
    Fling { direction: UiDirection, speed: u32 },
    Home,
    Back,

    /// Key press with up to two modifier keys; 0 means none
    KeyEvent { key: i32, key1: i32, key2: i32 },

    SetRotation(DisplayRotation),
    GetRotation,
    Wakeup,
    ScreenSize,
    CurrentBundle,
}

/// Extra response wait a command asks for, on top of the discovery timeout
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaitHints {
    /// Explicit wait the agent may spend searching
    pub timeout_s: f64,
    /// Expected execution time of the action itself
    pub time_s: f64,
}

impl WaitHints {
    pub fn total(&self) -> f64 {
        self.timeout_s + self.time_s
    }
}

fn point_fields(map: &mut Map<String, Value>, p: &Point) {
    map.insert("x".into(), p.x.to_string().into());
    map.insert("y".into(), p.y.to_string().into());
}

impl Command {
    pub fn action(&self) -> &'static str {
        match self {
            Command::Find { .. } => "find",
            Command::Finds { .. } => "finds",
            Command::Get { .. } => "get",
            Command::Operate { .. } => "operate",
            Command::FindWindow { .. }
            | Command::WindowGet { .. }
            | Command::WindowAction { .. } => "window",
            Command::Click(_) => "click",
            Command::DoubleClick(_) => "doubleClick",
            Command::LongClick(_) => "longClick",
            Command::Swipe(_) => "swipe",
            Command::Drag(_) => "drag",
            Command::Fling { .. } => "fling",
            Command::Home => "home",
            Command::Back => "back",
            Command::KeyEvent { .. } => "keyEvent",
            Command::SetRotation(_) => "setRotation",
            Command::GetRotation => "getRotation",
            Command::Wakeup => "wakeup",
            Command::ScreenSize => "screenSize",
            Command::CurrentBundle => "currentBundle",
        }
    }

    pub fn wait_hints(&self) -> WaitHints {
        match self {
            Command::Find { timeout_s, .. } => WaitHints {
                timeout_s: *timeout_s as f64,
                time_s: 0.0,
            },
            Command::Swipe(stroke) | Command::Drag(stroke) => WaitHints {
                timeout_s: 0.0,
                time_s: stroke.time_s,
            },
            _ => WaitHints::default(),
        }
    }

    /// Encode into the document the agent expects, without correlation id.
    pub fn to_frame(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("action".into(), self.action().into());

        match self {
            Command::Find {
                by,
                data,
                params,
                timeout_s,
            } => {
                map.insert("by".into(), by.as_str().into());
                map.insert("data".into(), data.as_str().into());
                map.insert("timeout_s".into(), timeout_s.to_string().into());
                map.insert(
                    "params".into(),
                    params.clone().map(Value::Object).unwrap_or(Value::Null),
                );
            }
            Command::Finds { by, data, filters } => {
                map.insert("by".into(), by.as_str().into());
                map.insert("data".into(), data.as_str().into());
                for (key, value) in filters {
                    map.insert(key.clone(), value.clone());
                }
            }
            Command::Get { euid, property } => {
                map.insert("property".into(), property.as_str().into());
                map.insert("euid".into(), euid.as_str().into());
            }
            Command::Operate { euid, op } => {
                map.insert("operate".into(), op.name().into());
                map.insert("euid".into(), euid.as_str().into());
                if let Some((key, value)) = op.operand() {
                    map.insert(key.into(), value);
                }
            }
            Command::FindWindow { filter } => {
                map.insert("operate".into(), "find".into());
                map.insert("filter".into(), Value::Object(filter.clone()));
            }
            Command::WindowGet { wuid, property } => {
                map.insert("operate".into(), "get".into());
                map.insert("property".into(), property.as_str().into());
                map.insert("wuid".into(), wuid.as_str().into());
            }
            Command::WindowAction { wuid, action } => {
                map.insert("operate".into(), "action".into());
                map.insert("func".into(), action.name().into());
                map.insert("wuid".into(), wuid.as_str().into());
                if let WindowAction::MoveTo { x, y } = action {
                    map.insert("x".into(), json!(x));
                    map.insert("y".into(), json!(y));
                }
            }
            Command::Click(p) | Command::DoubleClick(p) | Command::LongClick(p) => {
                point_fields(&mut map, p);
            }
            Command::Swipe(stroke) | Command::Drag(stroke) => {
                map.extend(stroke.fields());
            }
            Command::Fling { direction, speed } => {
                map.insert("direction".into(), json!(direction.code()));
                map.insert("speed".into(), json!(clamp_speed(*speed as i64)));
            }
            Command::KeyEvent { key, key1, key2 } => {
                map.insert("key".into(), json!(key));
                map.insert("key1".into(), json!(key1));
                map.insert("key2".into(), json!(key2));
            }
            Command::SetRotation(rotation) => {
                map.insert("rotation".into(), json!(rotation.code()));
            }
            Command::Home
            | Command::Back
            | Command::GetRotation
            | Command::Wakeup
            | Command::ScreenSize
            | Command::CurrentBundle => {}
        }
        map
    }
}

/// A matched response, correlation id removed
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    body: Map<String, Value>,
}

impl Reply {
    pub fn new(body: Map<String, Value>) -> Self {
        Self { body }
    }

    /// The `ret` status marker
    pub fn status(&self) -> Option<&str> {
        self.body.get("ret").and_then(Value::as_str)
    }

    pub fn is_error(&self) -> bool {
        self.status() == Some("error")
    }

    pub fn description(&self) -> String {
        self.body
            .get("description")
            .map(value_to_string)
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn data(&self) -> Option<&Value> {
        self.body.get("data")
    }

    /// The `data` payload, `Null` when absent
    pub fn into_data(mut self) -> Value {
        self.body.remove("data").unwrap_or(Value::Null)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.body
    }

    /// Decode the whole reply into a typed record
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.body.clone()))
            .map_err(|e| DriverError::Protocol(format!("{} in reply {:?}", e, self.body)))
    }

    /// Decode the `data` payload into a typed value
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T> {
        let data = self.data().cloned().unwrap_or(Value::Null);
        serde_json::from_value(data)
            .map_err(|e| DriverError::Protocol(format!("{} in reply data {:?}", e, self.data())))
    }
}

/// Replace every string that parses as JSON with the parsed value, at every depth.
///
/// `"42"` becomes `42` and `"true"` becomes `true`; strings that are not JSON
/// stay as they are.
pub fn expand_embedded_json(value: Value) -> Value {
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(inner) => expand_embedded_json(inner),
            Err(_) => Value::String(s),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(expand_embedded_json).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, expand_embedded_json(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Decode a property value into a typed record
pub fn decode_value<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| DriverError::Protocol(format!("{what}: {e} in {value}")))
}

/// The agent reports some flags as `"true"`/`"false"` strings.
pub fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Text form of a value; strings without their quotes
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Cuts JSON documents out of the agent byte stream.
///
/// Bytes from successive reads are buffered until a complete document is
/// available, so a response larger than one read is reassembled and two
/// responses arriving in one read are both seen.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Next complete document, or `None` until more bytes arrive.
    pub fn next_frame(&mut self) -> Result<Option<Value>> {
        let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
        match stream.next() {
            None => {
                self.buf.clear();
                Ok(None)
            }
            Some(Ok(value)) => {
                let consumed = stream.byte_offset();
                self.buf.drain(..consumed);
                Ok(Some(value))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => {
                let garbage = String::from_utf8_lossy(&self.buf).into_owned();
                self.buf.clear();
                Err(DriverError::Protocol(format!("{e}: {garbage}")))
            }
        }
    }
}

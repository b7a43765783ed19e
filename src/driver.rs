//! Driver - the convenience layer most callers use
//!
//! A driver owns one session. Element and window handles it hands out refer
//! back to that session weakly, so they fail with
//! [`DriverError::SessionClosed`] once the driver is stopped or dropped.

use crate::bridge::{Bridge, Hdc};
use crate::capture::{self, Screenshot};
use crate::config::SessionConfig;
use crate::element::Element;
use crate::error::{DriverError, Result};
use crate::protocol::{value_as_i64, value_to_string, Command, Reply, Stroke, DEFAULT_SPEED};
use crate::session::{Session, SessionRef, SharedSession};
use crate::types::{
    By, DisplayRotation, ElementRecord, KeyCode, Params, Point, ScreenSize, UiDirection,
    WindowFilter, WindowRecord,
};
use crate::window::Window;
use log::{error, info, warn};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Helper packages installed before the agent is started, when present
pub const HELPER_HAPS: [&str; 2] = ["entry-default-unsigned.hap", "entry-ohosTest-unsigned.hap"];

/// Device-side wait for a single find
pub const DEFAULT_FIND_TIMEOUT_S: u64 = 10;

/// Client-side polling budget for multi-element finds
pub const DEFAULT_FINDS_TIMEOUT_S: u64 = 20;

const FINDS_POLL: Duration = Duration::from_secs(1);

pub struct Driver<B: Bridge = Hdc> {
    session: SharedSession<B>,
    serial: String,
    app_bundle: String,
    app_ability: String,
}

impl Driver<Hdc> {
    /// Connect through the `hdc` executable named in `config`
    pub async fn connect(
        config: &SessionConfig,
        app_bundle: &str,
        app_ability: &str,
    ) -> Result<Self> {
        Self::start(Hdc::new(config.hdc.clone()), config, app_bundle, app_ability).await
    }
}

impl<B: Bridge> Driver<B> {
    /// Install helper packages, make sure the agent runs, and connect to it.
    pub async fn start(
        bridge: B,
        config: &SessionConfig,
        app_bundle: &str,
        app_ability: &str,
    ) -> Result<Self> {
        let mut session = Session::new(bridge, config)?;
        if let Some(dir) = &config.hap_dir {
            install_helpers(&session, dir).await?;
        }
        session.start().await?;
        info!("driver ready for {}", config.serial);
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            serial: config.serial.clone(),
            app_bundle: app_bundle.to_string(),
            app_ability: app_ability.to_string(),
        })
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn session(&self) -> &SharedSession<B> {
        &self.session
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_connected()
    }

    fn handle_ref(&self) -> SessionRef<B> {
        SessionRef::new(&self.session)
    }

    /// Send one command and wait for its reply
    pub async fn request(&self, command: &Command) -> Result<Reply> {
        self.session.lock().await.request(command).await
    }

    async fn perform(&self, command: Command) -> Result<()> {
        self.request(&command).await.map(drop)
    }

    /// Close the connection, stop the agent and remove the forward.
    pub async fn stop(&self) {
        self.session.lock().await.stop().await;
    }

    pub async fn start_app(&self) -> Result<()> {
        let session = self.session.lock().await;
        session
            .device()
            .start_app(&self.app_bundle, &self.app_ability)
            .await
    }

    pub async fn stop_app(&self) -> Result<()> {
        let session = self.session.lock().await;
        session.device().stop_app(&self.app_bundle).await
    }

    /// Find one element, letting the agent wait up to `timeout_s` for it.
    ///
    /// `Ok(None)` when nothing matched in time.
    pub async fn find_element(
        &self,
        by: By,
        data: &str,
        params: Option<Params>,
        timeout_s: u64,
    ) -> Result<Option<Element<B>>> {
        let command = Command::Find {
            by,
            data: data.to_string(),
            params,
            timeout_s,
        };
        match self.request(&command).await {
            Ok(reply) => {
                let record: ElementRecord = reply.decode()?;
                Ok(Some(Element::new(self.handle_ref(), record)))
            }
            Err(e) if e.is_absent() => {
                error!("find element Error! {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn find_element_by_id(
        &self,
        id: &str,
        params: Option<Params>,
        timeout_s: u64,
    ) -> Result<Option<Element<B>>> {
        self.find_element(By::Id, id, params, timeout_s).await
    }

    pub async fn find_element_by_text(
        &self,
        text: &str,
        params: Option<Params>,
        timeout_s: u64,
    ) -> Result<Option<Element<B>>> {
        self.find_element(By::Text, text, params, timeout_s).await
    }

    pub async fn find_element_by_desc(
        &self,
        desc: &str,
        params: Option<Params>,
        timeout_s: u64,
    ) -> Result<Option<Element<B>>> {
        self.find_element(By::Description, desc, params, timeout_s).await
    }

    pub async fn find_element_by_type(
        &self,
        type_name: &str,
        params: Option<Params>,
        timeout_s: u64,
    ) -> Result<Option<Element<B>>> {
        self.find_element(By::Type, type_name, params, timeout_s).await
    }

    /// Find every matching element, polling once a second for up to `timeout_s`.
    ///
    /// `Ok(None)` when the deadline passes without a non-empty match.
    pub async fn find_elements(
        &self,
        by: By,
        data: &str,
        filters: Params,
        timeout_s: u64,
    ) -> Result<Option<Vec<Element<B>>>> {
        let command = Command::Finds {
            by,
            data: data.to_string(),
            filters,
        };
        let deadline = Instant::now() + Duration::from_secs(timeout_s);
        while Instant::now() < deadline {
            match self.request(&command).await {
                Ok(reply) => {
                    let records: Vec<ElementRecord> = reply.decode_data()?;
                    if !records.is_empty() {
                        let session = self.handle_ref();
                        return Ok(Some(
                            records
                                .into_iter()
                                .map(|record| Element::new(session.clone(), record))
                                .collect(),
                        ));
                    }
                }
                Err(e) if e.is_absent() || matches!(e, DriverError::Agent(_)) => {
                    warn!("find elements Error! {e}, retry again");
                }
                Err(e) => return Err(e),
            }
            if Instant::now() + FINDS_POLL > deadline {
                break;
            }
            tokio::time::sleep(FINDS_POLL).await;
        }
        Ok(None)
    }

    pub async fn find_elements_by_id(
        &self,
        id: &str,
        filters: Params,
        timeout_s: u64,
    ) -> Result<Option<Vec<Element<B>>>> {
        self.find_elements(By::Id, id, filters, timeout_s).await
    }

    pub async fn find_elements_by_text(
        &self,
        text: &str,
        filters: Params,
        timeout_s: u64,
    ) -> Result<Option<Vec<Element<B>>>> {
        self.find_elements(By::Text, text, filters, timeout_s).await
    }

    pub async fn find_elements_by_desc(
        &self,
        desc: &str,
        filters: Params,
        timeout_s: u64,
    ) -> Result<Option<Vec<Element<B>>>> {
        self.find_elements(By::Description, desc, filters, timeout_s).await
    }

    pub async fn find_elements_by_type(
        &self,
        type_name: &str,
        filters: Params,
        timeout_s: u64,
    ) -> Result<Option<Vec<Element<B>>>> {
        self.find_elements(By::Type, type_name, filters, timeout_s).await
    }

    /// Find a window matching every filter; `Ok(None)` when none does.
    pub async fn find_window(&self, filter: Params) -> Result<Option<Window<B>>> {
        match self.request(&Command::FindWindow { filter }).await {
            Ok(reply) => {
                let record: WindowRecord = reply.decode()?;
                Ok(Some(Window::new(self.handle_ref(), record)))
            }
            Err(e) if e.is_absent() || matches!(e, DriverError::Agent(_)) => {
                error!("find window Error! {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn find_window_by_title(&self, title: &str) -> Result<Option<Window<B>>> {
        self.find_window(window_filter(WindowFilter::Title, title.into()))
            .await
    }

    pub async fn find_window_by_bundle_name(&self, bundle: &str) -> Result<Option<Window<B>>> {
        self.find_window(window_filter(WindowFilter::BundleName, bundle.into()))
            .await
    }

    pub async fn find_window_focused(&self) -> Result<Option<Window<B>>> {
        self.find_window(window_filter(WindowFilter::Focused, Value::Bool(true)))
            .await
    }

    pub async fn click(&self, x: i32, y: i32) -> Result<()> {
        self.perform(Command::Click(Point::new(x, y))).await
    }

    pub async fn double_click(&self, x: i32, y: i32) -> Result<()> {
        self.perform(Command::DoubleClick(Point::new(x, y))).await
    }

    pub async fn long_click(&self, x: i32, y: i32) -> Result<()> {
        self.perform(Command::LongClick(Point::new(x, y))).await
    }

    /// Swipe taking roughly `time_s` seconds
    pub async fn swipe(&self, from: Point, to: Point, time_s: f64) -> Result<()> {
        self.perform(Command::Swipe(Stroke::new(from, to, time_s)))
            .await
    }

    pub async fn drag(&self, from: Point, to: Point, time_s: f64) -> Result<()> {
        self.perform(Command::Drag(Stroke::new(from, to, time_s)))
            .await
    }

    pub async fn fling(&self, direction: UiDirection, speed: u32) -> Result<()> {
        self.perform(Command::Fling { direction, speed }).await
    }

    pub async fn fling_left(&self) -> Result<()> {
        self.fling(UiDirection::Left, DEFAULT_SPEED).await
    }

    pub async fn fling_right(&self) -> Result<()> {
        self.fling(UiDirection::Right, DEFAULT_SPEED).await
    }

    pub async fn fling_up(&self) -> Result<()> {
        self.fling(UiDirection::Up, DEFAULT_SPEED).await
    }

    pub async fn fling_down(&self) -> Result<()> {
        self.fling(UiDirection::Down, DEFAULT_SPEED).await
    }

    pub async fn home(&self) -> Result<()> {
        self.perform(Command::Home).await
    }

    pub async fn back(&self) -> Result<()> {
        self.perform(Command::Back).await
    }

    pub async fn press_key(&self, key: KeyCode) -> Result<()> {
        self.press_key_code(key.code(), 0, 0).await
    }

    /// Press `key` while holding `modifier`
    pub async fn press_combo(&self, modifier: KeyCode, key: KeyCode) -> Result<()> {
        self.press_key_code(modifier.code(), key.code(), 0).await
    }

    /// Raw key event; 0 in `key1`/`key2` means no second or third key
    pub async fn press_key_code(&self, key: i32, key1: i32, key2: i32) -> Result<()> {
        self.perform(Command::KeyEvent { key, key1, key2 }).await
    }

    pub async fn set_rotation(&self, rotation: DisplayRotation) -> Result<()> {
        self.perform(Command::SetRotation(rotation)).await
    }

    pub async fn get_rotation(&self) -> Result<DisplayRotation> {
        let data = self.request(&Command::GetRotation).await?.into_data();
        value_as_i64(&data)
            .and_then(DisplayRotation::from_code)
            .ok_or_else(|| DriverError::Protocol(format!("unknown rotation: {data}")))
    }

    pub async fn wake_up(&self) -> Result<()> {
        self.perform(Command::Wakeup).await
    }

    pub async fn screen_size(&self) -> Result<ScreenSize> {
        let data = self.request(&Command::ScreenSize).await?.into_data();
        let axis = |key: &str| {
            let v = data
                .get(key)
                .and_then(value_as_i64)
                .ok_or_else(|| DriverError::Protocol(format!("screen size without {key}: {data}")))?;
            i32::try_from(v)
                .map_err(|_| DriverError::Protocol(format!("screen size {key} out of range: {v}")))
        };
        Ok(ScreenSize {
            width: axis("x")?,
            height: axis("y")?,
        })
    }

    /// Bundle name of the foreground app
    pub async fn current_bundle(&self) -> Result<String> {
        let data = self.request(&Command::CurrentBundle).await?.into_data();
        Ok(value_to_string(&data))
    }

    /// Capture the screen into `local`, or `screenshot.png` when not given.
    pub async fn screenshot_file(&self, local: Option<&Path>) -> Result<PathBuf> {
        let session = self.session.lock().await;
        capture::capture_file(session.device(), local).await
    }

    /// Capture the screen and return the PNG in memory
    pub async fn screenshot_png(&self) -> Result<Screenshot> {
        let session = self.session.lock().await;
        capture::capture_png(session.device()).await
    }
}

fn window_filter(key: WindowFilter, value: Value) -> Params {
    let mut filter = Params::new();
    filter.insert(key.as_str().to_string(), value);
    filter
}

async fn install_helpers<B: Bridge>(session: &Session<B>, dir: &Path) -> Result<()> {
    for name in HELPER_HAPS {
        let hap = dir.join(name);
        if !tokio::fs::try_exists(&hap).await? {
            continue;
        }
        let installed = session.device().install_app(&hap).await?;
        info!("install {}: {installed}", hap.display());
    }
    Ok(())
}

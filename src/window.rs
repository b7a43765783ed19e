//! Window handles

use crate::bridge::Bridge;
use crate::error::{DriverError, Result};
use crate::protocol::{
    decode_value, value_as_bool, value_as_i64, value_to_string, Command, WindowAction,
};
use crate::session::SessionRef;
use crate::types::{Rect, WindowAttribute, WindowMode, WindowRecord};
use serde_json::{Map, Value};
use std::fmt;

pub struct Window<B: Bridge> {
    session: SessionRef<B>,
    wuid: String,
    properties: Map<String, Value>,
}

impl<B: Bridge> Window<B> {
    pub fn new(session: SessionRef<B>, record: WindowRecord) -> Self {
        Self {
            session,
            wuid: record.wuid,
            properties: record.property,
        }
    }

    pub fn wuid(&self) -> &str {
        &self.wuid
    }

    pub fn invalidate(&mut self) {
        self.properties.clear();
    }

    /// All properties, fetched with `info` when nothing is cached
    pub async fn properties(&mut self) -> Result<&Map<String, Value>> {
        if self.properties.is_empty() {
            match self.get("info").await? {
                Value::Object(map) => self.properties = map,
                other => {
                    return Err(DriverError::Protocol(format!(
                        "window info is not an object: {other}"
                    )))
                }
            }
        }
        Ok(&self.properties)
    }

    pub async fn attribute(&mut self, attribute: WindowAttribute) -> Result<Value> {
        self.properties().await?;
        let name = attribute.as_str();
        if let Some(value) = self.properties.get(name) {
            return Ok(value.clone());
        }
        let value = self.get(name).await?;
        self.properties.insert(name.to_string(), value.clone());
        Ok(value)
    }

    async fn get(&self, property: &str) -> Result<Value> {
        let reply = self
            .session
            .request(&Command::WindowGet {
                wuid: self.wuid.clone(),
                property: property.to_string(),
            })
            .await?;
        Ok(reply.into_data())
    }

    async fn flag(&mut self, attribute: WindowAttribute) -> Result<bool> {
        let value = self.attribute(attribute).await?;
        value_as_bool(&value).ok_or_else(|| {
            DriverError::Protocol(format!("{attribute} is not a boolean: {value}"))
        })
    }

    pub async fn title(&mut self) -> Result<String> {
        Ok(value_to_string(&self.attribute(WindowAttribute::Title).await?))
    }

    pub async fn bundle_name(&mut self) -> Result<String> {
        Ok(value_to_string(
            &self.attribute(WindowAttribute::BundleName).await?,
        ))
    }

    pub async fn bounds(&mut self) -> Result<Rect> {
        decode_value(self.attribute(WindowAttribute::Bounds).await?, "bounds")
    }

    pub async fn window_mode(&mut self) -> Result<WindowMode> {
        let value = self.attribute(WindowAttribute::WindowMode).await?;
        value_as_i64(&value)
            .and_then(WindowMode::from_code)
            .ok_or_else(|| DriverError::Protocol(format!("unknown window mode: {value}")))
    }

    pub async fn is_focused(&mut self) -> Result<bool> {
        self.flag(WindowAttribute::IsFocused).await
    }

    pub async fn is_actived(&mut self) -> Result<bool> {
        self.flag(WindowAttribute::IsActived).await
    }

    pub async fn is_active(&mut self) -> Result<bool> {
        self.flag(WindowAttribute::IsActive).await
    }

    async fn act(&self, action: WindowAction) -> Result<()> {
        self.session
            .request(&Command::WindowAction {
                wuid: self.wuid.clone(),
                action,
            })
            .await?;
        Ok(())
    }

    pub async fn focus(&self) -> Result<()> {
        self.act(WindowAction::Focus).await
    }

    pub async fn move_to(&self, x: i32, y: i32) -> Result<()> {
        self.act(WindowAction::MoveTo { x, y }).await
    }

    pub async fn maximize(&self) -> Result<()> {
        self.act(WindowAction::Maximize).await
    }

    pub async fn minimize(&self) -> Result<()> {
        self.act(WindowAction::Minimize).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.act(WindowAction::Resume).await
    }

    pub async fn close(&self) -> Result<()> {
        self.act(WindowAction::Close).await
    }
}

impl<B: Bridge> fmt::Display for Window<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |key: &str| {
            self.properties
                .get(key)
                .map(value_to_string)
                .unwrap_or_else(|| "?".to_string())
        };
        write!(
            f,
            "<Window(wuid={}, title={}, bundleName={}, windowMode={}, bounds={}, isFocused={}, isActive={})>",
            self.wuid,
            show("title"),
            show("bundleName"),
            show("windowMode"),
            show("bounds"),
            show("isFocused"),
            show("isActive")
        )
    }
}

impl<B: Bridge> fmt::Debug for Window<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("wuid", &self.wuid)
            .field("properties", &self.properties)
            .finish()
    }
}

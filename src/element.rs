//! UI element handles

use crate::bridge::Bridge;
use crate::error::{DriverError, Result};
use crate::protocol::{
    decode_value, value_as_bool, value_to_string, Command, ElementOp,
};
use crate::session::SessionRef;
use crate::types::{By, ElementAttribute, ElementRecord, Point, Rect};
use log::error;
use serde_json::{Map, Value};
use std::fmt;

/// Property name that fetches every property at once
const INFO: &str = "info";

/// An element found on screen, identified by the agent-assigned euid.
///
/// Properties are cached as they are read. The cache starts with whatever the
/// find reply carried; a key already cached is never fetched again until
/// [`Element::invalidate`] empties the cache.
pub struct Element<B: Bridge> {
    session: SessionRef<B>,
    euid: String,
    properties: Map<String, Value>,
}

impl<B: Bridge> Element<B> {
    pub fn new(session: SessionRef<B>, record: ElementRecord) -> Self {
        Self {
            session,
            euid: record.euid,
            properties: record.property,
        }
    }

    pub fn euid(&self) -> &str {
        &self.euid
    }

    /// Cached properties, without touching the agent
    pub fn cached(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Forget every cached property
    pub fn invalidate(&mut self) {
        self.properties.clear();
    }

    /// All properties, fetched wholesale when the cache is empty
    pub async fn properties(&mut self) -> Result<&Map<String, Value>> {
        if self.properties.is_empty() {
            let data = self.get(INFO).await?;
            self.properties = match data {
                Value::Object(map) => map,
                other => {
                    return Err(DriverError::Protocol(format!(
                        "element info is not an object: {other}"
                    )))
                }
            };
        }
        Ok(&self.properties)
    }

    /// One property, fetched at most once
    pub async fn property(&mut self, name: &str) -> Result<Value> {
        self.properties().await?;
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
            .request(&Command::Get {
                euid: self.euid.clone(),
                property: property.to_string(),
            })
            .await?;
        Ok(reply.into_data())
    }

    pub async fn attribute(&mut self, attribute: ElementAttribute) -> Result<Value> {
        self.property(attribute.as_str()).await
    }

    async fn text_attribute(&mut self, attribute: ElementAttribute) -> Result<String> {
        Ok(value_to_string(&self.attribute(attribute).await?))
    }

    async fn flag(&mut self, attribute: ElementAttribute) -> Result<bool> {
        let value = self.attribute(attribute).await?;
        value_as_bool(&value).ok_or_else(|| {
            DriverError::Protocol(format!("{attribute} is not a boolean: {value}"))
        })
    }

    pub async fn id(&mut self) -> Result<String> {
        self.text_attribute(ElementAttribute::Id).await
    }

    pub async fn text(&mut self) -> Result<String> {
        self.text_attribute(ElementAttribute::Text).await
    }

    /// Component type, e.g. `Button`
    pub async fn type_name(&mut self) -> Result<String> {
        self.text_attribute(ElementAttribute::Type).await
    }

    pub async fn description(&mut self) -> Result<String> {
        self.text_attribute(ElementAttribute::Description).await
    }

    pub async fn bounds(&mut self) -> Result<Rect> {
        decode_value(self.attribute(ElementAttribute::Bounds).await?, "bounds")
    }

    pub async fn bounds_center(&mut self) -> Result<Point> {
        decode_value(
            self.attribute(ElementAttribute::BoundsCenter).await?,
            "boundsCenter",
        )
    }

    pub async fn is_clickable(&mut self) -> Result<bool> {
        self.flag(ElementAttribute::IsClickable).await
    }

    pub async fn is_long_clickable(&mut self) -> Result<bool> {
        self.flag(ElementAttribute::IsLongClickable).await
    }

    pub async fn is_scrollable(&mut self) -> Result<bool> {
        self.flag(ElementAttribute::IsScrollable).await
    }

    pub async fn is_enabled(&mut self) -> Result<bool> {
        self.flag(ElementAttribute::IsEnabled).await
    }

    pub async fn is_focused(&mut self) -> Result<bool> {
        self.flag(ElementAttribute::IsFocused).await
    }

    pub async fn is_selected(&mut self) -> Result<bool> {
        self.flag(ElementAttribute::IsSelected).await
    }

    pub async fn is_checked(&mut self) -> Result<bool> {
        self.flag(ElementAttribute::IsChecked).await
    }

    pub async fn is_checkable(&mut self) -> Result<bool> {
        self.flag(ElementAttribute::IsCheckable).await
    }

    /// Perform an operation and return the agent's `data` payload
    pub async fn operate(&self, op: ElementOp) -> Result<Value> {
        let reply = self
            .session
            .request(&Command::Operate {
                euid: self.euid.clone(),
                op,
            })
            .await?;
        Ok(reply.into_data())
    }

    pub async fn click(&self) -> Result<Value> {
        self.operate(ElementOp::Click).await
    }

    /// Alias for [`Element::click`]
    pub async fn tap(&self) -> Result<Value> {
        self.click().await
    }

    pub async fn double_click(&self) -> Result<Value> {
        self.operate(ElementOp::DoubleClick).await
    }

    pub async fn long_click(&self) -> Result<Value> {
        self.operate(ElementOp::LongClick).await
    }

    pub async fn input_text(&self, text: &str) -> Result<Value> {
        self.operate(ElementOp::Input(text.to_string())).await
    }

    pub async fn clear(&self) -> Result<Value> {
        self.operate(ElementOp::Clear).await
    }

    pub async fn scroll_to_top(&self, speed: f64) -> Result<Value> {
        self.operate(ElementOp::ScrollToTop { speed }).await
    }

    pub async fn scroll_to_bottom(&self, speed: f64) -> Result<Value> {
        self.operate(ElementOp::ScrollToBottom { speed }).await
    }

    pub async fn drag_to(&self, target: &Element<B>) -> Result<Value> {
        self.operate(ElementOp::DragTo(target.euid.clone())).await
    }

    pub async fn pinch_out(&self, scale: f64) -> Result<Value> {
        self.operate(ElementOp::PinchOut { scale }).await
    }

    pub async fn pinch_in(&self, scale: f64) -> Result<Value> {
        self.operate(ElementOp::PinchIn { scale }).await
    }

    /// Scroll this container until an element matching `by`/`data` appears.
    ///
    /// `Ok(None)` when the agent found nothing.
    pub async fn scroll_search(&self, by: By, data: &str) -> Result<Option<Element<B>>> {
        let command = Command::Operate {
            euid: self.euid.clone(),
            op: ElementOp::ScrollSearch {
                by,
                data: data.to_string(),
            },
        };
        match self.session.request(&command).await {
            Ok(reply) => {
                let record: ElementRecord = reply.decode()?;
                Ok(Some(Element::new(self.session.clone(), record)))
            }
            Err(e) if e.is_absent() => {
                error!("find element Error! {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl<B: Bridge> fmt::Display for Element<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |key: &str| {
            self.properties
                .get(key)
                .map(value_to_string)
                .unwrap_or_else(|| "?".to_string())
        };
        write!(
            f,
            "<Element(euid={}, id={}, text={}, type={}, bounds={}, bounds_center={})>",
            self.euid,
            show("id"),
            show("text"),
            show("type"),
            show("bounds"),
            show("boundsCenter")
        )
    }
}

impl<B: Bridge> fmt::Debug for Element<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("euid", &self.euid)
            .field("properties", &self.properties)
            .finish()
    }
}

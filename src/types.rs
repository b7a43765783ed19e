//! Common types for the hmdriver library

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Extra match conditions sent alongside a locator, keyed by [`By`] names
pub type Params = Map<String, Value>;

/// Point structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Rectangle structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Point {
        Point::new((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }
}

/// Display size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: i32,
    pub height: i32,
}

/// Element reference as returned by `find`, `finds` and `scrollSearch`
#[derive(Debug, Clone, Deserialize)]
pub struct ElementRecord {
    #[serde(deserialize_with = "handle_id")]
    pub euid: String,
    #[serde(default)]
    pub property: Map<String, Value>,
}

/// Window reference as returned by `window find`; the agent names the id `euid`
#[derive(Debug, Clone, Deserialize)]
pub struct WindowRecord {
    #[serde(alias = "euid", deserialize_with = "handle_id")]
    pub wuid: String,
    #[serde(default)]
    pub property: Map<String, Value>,
}

/// Handle ids are strings, but one made of digits arrives expanded to a number.
fn handle_id<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a handle id, got {other}"
        ))),
    }
}

macro_rules! wire_names {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Name the agent uses on the wire
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_names! {
    /// Element locator kinds
    By {
        Id => "id",
        Text => "text",
        Type => "type",
        Description => "description",
        Clickable => "clickable",
        LongClickable => "longClickable",
        Scrollable => "scrollable",
        Enabled => "enabled",
        Focused => "focused",
        Selected => "selected",
        Checked => "checked",
        Checkable => "checkable",
        IsBefore => "isBefore",
        IsAfter => "isAfter",
    }
}

wire_names! {
    /// Element properties readable with `get`
    ElementAttribute {
        Id => "id",
        Text => "text",
        Type => "type",
        Description => "description",
        Bounds => "bounds",
        BoundsCenter => "boundsCenter",
        IsClickable => "isClickable",
        IsLongClickable => "isLongClickable",
        IsScrollable => "isScrollable",
        IsEnabled => "isEnabled",
        IsFocused => "isFocused",
        IsSelected => "isSelected",
        IsChecked => "isChecked",
        IsCheckable => "isCheckable",
    }
}

wire_names! {
    /// Component types, usable as the value of a [`By::Type`] locator
    ElementType {
        Text => "Text",
        TextInput => "TextInput",
        Button => "Button",
        Image => "Image",
        Column => "Column",
        Divider => "Divider",
        TabBar => "TabBar",
        Row => "Row",
        Stack => "Stack",
        XComponent => "XComponent",
        Flex => "Flex",
        Canvas => "Canvas",
        RelativeContainer => "RelativeContainer",
        ListItem => "ListItem",
        GridItem => "GridItem",
        Grid => "Grid",
        TabContent => "TabContent",
        Swiper => "Swiper",
        Tabs => "Tabs",
    }
}

wire_names! {
    /// Window filter keys for `window find`
    WindowFilter {
        BundleName => "bundleName",
        Title => "title",
        Focused => "focused",
        Actived => "actived",
        Active => "active",
    }
}

wire_names! {
    /// Window properties readable with `window get`
    WindowAttribute {
        BundleName => "bundleName",
        Bounds => "bounds",
        Title => "title",
        WindowMode => "windowMode",
        IsFocused => "isFocused",
        IsActived => "isActived",
        IsActive => "isActive",
    }
}

/// Fling direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UiDirection {
    Left = 0,
    Right = 1,
    Up = 2,
    Down = 3,
}

impl UiDirection {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Screen rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DisplayRotation {
    Rotation0 = 0,
    Rotation90 = 1,
    Rotation180 = 2,
    Rotation270 = 3,
}

impl DisplayRotation {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Rotation0),
            1 => Some(Self::Rotation90),
            2 => Some(Self::Rotation180),
            3 => Some(Self::Rotation270),
            _ => None,
        }
    }
}

/// Window display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WindowMode {
    Fullscreen = 0,
    Primary = 1,
    Secondary = 2,
    Floating = 3,
}

impl WindowMode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Fullscreen),
            1 => Some(Self::Primary),
            2 => Some(Self::Secondary),
            3 => Some(Self::Floating),
            _ => None,
        }
    }
}

/// HarmonyOS key codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[repr(i32)]
pub enum KeyCode {
    Home = 1,
    Back = 2,
    MediaPlayPause = 10,
    MediaStop = 11,
    MediaNext = 12,
    MediaPrevious = 13,
    VolumeUp = 16,
    VolumeDown = 17,
    Power = 18,
    Camera = 19,
    VolumeMute = 22,

    // Numbers
    Num0 = 2000,
    Num1 = 2001,
    Num2 = 2002,
    Num3 = 2003,
    Num4 = 2004,
    Num5 = 2005,
    Num6 = 2006,
    Num7 = 2007,
    Num8 = 2008,
    Num9 = 2009,

    // Navigation
    DpadUp = 2012,
    DpadDown = 2013,
    DpadLeft = 2014,
    DpadRight = 2015,

    // Letters
    A = 2017,
    B = 2018,
    C = 2019,
    D = 2020,
    E = 2021,
    F = 2022,
    G = 2023,
    H = 2024,
    I = 2025,
    J = 2026,
    K = 2027,
    L = 2028,
    M = 2029,
    N = 2030,
    O = 2031,
    P = 2032,
    Q = 2033,
    R = 2034,
    S = 2035,
    T = 2036,
    U = 2037,
    V = 2038,
    W = 2039,
    X = 2040,
    Y = 2041,
    Z = 2042,

    // Special keys
    Tab = 2049,
    Space = 2050,
    Enter = 2054,
    Backspace = 2055,
    Escape = 2070,
    Delete = 2071,
}

impl KeyCode {
    /// Numeric code sent to the agent
    pub fn code(&self) -> i32 {
        *self as i32
    }
}

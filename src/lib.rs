//! hmdriver - remote control for the HarmonyOS UI test agent
//!
//! The agent runs on the phone inside a UI test package and speaks JSON over
//! TCP. This library reaches it through an `hdc fport` forward, keeps it
//! running, and turns commands into correlated request/response exchanges
//! with deadlines, reconnects and typed errors.
//!
//! # Example
//!
//! ```rust,no_run
//! use hmdriver::{By, Driver, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> hmdriver::Result<()> {
//!     let config = SessionConfig::new("FMR0223C13000649");
//!     let driver = Driver::connect(&config, "com.example.app", "EntryAbility").await?;
//!
//!     driver.home().await?;
//!     if let Some(mut settings) = driver.find_element(By::Text, "设置", None, 10).await? {
//!         println!("{}", settings.bounds().await?.center().x);
//!         settings.click().await?;
//!     }
//!
//!     let size = driver.screen_size().await?;
//!     println!("{}x{}", size.width, size.height);
//!
//!     driver.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Example - Raw Session
//!
//! ```rust,no_run
//! use hmdriver::{Command, Hdc, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> hmdriver::Result<()> {
//!     let config = SessionConfig::new("127.0.0.1:5555");
//!     let mut session = Session::open(Hdc::default(), &config).await?;
//!
//!     let reply = session.request(&Command::CurrentBundle).await?;
//!     println!("{:?}", reply.data());
//!
//!     session.stop().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod capture;
pub mod config;
pub mod device;
pub mod driver;
pub mod element;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;
pub mod types;
pub mod window;

// Re-export commonly used types
pub use bridge::{Bridge, Hdc};
pub use capture::Screenshot;
pub use config::SessionConfig;
pub use device::Device;
pub use driver::Driver;
pub use element::Element;
pub use engine::RequestEngine;
pub use error::{DriverError, Result};
pub use protocol::{Command, Reply, WaitHints};
pub use session::Session;
pub use transport::{Transport, TransportManager};
pub use types::{
    By, DisplayRotation, ElementAttribute, KeyCode, Params, Point, Rect, ScreenSize, UiDirection,
    WindowFilter, WindowMode,
};
pub use window::Window;

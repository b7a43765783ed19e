//! Screenshots pulled off the device

use crate::bridge::Bridge;
use crate::device::Device;
use crate::error::Result;
use image::{GenericImageView, ImageFormat, RgbaImage};
use log::warn;
use std::path::{Path, PathBuf};

/// Screenshot data
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// PNG bytes as produced by the device
    png: Vec<u8>,
}

impl Screenshot {
    /// Wrap PNG bytes, reading the dimensions from the header
    pub fn from_png(png: Vec<u8>) -> Result<Self> {
        let img = image::load_from_memory_with_format(&png, ImageFormat::Png)?;
        let (width, height) = img.dimensions();
        Ok(Self { width, height, png })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_png(std::fs::read(path)?)
    }

    /// [`Screenshot::load`] without blocking the runtime
    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_png(tokio::fs::read(path).await?)
    }

    /// Save screenshot to file, as-is
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.png)?;
        Ok(())
    }

    pub fn png(&self) -> &[u8] {
        &self.png
    }

    pub fn into_png(self) -> Vec<u8> {
        self.png
    }

    /// Decode to RGBA pixels
    pub fn to_rgba(&self) -> Result<RgbaImage> {
        let img = image::load_from_memory_with_format(&self.png, ImageFormat::Png)?;
        Ok(img.to_rgba8())
    }
}

/// Capture into `local`, or `screenshot.png` in the working directory.
pub async fn capture_file<B: Bridge>(device: &Device<B>, local: Option<&Path>) -> Result<PathBuf> {
    let local = local
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("screenshot.png"));
    device.capture_screen(&local).await?;
    Ok(local)
}

/// Capture to a scratch file and load it; the scratch file is removed.
pub async fn capture_png<B: Bridge>(device: &Device<B>) -> Result<Screenshot> {
    let scratch = std::env::temp_dir().join(format!(
        "hmdriver-{}-{}.png",
        device.serial().replace([':', '/', '\\'], "_"),
        crate::engine::new_correlation_id()
    ));
    capture_through(device, &scratch).await
}

async fn capture_through<B: Bridge>(device: &Device<B>, scratch: &Path) -> Result<Screenshot> {
    let shot = match capture_file(device, Some(scratch)).await {
        Ok(path) => Screenshot::read(&path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = tokio::fs::remove_file(scratch).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove {}: {e}", scratch.display());
        }
    }
    shot
}

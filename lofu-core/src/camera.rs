//! Camera access.
//!
//! The camera is a singleton: it is acquired through
//! [`CameraLease::acquire`] and released when the lease is dropped, so
//! every exit path (discard, successful capture, teardown) stops the
//! stream. At most one lease exists per camera; a second acquire fails
//! with [`LofuError::CameraUnavailable`] until the first is dropped.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::codec::EncodedImage;
use crate::error::{LofuError, Result};

/// One frame of the live stream at native resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub image: EncodedImage,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// A stream that has not reported its intrinsic size yet yields frames
    /// with zero dimensions.
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// A video source.
///
/// `stop` is synchronous so it can run from `Drop`.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Open the stream. Fails with [`LofuError::CameraUnavailable`] when
    /// permission is denied, no device exists or the stream is already
    /// running.
    async fn start(&self) -> Result<()>;

    /// Snapshot the current frame.
    async fn frame(&self) -> Result<Frame>;

    /// Release the stream.
    fn stop(&self);

    fn is_streaming(&self) -> bool;
}

const IN_USE: &str = "camera already in use";

/// Exclusive hold on a started camera; dropping it stops the stream.
pub struct CameraLease {
    camera: Arc<dyn Camera>,
}

impl CameraLease {
    pub async fn acquire(camera: Arc<dyn Camera>) -> Result<Self> {
        if camera.is_streaming() {
            return Err(LofuError::CameraUnavailable(IN_USE.into()));
        }
        camera.start().await?;
        debug!("Camera stream acquired");
        Ok(Self { camera })
    }

    pub async fn frame(&self) -> Result<Frame> {
        self.camera.frame().await
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.camera.stop();
        debug!("Camera stream released");
    }
}

impl std::fmt::Debug for CameraLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraLease")
            .field("streaming", &self.camera.is_streaming())
            .finish()
    }
}

/// A camera that streams a single still image.
///
/// Used by the command-line driver and by tests; `warmup_frames` makes the
/// first frames report zero dimensions like a stream that is still starting.
pub struct StillCamera {
    image: EncodedImage,
    width: u32,
    height: u32,
    available: bool,
    warmup_frames: AtomicUsize,
    streaming: AtomicBool,
    starts: AtomicUsize,
}

impl StillCamera {
    /// Build from an encoded image; its intrinsic size is read from the
    /// header.
    pub fn from_image(image: EncodedImage) -> Result<Self> {
        let (width, height) = image.dimensions()?;
        Ok(Self::with_dimensions(image, width, height))
    }

    pub fn with_dimensions(image: EncodedImage, width: u32, height: u32) -> Self {
        Self {
            image,
            width,
            height,
            available: true,
            warmup_frames: AtomicUsize::new(0),
            streaming: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
        }
    }

    /// Simulate a denied permission prompt.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_warmup(self, frames: usize) -> Self {
        self.warmup_frames.store(frames, Ordering::SeqCst);
        self
    }

    /// How many times the stream has been started.
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Camera for StillCamera {
    async fn start(&self) -> Result<()> {
        if !self.available {
            return Err(LofuError::CameraUnavailable("permission denied".into()));
        }
        if self
            .streaming
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LofuError::CameraUnavailable(IN_USE.into()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        info!(width = self.width, height = self.height, "Still camera started");
        Ok(())
    }

    async fn frame(&self) -> Result<Frame> {
        if !self.streaming.load(Ordering::SeqCst) {
            return Err(LofuError::CameraUnavailable("stream is not running".into()));
        }
        let warming_up = self
            .warmup_frames
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let (width, height) = if warming_up { (0, 0) } else { (self.width, self.height) };
        Ok(Frame {
            image: self.image.clone(),
            width,
            height,
        })
    }

    fn stop(&self) {
        self.streaming.store(false, Ordering::SeqCst);
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }
}

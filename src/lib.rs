//! Framecast drives a headless Chromium instance to screen-record an
//! animated web page and encodes the captured frames into an MP4.
//!
//! The pipeline runs in four sequential stages:
//!
//! - [`browser::BrowserController`] launches the browser, binds one page to
//!   the target URL at an exact viewport, and waits for the page's readiness
//!   signal.
//! - [`capture::capture_animation`] drives a frame-accurate capture loop,
//!   pushing the frame index into the page and screenshotting each settled
//!   paint into a [`FrameStore`].
//! - [`progress::ProgressReporter`] posts throttled, best-effort progress to
//!   an optional webhook.
//! - [`encode::encode_mp4`] hands the finished frame sequence to `ffmpeg`.
//!
//! The page side of the exchange is a small global-variable contract,
//! documented in [`contract`].
#![forbid(unsafe_code)]

pub mod browser;
pub mod capture;
pub mod config;
pub mod contract;
pub mod encode;
pub mod error;
pub mod pipeline;
pub mod progress;

pub use capture::{CaptureOutcome, FrameStore};
pub use config::{CaptureBound, RenderConfig};
pub use contract::PageMeta;
pub use error::{FramecastError, FramecastResult};
pub use pipeline::run;
pub use progress::{ProgressReporter, RenderStatus};

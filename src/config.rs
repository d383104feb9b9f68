use std::path::PathBuf;

use clap::Parser;

use crate::error::{FramecastError, FramecastResult};

/// One run's immutable configuration.
///
/// Every option is sourced from the environment variables the render variants
/// historically used; the flags exist for interactive use and override the
/// environment.
#[derive(Parser, Clone, Debug)]
#[command(name = "framecast", version)]
pub struct RenderConfig {
    /// Page URL to capture.
    #[arg(long, env = "RENDER_URL")]
    pub url: Option<String>,

    /// Viewport width in pixels.
    #[arg(long, env = "WIDTH", default_value_t = 1080)]
    pub width: u32,

    /// Viewport height in pixels.
    #[arg(long, env = "HEIGHT", default_value_t = 1080)]
    pub height: u32,

    /// Capture frame rate.
    #[arg(long, env = "FPS", default_value_t = 30)]
    pub fps: u32,

    /// Fixed capture duration in milliseconds. When set (and non-zero),
    /// exactly `ceil(duration * fps / 1000)` frames are captured and the
    /// page's completion signal is ignored. 0 behaves like absent.
    #[arg(long, env = "DURATION")]
    pub duration_ms: Option<u64>,

    /// Safety ceiling in seconds for signal-driven capture. 0 or absent means
    /// unbounded: capture runs until the page signals completion.
    #[arg(long, env = "MAX_SECONDS")]
    pub max_seconds: Option<f64>,

    /// Output file name. Overrides the name derived from page metadata.
    #[arg(long, env = "OUTPUT")]
    pub output: Option<String>,

    /// Directory receiving the captured frame sequence.
    #[arg(long, env = "FRAMES_DIR", default_value = "frames")]
    pub frames_dir: PathBuf,

    /// Progress webhook endpoint. Reporting is disabled unless both this and
    /// the render id are set.
    #[arg(long, env = "PROGRESS_WEBHOOK")]
    pub progress_webhook: Option<String>,

    /// Run identifier sent with each progress report.
    #[arg(long, env = "RENDER_ID")]
    pub render_id: Option<String>,

    /// How long to wait for the page readiness signal.
    #[arg(long, env = "READY_TIMEOUT_MS", default_value_t = 20_000)]
    pub ready_timeout_ms: u64,
}

/// Capture strategy selector: one loop, three bounding modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureBound {
    /// Capture exactly this many frames; the completion signal is ignored.
    Fixed(u64),
    /// Capture until the page signals completion, optionally capped at a
    /// safety ceiling. `None` is an accepted configuration, not an error.
    Signal { ceiling: Option<u64> },
}

impl CaptureBound {
    /// Upper bound on primary frames, if any.
    pub fn limit(self) -> Option<u64> {
        match self {
            CaptureBound::Fixed(n) => Some(n),
            CaptureBound::Signal { ceiling } => ceiling,
        }
    }

    /// Whether the loop should poll the page completion signal.
    pub fn signal_driven(self) -> bool {
        matches!(self, CaptureBound::Signal { .. })
    }
}

impl RenderConfig {
    pub fn validate(&self) -> FramecastResult<()> {
        let Some(url) = self.url.as_deref() else {
            return Err(FramecastError::configuration(
                "missing RENDER_URL (no page to capture)",
            ));
        };
        if url.trim().is_empty() {
            return Err(FramecastError::configuration("RENDER_URL is empty"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(FramecastError::configuration(
                "viewport width/height must be non-zero",
            ));
        }
        if self.fps == 0 {
            return Err(FramecastError::configuration("fps must be non-zero"));
        }
        Ok(())
    }

    /// The validated target URL. Call after [`RenderConfig::validate`].
    pub fn target_url(&self) -> &str {
        self.url.as_deref().unwrap_or_default()
    }

    /// Derive the capture bound from the configured durations.
    ///
    /// A fixed duration wins over the safety ceiling; absent/zero ceiling
    /// means unbounded signal-driven capture.
    pub fn capture_bound(&self) -> CaptureBound {
        if let Some(ms) = self.duration_ms
            && ms > 0
        {
            return CaptureBound::Fixed(frames_for_millis(ms, self.fps));
        }
        let ceiling = match self.max_seconds {
            Some(secs) if secs > 0.0 => Some(frames_for_seconds(secs, self.fps)),
            _ => None,
        };
        CaptureBound::Signal { ceiling }
    }

    /// Frames captured after the completion signal so the final state settles
    /// on screen (half a second worth).
    pub fn settle_frames(&self) -> u64 {
        (f64::from(self.fps) * 0.5).ceil() as u64
    }
}

/// `ceil(secs * fps)` as a frame count.
pub fn frames_for_seconds(secs: f64, fps: u32) -> u64 {
    (secs * f64::from(fps)).ceil().max(0.0) as u64
}

/// `ceil(ms / 1000 * fps)` as a frame count.
pub fn frames_for_millis(ms: u64, fps: u32) -> u64 {
    (ms * u64::from(fps)).div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> RenderConfig {
        let mut argv = vec!["framecast"];
        argv.extend_from_slice(args);
        RenderConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn validate_requires_url() {
        let cfg = config(&[]);
        assert!(matches!(
            cfg.validate(),
            Err(FramecastError::Configuration(_))
        ));

        let cfg = config(&["--url", "http://localhost:8080/route"]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn defaults_match_render_variants() {
        let cfg = config(&["--url", "http://x"]);
        assert_eq!(cfg.width, 1080);
        assert_eq!(cfg.height, 1080);
        assert_eq!(cfg.fps, 30);
        assert_eq!(cfg.frames_dir, PathBuf::from("frames"));
        assert_eq!(cfg.ready_timeout_ms, 20_000);
    }

    #[test]
    fn ceiling_is_ceil_of_seconds_times_fps() {
        assert_eq!(frames_for_seconds(12.0, 30), 360);
        assert_eq!(frames_for_seconds(0.5, 30), 15);
        assert_eq!(frames_for_seconds(1.01, 24), 25);
        assert_eq!(frames_for_seconds(0.0, 30), 0);
    }

    #[test]
    fn fixed_duration_is_ceil_of_millis() {
        assert_eq!(frames_for_millis(12_000, 30), 360);
        assert_eq!(frames_for_millis(1, 30), 1);
        assert_eq!(frames_for_millis(999, 24), 24);
    }

    #[test]
    fn bound_prefers_fixed_duration() {
        let cfg = config(&["--url", "http://x", "--duration-ms", "2000", "--max-seconds", "60"]);
        assert_eq!(cfg.capture_bound(), CaptureBound::Fixed(60));
    }

    #[test]
    fn absent_or_zero_ceiling_means_unbounded() {
        let cfg = config(&["--url", "http://x"]);
        assert_eq!(cfg.capture_bound(), CaptureBound::Signal { ceiling: None });

        let cfg = config(&["--url", "http://x", "--duration-ms", "0"]);
        assert_eq!(cfg.capture_bound(), CaptureBound::Signal { ceiling: None });

        let cfg = config(&["--url", "http://x", "--max-seconds", "0"]);
        assert_eq!(cfg.capture_bound(), CaptureBound::Signal { ceiling: None });

        let cfg = config(&["--url", "http://x", "--max-seconds", "20"]);
        assert_eq!(
            cfg.capture_bound(),
            CaptureBound::Signal { ceiling: Some(600) }
        );
    }

    #[test]
    fn settle_frames_is_half_a_second_rounded_up() {
        let cfg = config(&["--url", "http://x", "--fps", "30"]);
        assert_eq!(cfg.settle_frames(), 15);

        let cfg = config(&["--url", "http://x", "--fps", "25"]);
        assert_eq!(cfg.settle_frames(), 13);
    }
}

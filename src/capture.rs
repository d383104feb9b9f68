use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use tracing::{debug, info, warn};

use crate::config::RenderConfig;
use crate::contract;
use crate::error::{FramecastError, FramecastResult};
use crate::progress::{ProgressReporter, RenderStatus};

/// On-disk frame sequence for one capture run.
///
/// File indices are contiguous from zero and strictly increasing; the encoder
/// relies on this to reconstruct playback order. The store owns the directory:
/// any pre-existing directory of the same name is removed at creation so
/// frames from a previous run cannot leak into this one.
pub struct FrameStore {
    dir: PathBuf,
    next: u64,
}

impl FrameStore {
    pub fn create(dir: impl Into<PathBuf>) -> FramecastResult<Self> {
        let dir = dir.into();
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("failed to clear frame directory '{}'", dir.display()))?;
        }
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create frame directory '{}'", dir.display()))?;
        Ok(Self { dir, next: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(frame_file_name(index))
    }

    /// The `ffmpeg` image-sequence input pattern matching this store's files.
    pub fn input_pattern(&self) -> PathBuf {
        self.dir.join("frame_%05d.png")
    }

    /// Write the next frame in sequence. Never skips an index.
    pub async fn write_next(&mut self, png: &[u8]) -> FramecastResult<PathBuf> {
        let path = self.frame_path(self.next);
        tokio::fs::write(&path, png)
            .await
            .with_context(|| format!("failed to write frame '{}'", path.display()))?;
        self.next += 1;
        Ok(path)
    }

    pub fn len(&self) -> u64 {
        self.next
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

pub fn frame_file_name(index: u64) -> String {
    format!("frame_{index:05}.png")
}

/// What the capture loop needs from the page under capture.
///
/// [`Page`] is the production implementation; tests drive the loop with a
/// scripted fake.
#[allow(async_fn_in_trait)]
pub trait CaptureSource {
    /// Reset the completion signal and in-page frame counter.
    async fn reset(&self) -> FramecastResult<()>;
    /// Push the authoritative frame index into the page.
    async fn push_frame_index(&self, index: u64) -> FramecastResult<()>;
    /// Wait until the pushed frame is fully painted and composited.
    async fn settle_paint(&self) -> FramecastResult<()>;
    /// Capture the exact viewport as PNG bytes.
    async fn screenshot_png(&self) -> FramecastResult<Vec<u8>>;
    /// Read the page completion signal. Probe faults read as "not done";
    /// the bound is the backstop.
    async fn is_done(&self) -> bool;
}

impl CaptureSource for Page {
    async fn reset(&self) -> FramecastResult<()> {
        self.evaluate(contract::RESET_EXPR)
            .await
            .map_err(|e| FramecastError::browser(format!("failed to reset page signals: {e}")))?;
        Ok(())
    }

    async fn push_frame_index(&self, index: u64) -> FramecastResult<()> {
        self.evaluate(contract::set_frame_expr(index))
            .await
            .map_err(|e| {
                FramecastError::browser(format!("failed to push frame index {index}: {e}"))
            })?;
        Ok(())
    }

    async fn settle_paint(&self) -> FramecastResult<()> {
        self.evaluate(contract::PAINT_SETTLE_EXPR)
            .await
            .map_err(|e| FramecastError::browser(format!("paint settle wait failed: {e}")))?;
        Ok(())
    }

    async fn screenshot_png(&self) -> FramecastResult<Vec<u8>> {
        self.screenshot(
            ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build(),
        )
        .await
        .map_err(|e| FramecastError::browser(format!("screenshot failed: {e}")))
    }

    async fn is_done(&self) -> bool {
        match self.evaluate(contract::DONE_EXPR).await {
            Ok(value) => value.into_value::<bool>().unwrap_or(false),
            Err(e) => {
                debug!("completion probe failed: {e}");
                false
            }
        }
    }
}

/// How a capture run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// Total frames on disk (primary + settle).
    pub frames: u64,
    /// The safety ceiling cut the animation short before the page signaled
    /// completion. A warning, not a failure: whatever frames exist are
    /// encoded.
    pub ceiling_reached: bool,
}

/// Capture the page's animation as an ordered, gap-free frame sequence.
///
/// One loop serves all three bounding modes (fixed count, signal-driven,
/// signal-driven with ceiling). The frame index is pushed into the page
/// before every capture so the animation is keyed to frame number rather
/// than wall clock; capture-loop speed and jitter cannot affect visual
/// output.
pub async fn capture_animation<S: CaptureSource>(
    source: &S,
    cfg: &RenderConfig,
    store: &mut FrameStore,
    progress: &mut ProgressReporter,
) -> FramecastResult<CaptureOutcome> {
    let bound = cfg.capture_bound();
    let report_total = bound.limit();

    source.reset().await?;
    info!(?bound, fps = cfg.fps, "capturing");

    // The Rendering transition is sent even when an unbounded run has no
    // percentage denominator to report against later.
    progress.report(0, RenderStatus::Rendering).await;

    let mut frame: u64 = 0;
    let mut page_done = false;

    loop {
        if let Some(limit) = bound.limit()
            && frame >= limit
        {
            break;
        }

        grab_frame(source, store, frame).await?;
        frame += 1;

        // Let background rendering work breathe between screenshots.
        tokio::task::yield_now().await;

        // Once per second of target fps.
        if frame % u64::from(cfg.fps) == 0 {
            debug!(frame, "captured");
            if let Some(total) = report_total {
                progress
                    .report(percent(frame, total), RenderStatus::Rendering)
                    .await;
            }
        }

        if bound.signal_driven() && source.is_done().await {
            page_done = true;
            break;
        }
    }

    if page_done {
        // Hold the finished state on screen for half a second.
        for _ in 0..cfg.settle_frames() {
            grab_frame(source, store, frame).await?;
            frame += 1;
            tokio::task::yield_now().await;
        }
    }

    let ceiling_reached = bound.signal_driven() && !page_done && bound.limit().is_some();
    if ceiling_reached {
        warn!(
            frames = store.len(),
            "safety ceiling reached before the page signaled completion; animation may be cut short"
        );
    }

    info!(frames = store.len(), "capture finished");
    Ok(CaptureOutcome {
        frames: store.len(),
        ceiling_reached,
    })
}

/// Push the frame index, wait out the paint, screenshot into the next
/// sequential file.
async fn grab_frame<S: CaptureSource>(
    source: &S,
    store: &mut FrameStore,
    index: u64,
) -> FramecastResult<PathBuf> {
    source.push_frame_index(index).await?;
    source.settle_paint().await?;
    let png = source.screenshot_png().await?;
    store.write_next(&png).await
}

fn percent(frame: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((frame * 100) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::config::CaptureBound;
    use clap::Parser as _;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "framecast_capture_{name}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    fn config(args: &[&str]) -> RenderConfig {
        let mut argv = vec!["framecast", "--url", "http://x"];
        argv.extend_from_slice(args);
        RenderConfig::try_parse_from(argv).unwrap()
    }

    /// Signals completion once `done_after` frames have been pushed.
    struct ScriptedPage {
        done_after: Option<u64>,
        pushed: Cell<u64>,
    }

    impl ScriptedPage {
        fn done_after(frames: u64) -> Self {
            Self {
                done_after: Some(frames),
                pushed: Cell::new(0),
            }
        }

        fn never_done() -> Self {
            Self {
                done_after: None,
                pushed: Cell::new(0),
            }
        }
    }

    impl CaptureSource for ScriptedPage {
        async fn reset(&self) -> FramecastResult<()> {
            self.pushed.set(0);
            Ok(())
        }

        async fn push_frame_index(&self, index: u64) -> FramecastResult<()> {
            // The loop must never skip or repeat an index.
            assert_eq!(index, self.pushed.get());
            self.pushed.set(index + 1);
            Ok(())
        }

        async fn settle_paint(&self) -> FramecastResult<()> {
            Ok(())
        }

        async fn screenshot_png(&self) -> FramecastResult<Vec<u8>> {
            Ok(vec![0u8; 8])
        }

        async fn is_done(&self) -> bool {
            match self.done_after {
                Some(n) => self.pushed.get() >= n,
                None => false,
            }
        }
    }

    #[tokio::test]
    async fn completion_after_k_frames_adds_settle_run() {
        let dir = temp_dir("settle");
        let mut store = FrameStore::create(&dir).unwrap();
        let mut progress = ProgressReporter::from_config(None, None);
        let cfg = config(&["--fps", "30"]);

        let page = ScriptedPage::done_after(7);
        let outcome = capture_animation(&page, &cfg, &mut store, &mut progress)
            .await
            .unwrap();

        // 7 primary frames plus ceil(30 * 0.5) settle frames.
        assert_eq!(outcome.frames, 7 + 15);
        assert!(!outcome.ceiling_reached);
        assert!(store.frame_path(21).exists());
        assert!(!store.frame_path(22).exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn completion_wins_over_a_larger_ceiling() {
        let dir = temp_dir("completion_first");
        let mut store = FrameStore::create(&dir).unwrap();
        let mut progress = ProgressReporter::from_config(None, None);
        let cfg = config(&["--fps", "4", "--max-seconds", "100"]);

        let page = ScriptedPage::done_after(3);
        let outcome = capture_animation(&page, &cfg, &mut store, &mut progress)
            .await
            .unwrap();

        assert_eq!(outcome.frames, 3 + 2);
        assert!(!outcome.ceiling_reached);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn ceiling_bounds_a_page_that_never_finishes() {
        let dir = temp_dir("ceiling");
        let mut store = FrameStore::create(&dir).unwrap();
        let mut progress = ProgressReporter::from_config(None, None);
        // ceil(0.5 * 10) = 5 primary frames.
        let cfg = config(&["--fps", "10", "--max-seconds", "0.5"]);

        let page = ScriptedPage::never_done();
        let outcome = capture_animation(&page, &cfg, &mut store, &mut progress)
            .await
            .unwrap();

        assert_eq!(outcome.frames, 5);
        assert!(outcome.ceiling_reached);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn fixed_mode_ignores_the_completion_signal() {
        let dir = temp_dir("fixed");
        let mut store = FrameStore::create(&dir).unwrap();
        let mut progress = ProgressReporter::from_config(None, None);
        // 200ms at 20 fps = 4 frames, page claims done after 1.
        let cfg = config(&["--fps", "20", "--duration-ms", "200"]);

        let page = ScriptedPage::done_after(1);
        let outcome = capture_animation(&page, &cfg, &mut store, &mut progress)
            .await
            .unwrap();

        assert_eq!(outcome.frames, 4);
        assert!(!outcome.ceiling_reached);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn frame_file_names_are_zero_padded() {
        assert_eq!(frame_file_name(0), "frame_00000.png");
        assert_eq!(frame_file_name(7), "frame_00007.png");
        assert_eq!(frame_file_name(12_345), "frame_12345.png");
    }

    #[test]
    fn percent_is_clamped_to_100() {
        assert_eq!(percent(0, 360), 0);
        assert_eq!(percent(180, 360), 50);
        assert_eq!(percent(360, 360), 100);
        assert_eq!(percent(400, 360), 100);
        assert_eq!(percent(5, 0), 100);
    }

    #[test]
    fn capture_bound_limits() {
        assert_eq!(CaptureBound::Fixed(60).limit(), Some(60));
        assert_eq!(CaptureBound::Signal { ceiling: None }.limit(), None);
        assert!(CaptureBound::Signal { ceiling: Some(1) }.signal_driven());
        assert!(!CaptureBound::Fixed(60).signal_driven());
    }
}

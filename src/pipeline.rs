use std::path::PathBuf;

use tracing::{info, warn};

use crate::browser::BrowserController;
use crate::capture::{self, CaptureOutcome, FrameStore};
use crate::config::RenderConfig;
use crate::contract::{self, PageMeta};
use crate::encode;
use crate::error::{FramecastError, FramecastResult};
use crate::progress::{ProgressReporter, RenderStatus};

/// Run the whole pipeline: launch the browser, capture the animation, encode
/// the MP4. Returns the output file path.
///
/// Stages run strictly in sequence; the browser is closed (or closing is
/// attempted) on every exit path before the result propagates.
pub async fn run(cfg: &RenderConfig) -> FramecastResult<PathBuf> {
    cfg.validate()?;

    let mut progress =
        ProgressReporter::from_config(cfg.progress_webhook.as_deref(), cfg.render_id.as_deref());
    let mut store = FrameStore::create(&cfg.frames_dir)?;

    let browser = BrowserController::launch(cfg).await?;
    let captured = drive_capture(&browser, cfg, &mut store, &mut progress).await;
    browser.close().await;
    let (outcome, meta) = captured?;

    if store.is_empty() {
        return Err(FramecastError::NoFramesCaptured);
    }

    let out_path = PathBuf::from(encode::output_name(cfg.output.as_deref(), meta.as_ref()));

    progress.report(100, RenderStatus::EncodingMp4).await;
    encode::encode_mp4(&store, cfg.fps, &out_path)?;
    progress.report(100, RenderStatus::Complete).await;

    info!(
        frames = outcome.frames,
        out = %out_path.display(),
        "render complete"
    );
    Ok(out_path)
}

/// Everything that needs the live browser. Kept separate so [`run`] can close
/// the browser regardless of how this ends.
async fn drive_capture(
    browser: &BrowserController,
    cfg: &RenderConfig,
    store: &mut FrameStore,
    progress: &mut ProgressReporter,
) -> FramecastResult<(CaptureOutcome, Option<PageMeta>)> {
    browser.navigate(cfg.target_url()).await?;
    browser.wait_ready().await?;
    let outcome = capture::capture_animation(browser.page(), cfg, store, progress).await?;
    let meta = read_meta(browser).await;
    Ok((outcome, meta))
}

/// Read `__GPX_META__` once after capture. Best-effort: a page that exposes
/// no metadata still encodes under the default name.
async fn read_meta(browser: &BrowserController) -> Option<PageMeta> {
    match browser.page().evaluate(contract::META_EXPR).await {
        Ok(value) => value.into_value::<Option<PageMeta>>().ok().flatten(),
        Err(e) => {
            warn!("failed to read page metadata: {e}");
            None
        }
    }
}

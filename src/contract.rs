//! The in-page signaling contract between the pipeline and the page under
//! capture.
//!
//! The rendered page exposes a handful of globals the pipeline reads and
//! writes over CDP. Changes here must stay compatible with deployed pages, so
//! the names and scripts live in one place instead of being scattered through
//! the capture loop:
//!
//! - `__GPX_READY__`: page sets `true` once animation/data setup is done.
//! - `__GPX_DONE__`: page sets `true` once the animated sequence finished.
//! - `__GPX_FRAME__`: pipeline pushes the current frame index; the page keys
//!   its animation to this value instead of wall-clock time.
//! - `__GPX_META__`: optional `{ name, date }` record the page may expose
//!   after completion, used to derive the output filename.

use serde::Deserialize;

/// Expression evaluating to the readiness flag.
pub const READY_EXPR: &str = "window.__GPX_READY__ === true";

/// Expression evaluating to the completion flag.
pub const DONE_EXPR: &str = "window.__GPX_DONE__ === true";

/// Expression evaluating to the metadata record (or `null`).
pub const META_EXPR: &str = "window.__GPX_META__ || null";

/// Resets the completion flag and frame counter before a capture run.
pub const RESET_EXPR: &str = "window.__GPX_DONE__ = false; window.__GPX_FRAME__ = 0;";

/// Waits for two full rendering/compositing cycles so GPU-backed content
/// (map tiles) is fully drawn before the screenshot.
pub const PAINT_SETTLE_EXPR: &str =
    "(async () => { await new Promise(r => requestAnimationFrame(() => requestAnimationFrame(r))); })()";

/// Script pushing `frame` into the page.
pub fn set_frame_expr(frame: u64) -> String {
    format!("window.__GPX_FRAME__ = {frame};")
}

/// Metadata record a page may expose via `__GPX_META__`.
///
/// Unknown fields are ignored; both fields are optional so a partially
/// populated record still contributes what it has.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct PageMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

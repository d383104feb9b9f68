use serde::Serialize;
use tracing::{debug, warn};

/// Status label accompanying each progress report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderStatus {
    Rendering,
    EncodingMp4,
    Complete,
}

impl RenderStatus {
    pub fn label(self) -> &'static str {
        match self {
            RenderStatus::Rendering => "Rendering",
            RenderStatus::EncodingMp4 => "Encoding MP4",
            RenderStatus::Complete => "Complete",
        }
    }
}

#[derive(Serialize)]
struct ProgressPayload<'a> {
    #[serde(rename = "renderId")]
    render_id: &'a str,
    progress: u8,
    status: &'a str,
}

/// Throttled, best-effort progress notifications to an external webhook.
///
/// Constructed fresh per run so the dedup state cannot leak across runs. A
/// failed or refused report is logged and forgotten; progress reporting must
/// never affect pipeline correctness.
pub struct ProgressReporter {
    target: Option<Target>,
    last: Option<(RenderStatus, u8)>,
}

struct Target {
    url: String,
    render_id: String,
    client: reqwest::Client,
}

impl ProgressReporter {
    /// No-op reporter unless both the webhook URL and the run identifier are
    /// configured.
    pub fn from_config(webhook: Option<&str>, render_id: Option<&str>) -> Self {
        let target = match (webhook, render_id) {
            (Some(url), Some(id)) if !url.trim().is_empty() && !id.trim().is_empty() => {
                Some(Target {
                    url: url.to_string(),
                    render_id: id.to_string(),
                    client: reqwest::Client::new(),
                })
            }
            _ => None,
        };
        Self { target, last: None }
    }

    pub fn enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Queue one report. Duplicate percentages within the same status are
    /// dropped; a status transition always sends. Transport failures are
    /// swallowed: never raised, never retried.
    pub async fn report(&mut self, progress: u8, status: RenderStatus) {
        let Some(target) = &self.target else {
            return;
        };
        if !should_send(self.last, status, progress) {
            return;
        }
        self.last = Some((status, progress));

        let payload = ProgressPayload {
            render_id: &target.render_id,
            progress,
            status: status.label(),
        };
        match target.client.post(&target.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(progress, status = status.label(), "progress reported");
            }
            Ok(resp) => warn!("progress webhook returned {}", resp.status()),
            Err(e) => warn!("progress report failed: {e}"),
        }
    }
}

fn should_send(last: Option<(RenderStatus, u8)>, status: RenderStatus, progress: u8) -> bool {
    match last {
        None => true,
        Some((last_status, last_progress)) => last_status != status || last_progress != progress,
    }
}

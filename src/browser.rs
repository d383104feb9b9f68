use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::js_protocol::runtime::{EventConsoleApiCalled, EventExceptionThrown};
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RenderConfig;
use crate::contract;
use crate::error::{FramecastError, FramecastResult};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Headless browser plus the one page the pipeline captures from.
///
/// Owns the CDP handler task for the lifetime of the run; [`BrowserController::close`]
/// must be called on every exit path so the browser process is not leaked.
pub struct BrowserController {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
    ready_timeout_ms: u64,
}

impl BrowserController {
    /// Launch an isolated headless browser and open a blank page with the
    /// exact configured viewport (no device pixel scaling).
    pub async fn launch(cfg: &RenderConfig) -> FramecastResult<Self> {
        let browser_config = BrowserConfig::builder()
            .no_sandbox()
            .window_size(cfg.width, cfg.height)
            .viewport(Viewport {
                width: cfg.width,
                height: cfg.height,
                device_scale_factor: Some(1.0),
                ..Viewport::default()
            })
            .arg("--disable-setuid-sandbox")
            .arg("--disable-web-security")
            .arg("--autoplay-policy=no-user-gesture-required")
            .build()
            .map_err(FramecastError::browser)?;

        info!(width = cfg.width, height = cfg.height, "launching headless browser");
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| FramecastError::browser(format!("failed to launch browser: {e}")))?;

        // Drive CDP messages until the browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        // From here on the browser process exists; close it before
        // surfacing any setup failure.
        let page = match setup_page(&browser, cfg).await {
            Ok(page) => page,
            Err(e) => {
                let mut browser = browser;
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(e);
            }
        };

        Ok(Self {
            browser,
            handler_task,
            page,
            ready_timeout_ms: cfg.ready_timeout_ms,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Navigate to the target URL and wait for content load. Full network
    /// idle is never awaited: a continuously streaming page (a live map)
    /// would not reach it.
    pub async fn navigate(&self, url: &str) -> FramecastResult<()> {
        info!(url, "navigating");
        self.page
            .goto(url)
            .await
            .map_err(|e| FramecastError::browser(format!("navigation to '{url}' failed: {e}")))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| FramecastError::browser(format!("page load of '{url}' failed: {e}")))?;
        Ok(())
    }

    /// Poll the page readiness signal until it turns true or the bound
    /// elapses.
    pub async fn wait_ready(&self) -> FramecastResult<()> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.ready_timeout_ms);

        loop {
            // Evaluation faults during startup are treated as "not ready yet";
            // the deadline is the real arbiter.
            let ready = match self.page.evaluate(contract::READY_EXPR).await {
                Ok(value) => value.into_value::<bool>().unwrap_or(false),
                Err(e) => {
                    debug!("readiness probe failed: {e}");
                    false
                }
            };
            if ready {
                debug!("page signaled readiness");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FramecastError::ReadinessTimeout {
                    timeout_ms: self.ready_timeout_ms,
                });
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Best-effort shutdown. Errors are logged, not returned: by the time
    /// this runs the capture outcome is already decided.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("browser close failed: {e}");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

async fn setup_page(browser: &Browser, cfg: &RenderConfig) -> FramecastResult<Page> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| FramecastError::browser(format!("failed to open page: {e}")))?;

    // Capture dimensions must match the configuration exactly; the window
    // size alone is not authoritative under headless.
    page.execute(SetDeviceMetricsOverrideParams::new(
        i64::from(cfg.width),
        i64::from(cfg.height),
        1.0,
        false,
    ))
    .await
    .map_err(|e| FramecastError::browser(format!("failed to set viewport: {e}")))?;

    forward_page_console(&page).await;

    Ok(page)
}

/// Surface page console output and uncaught exceptions on the operator's log
/// stream. Page noise is diagnostic only and never aborts the run.
async fn forward_page_console(page: &Page) {
    match page.event_listener::<EventConsoleApiCalled>().await {
        Ok(mut console) => {
            tokio::spawn(async move {
                while let Some(event) = console.next().await {
                    let text = event
                        .args
                        .iter()
                        .filter_map(|arg| arg.value.as_ref().map(|v| v.to_string()))
                        .collect::<Vec<_>>()
                        .join(" ");
                    debug!(kind = ?event.r#type, "page console: {text}");
                }
            });
        }
        Err(e) => warn!("could not subscribe to page console events: {e}"),
    }

    match page.event_listener::<EventExceptionThrown>().await {
        Ok(mut exceptions) => {
            tokio::spawn(async move {
                while let Some(event) = exceptions.next().await {
                    let details = &event.exception_details;
                    let text = details
                        .exception
                        .as_ref()
                        .and_then(|e| e.description.clone())
                        .unwrap_or_else(|| details.text.clone());
                    warn!("page exception: {text}");
                }
            });
        }
        Err(e) => warn!("could not subscribe to page exception events: {e}"),
    }
}

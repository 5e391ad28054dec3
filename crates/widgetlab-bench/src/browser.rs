//! Headless Chromium renderer driving the playground dev server.
//!
//! Each `load` writes the widget through `PUT /api/widget/source`, reloads the viewer
//! and waits until the stage holds a rendered widget. One page is reused for the whole
//! run.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use widgetlab_core::render::STAGE_SELECTOR;

use crate::config::BenchConfig;
use crate::page::RenderedPage;
use crate::renderer::{WidgetFiles, WidgetRenderer};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// [`RenderedPage`] backed by a live browser tab.
#[derive(Debug, Clone)]
pub struct BrowserPage {
    page: Page,
}

impl BrowserPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .context("evaluate script")?
            .into_value()
            .context("decode script result")
    }
}

fn js_string(value: &str) -> Result<String> {
    serde_json::to_string(value).context("encode script argument")
}

// CDP reports `null` results as missing values, so nullable results are wrapped.
#[derive(Debug, Deserialize)]
struct Boxed {
    value: Option<String>,
}

#[async_trait]
impl RenderedPage for BrowserPage {
    async fn count(&self, selector: &str) -> Result<usize> {
        let selector = js_string(selector)?;
        self.eval(format!("document.querySelectorAll({selector}).length"))
            .await
    }

    async fn first_text(&self, selector: &str) -> Result<Option<String>> {
        let selector = js_string(selector)?;
        let boxed: Boxed = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({selector}); \
                 return {{ value: el ? el.textContent : null }}; }})()"
            ))
            .await?;
        Ok(boxed.value)
    }

    async fn first_computed_style(&self, selector: &str, property: &str) -> Result<Option<String>> {
        let selector = js_string(selector)?;
        let property = js_string(property)?;
        let boxed: Boxed = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({selector}); \
                 return {{ value: el ? window.getComputedStyle(el).getPropertyValue({property}) : null }}; }})()"
            ))
            .await?;
        Ok(boxed.value)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
enum StageState {
    Pending,
    Ready,
    Error { message: String },
}

fn readiness_script() -> String {
    format!(
        r#"(() => {{
  const stage = document.querySelector("{STAGE_SELECTOR}");
  if (!stage) {{
    const panel = document.querySelector(".error-panel");
    return panel ? {{ state: "error", message: panel.textContent || "" }} : {{ state: "pending" }};
  }}
  const panel = stage.querySelector(".error-panel");
  if (panel) return {{ state: "error", message: panel.textContent || "" }};
  if (stage.querySelector(".empty-state")) return {{ state: "pending" }};
  return stage.children.length > 0 ? {{ state: "ready" }} : {{ state: "pending" }};
}})()"#
    )
}

/// Chromium plus one tab on the playground viewer.
pub struct PlaygroundBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    page: BrowserPage,
    client: reqwest::Client,
    config: BenchConfig,
    viewport: Option<(u32, u32)>,
}

impl PlaygroundBrowser {
    pub async fn launch(config: BenchConfig) -> Result<Self> {
        let (width, height) = config.viewport;
        let browser_config = BrowserConfig::builder()
            .window_size(width, height)
            .build()
            .map_err(|err| anyhow!("browser config: {err}"))?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("launch chromium")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "browser handler event failed");
                }
            }
        });
        let page = browser
            .new_page("about:blank")
            .await
            .context("open browser page")?;
        let client = reqwest::Client::builder()
            .timeout(config.content_timeout())
            .build()
            .context("build http client")?;

        Ok(Self {
            browser,
            handler,
            page: BrowserPage::new(page),
            client,
            config,
            viewport: None,
        })
    }

    pub async fn close(mut self) -> Result<()> {
        let closed = self.browser.close().await;
        self.handler.abort();
        closed.context("close chromium")?;
        Ok(())
    }

    async fn put_source(&self, files: &WidgetFiles) -> Result<()> {
        let endpoint = self.config.source_endpoint();
        let response = self
            .client
            .put(&endpoint)
            .json(&serde_json::json!({
                "source": files.source,
                "dataSource": files.data_source,
            }))
            .send()
            .await
            .with_context(|| format!("PUT {endpoint}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("PUT /api/widget/source failed ({status}): {body}");
        }
        Ok(())
    }

    async fn apply_viewport(&mut self, viewport: Option<(u32, u32)>) -> Result<()> {
        let wanted = viewport.unwrap_or(self.config.viewport);
        if self.viewport == Some(wanted) {
            return Ok(());
        }
        let (width, height) = wanted;
        self.page
            .page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(width),
                i64::from(height),
                1.0,
                false,
            ))
            .await
            .context("set viewport")?;
        self.viewport = Some(wanted);
        Ok(())
    }

    async fn wait_for_stage(&self) -> Result<()> {
        let timeout = self.config.content_timeout();
        let script = readiness_script();
        let waited = tokio::time::timeout(timeout, async {
            loop {
                match self.page.eval::<StageState>(script.clone()).await {
                    Ok(StageState::Ready) => return Ok(()),
                    Ok(StageState::Error { message }) => {
                        bail!("widget failed to render: {}", message.trim())
                    }
                    Ok(StageState::Pending) => {}
                    Err(err) => warn!(error = %err, "readiness check failed"),
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await;
        match waited {
            Ok(result) => result,
            Err(_) => bail!(
                "timed out after {}ms waiting for {STAGE_SELECTOR}",
                timeout.as_millis()
            ),
        }
    }
}

#[async_trait]
impl WidgetRenderer for PlaygroundBrowser {
    async fn load(&mut self, files: &WidgetFiles, viewport: Option<(u32, u32)>) -> Result<()> {
        self.put_source(files).await?;
        self.apply_viewport(viewport).await?;
        self.page
            .page
            .goto(self.config.base_url.as_str())
            .await
            .with_context(|| format!("navigate to {}", self.config.base_url))?;
        self.wait_for_stage().await?;
        tokio::time::sleep(self.config.settle_delay()).await;
        Ok(())
    }

    async fn screenshot_stage(&mut self) -> Result<Option<Vec<u8>>> {
        let stage = self
            .page
            .page
            .find_element(STAGE_SELECTOR)
            .await
            .context("find render stage")?;
        let png = stage
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .context("capture stage screenshot")?;
        Ok(Some(png))
    }

    fn page(&self) -> &dyn RenderedPage {
        &self.page
    }

    fn name(&self) -> &str {
        "browser"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_state_decoding() {
        let ready: StageState = serde_json::from_str(r#"{"state":"ready"}"#).unwrap();
        assert!(matches!(ready, StageState::Ready));
        let error: StageState =
            serde_json::from_str(r#"{"state":"error","message":"Runtime Error boom"}"#).unwrap();
        assert!(matches!(error, StageState::Error { message } if message == "Runtime Error boom"));
    }

    #[test]
    fn test_readiness_script_targets_stage() {
        let script = readiness_script();
        assert!(script.contains(r#"document.querySelector(".viewer-widget-stage")"#));
        assert!(script.contains(".empty-state"));
    }

    #[test]
    fn test_selector_arguments_are_json_encoded() {
        assert_eq!(js_string(r#"[data-eid="x"]"#).unwrap(), r#""[data-eid=\"x\"]""#);
    }
}

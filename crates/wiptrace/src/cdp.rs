//! chromiumoxide-backed [`PortalDriver`].
//!
//! Drives one Chrome/Chromium page over CDP. The portal is a classic
//! server-rendered app, so element lookup is plain CSS; waiting is a
//! 250 ms poll against `find_element` up to the caller's timeout.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::driver::PortalDriver;
use crate::errors::ScrapeError;

impl From<CdpError> for ScrapeError {
    fn from(err: CdpError) -> Self {
        ScrapeError::Browser(err.to_string())
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct CdpDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl CdpDriver {
    /// Launches a local browser and opens the single page the whole run
    /// uses. Headful by default so the operator can log in by hand.
    pub async fn launch(headless: bool) -> Result<Self, ScrapeError> {
        let mut config = BrowserConfig::builder().arg("--start-maximized");
        if !headless {
            config = config.with_head();
        }
        let config = config.build().map_err(ScrapeError::Browser)?;

        let (browser, mut handler) = Browser::launch(config).await?;
        // CDP event loop; the page is unusable without it.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "CDP handler event error");
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        Ok(CdpDriver {
            browser,
            page,
            handler_task,
        })
    }

    /// Connects to an already-running browser exposing a CDP endpoint.
    pub async fn connect(cdp_url: &str) -> Result<Self, ScrapeError> {
        let (browser, mut handler) = Browser::connect(cdp_url).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "CDP handler event error");
                }
            }
        });
        let page = browser.new_page("about:blank").await?;
        Ok(CdpDriver {
            browser,
            page,
            handler_task,
        })
    }

    pub async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Browser did not close cleanly");
        }
        self.handler_task.abort();
    }
}

#[async_trait]
impl PortalDriver for CdpDriver {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ScrapeError::Navigation(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ScrapeError> {
        self.page
            .url()
            .await?
            .ok_or_else(|| ScrapeError::Browser("page has no URL".to_string()))
    }

    async fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Element, ScrapeError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(_) if Instant::now() < deadline => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(err) => {
                    return Err(ScrapeError::Timeout(format!(
                        "waited {timeout:?} for '{selector}': {err}"
                    )));
                }
            }
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Element>, ScrapeError> {
        // No match is an empty result, not an error.
        match self.page.find_elements(selector).await {
            Ok(elements) => Ok(elements),
            Err(CdpError::NotFound) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_within(
        &self,
        element: &Element,
        selector: &str,
    ) -> Result<Vec<Element>, ScrapeError> {
        match element.find_elements(selector).await {
            Ok(elements) => Ok(elements),
            Err(CdpError::NotFound) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn fill(&self, element: &Element, text: &str) -> Result<(), ScrapeError> {
        element.click().await?;
        element.type_str(text).await?;
        Ok(())
    }

    async fn press_enter(&self, element: &Element) -> Result<(), ScrapeError> {
        element.press_key("Enter").await?;
        Ok(())
    }

    async fn click(&self, element: &Element) -> Result<(), ScrapeError> {
        element.click().await?;
        Ok(())
    }

    async fn read_text(&self, element: &Element) -> Result<String, ScrapeError> {
        Ok(element.inner_text().await?.unwrap_or_default())
    }

    async fn attribute(
        &self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, ScrapeError> {
        Ok(element.attribute(name).await?)
    }

    async fn cookies(&self) -> Result<Value, ScrapeError> {
        let cookies = self.page.get_cookies().await?;
        Ok(serde_json::to_value(cookies)?)
    }

    async fn set_cookies(&self, cookies: Value) -> Result<(), ScrapeError> {
        // The blob is whatever `cookies()` captured; the CDP cookie shape
        // is a superset of the param shape, extra fields are ignored.
        let params: Vec<CookieParam> = serde_json::from_value(cookies)?;
        self.page.set_cookies(params).await?;
        Ok(())
    }
}

//! The browser seam.
//!
//! [`PortalDriver`] is the fixed interface the lookup orchestrator drives;
//! the CDP implementation lives in [`crate::cdp`] and tests script an
//! in-memory one. Session cookies cross the seam as an opaque JSON blob so
//! the library never depends on one browser's cookie shape.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::errors::ScrapeError;

/// Driver over one live browser page.
///
/// `Element` is an opaque handle into the current page; handles are only
/// used between two navigations and never stored across serials.
#[async_trait]
pub trait PortalDriver: Send + Sync {
    type Element: Send + Sync;

    async fn navigate(&self, url: &str) -> Result<(), ScrapeError>;

    async fn current_url(&self) -> Result<String, ScrapeError>;

    /// Waits up to `timeout` for the first element matching a CSS selector.
    async fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Self::Element, ScrapeError>;

    /// All elements currently matching a CSS selector (no waiting).
    async fn find_all(&self, selector: &str) -> Result<Vec<Self::Element>, ScrapeError>;

    /// Elements matching `selector` inside `element`.
    async fn find_within(
        &self,
        element: &Self::Element,
        selector: &str,
    ) -> Result<Vec<Self::Element>, ScrapeError>;

    async fn fill(&self, element: &Self::Element, text: &str) -> Result<(), ScrapeError>;

    async fn press_enter(&self, element: &Self::Element) -> Result<(), ScrapeError>;

    async fn click(&self, element: &Self::Element) -> Result<(), ScrapeError>;

    async fn read_text(&self, element: &Self::Element) -> Result<String, ScrapeError>;

    async fn attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, ScrapeError>;

    /// Current session cookies as an opaque JSON blob.
    async fn cookies(&self) -> Result<Value, ScrapeError>;

    /// Injects cookies previously captured with [`PortalDriver::cookies`].
    async fn set_cookies(&self, cookies: Value) -> Result<(), ScrapeError>;
}

/// Resolves a scraped href against the page it was found on. Absolute
/// hrefs pass through untouched.
pub fn resolve_href(base: &str, href: &str) -> Result<String, ScrapeError> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Ok(href.to_string());
    }
    let base = url::Url::parse(base)
        .map_err(|e| ScrapeError::Navigation(format!("bad base URL '{base}': {e}")))?;
    let joined = base
        .join(href)
        .map_err(|e| ScrapeError::Navigation(format!("bad href '{href}': {e}")))?;
    Ok(joined.into())
}

/// Saves a cookie blob as pretty JSON, as captured after a manual login.
pub fn save_cookies(path: &Path, cookies: &Value) -> Result<(), ScrapeError> {
    std::fs::write(path, serde_json::to_string_pretty(cookies)?)?;
    info!(path = %path.display(), "Saved session cookies");
    Ok(())
}

/// Loads a cookie blob saved by [`save_cookies`]. A missing file is a
/// fatal precondition: the run expects inherited login state.
pub fn load_cookies(path: &Path) -> Result<Value, ScrapeError> {
    if !path.exists() {
        return Err(ScrapeError::PreconditionMissing(format!(
            "cookie file {} not found; run the login command first",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn cookie_blob_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        let blob = json!([{"name": "session", "value": "abc", "domain": ".wareconn.com"}]);
        save_cookies(&path, &blob).unwrap();
        assert_eq!(load_cookies(&path).unwrap(), blob);
    }

    #[test]
    fn missing_cookie_file_is_fatal() {
        let dir = tempdir().unwrap();
        let err = load_cookies(&dir.path().join("cookies.json")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn absolute_hrefs_pass_through() {
        assert_eq!(
            resolve_href("https://wareconn.com/r/Summary/pctls", "https://other.example/x")
                .unwrap(),
            "https://other.example/x"
        );
    }

    #[test]
    fn relative_hrefs_join_against_current_page() {
        assert_eq!(
            resolve_href("https://wareconn.com/r/Summary/pctls", "/r/Repair/view/42").unwrap(),
            "https://wareconn.com/r/Repair/view/42"
        );
        assert_eq!(
            resolve_href("https://wareconn.com/r/Summary/pctls", "detail?id=7").unwrap(),
            "https://wareconn.com/r/Summary/detail?id=7"
        );
    }

    #[test]
    fn bad_base_is_a_navigation_error() {
        assert!(resolve_href("not a url", "/x").is_err());
    }
}

//! The system browser as the client's page
//!
//! A native process has no page of its own. [`SystemBrowser`] stands in for
//! one: navigation opens the URL in the user's default browser, and the
//! "current location" is whatever callback URL the host feeds back in with
//! [`SystemBrowser::set_location`].

use std::sync::Mutex;

use url::Url;

use crate::error::{PassportError, Result};
use crate::platform::Page;

/// [`Page`] that navigates by launching the default browser
#[derive(Debug, Default)]
pub struct SystemBrowser {
    location: Mutex<Option<Url>>,
}

impl SystemBrowser {
    /// Create a page with no current location
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a page positioned at `location`, typically a callback URL
    pub fn with_location(location: Url) -> Self {
        Self {
            location: Mutex::new(Some(location)),
        }
    }

    /// Replace the current location
    pub fn set_location(&self, location: Url) {
        *self.location.lock().unwrap_or_else(|e| e.into_inner()) = Some(location);
    }

    fn try_open_browser(&self, url: &str) {
        #[cfg(target_os = "macos")]
        {
            let _ = std::process::Command::new("open").arg(url).spawn();
        }
        #[cfg(target_os = "linux")]
        {
            let _ = std::process::Command::new("xdg-open").arg(url).spawn();
        }
        #[cfg(target_os = "windows")]
        {
            let _ = std::process::Command::new("cmd")
                .args(["/C", "start", "", url])
                .spawn();
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            let _ = url;
        }
    }
}

impl Page for SystemBrowser {
    fn search(&self) -> String {
        let location = self.location.lock().unwrap_or_else(|e| e.into_inner());
        location
            .as_ref()
            .and_then(|url| url.query())
            .map(|q| format!("?{}", q))
            .unwrap_or_default()
    }

    fn is_top_level(&self) -> bool {
        true
    }

    fn assign(&self, url: &str) -> Result<()> {
        let parsed = Url::parse(url)
            .map_err(|e| PassportError::Navigation(format!("invalid URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PassportError::Navigation(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            ))
            .into());
        }
        // The URL stays usable when no browser can be launched.
        eprintln!("Open the following URL in your browser to sign in:\n{}", parsed);
        self.try_open_browser(parsed.as_str());
        self.set_location(parsed);
        Ok(())
    }
}

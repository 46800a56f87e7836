//! Full-page redirect to the authorize endpoint

use std::sync::Arc;

use crate::error::Result;
use crate::platform::Page;

/// Navigates the current page to the authorize URL
///
/// The response arrives later on the redirect URI, where
/// [`PassportClient::handle_redirect_callback`](crate::auth::session::PassportClient::handle_redirect_callback)
/// picks it up.
#[derive(Clone)]
pub struct RedirectTransport {
    page: Arc<dyn Page>,
}

impl RedirectTransport {
    /// Create a transport over `page`
    pub fn new(page: Arc<dyn Page>) -> Self {
        Self { page }
    }

    /// Start navigating to `url`
    ///
    /// # Errors
    ///
    /// Returns error if the page refuses the navigation
    pub fn run(&self, url: &str) -> Result<()> {
        tracing::debug!("Redirecting page to authorize endpoint");
        self.page.assign(url)
    }
}

impl std::fmt::Debug for RedirectTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectTransport").finish_non_exhaustive()
    }
}

//! Background authorization over plain HTTP
//!
//! [`HttpFrameHost`] plays the role of a hidden frame: it requests the
//! authorize URL without showing anything, follows the server's redirects
//! itself, and stops as soon as a redirect points back at the client's
//! `redirect_uri` (same origin and path, any query). Hops on the client's
//! origin that are not the callback, such as the approval page of a server
//! sharing that origin, are followed like any other. Only a location on the
//! redirect origin is readable, mirroring the same-origin rule a browser
//! frame is subject to.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::{Origin, Url};

use crate::error::{PassportError, Result};
use crate::platform::{Frame, FrameEvent, FrameHost};

const MAX_REDIRECT_HOPS: usize = 10;
const HOP_TIMEOUT: Duration = Duration::from_secs(30);

/// [`FrameHost`] that runs each frame as a tokio task issuing HTTP requests
#[derive(Debug, Clone)]
pub struct HttpFrameHost {
    http: reqwest::Client,
    redirect_uri: Url,
}

impl HttpFrameHost {
    /// Create a host whose frames treat `redirect_uri`'s origin as readable
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(redirect_uri: Url) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(HOP_TIMEOUT)
            .build()?;
        Ok(Self::with_client(http, redirect_uri))
    }

    /// Create a host over an existing client
    ///
    /// The client must not follow redirects on its own, otherwise the frame
    /// would request the client application's page itself.
    pub fn with_client(http: reqwest::Client, redirect_uri: Url) -> Self {
        Self { http, redirect_uri }
    }
}

#[async_trait::async_trait]
impl FrameHost for HttpFrameHost {
    async fn attach(&self, url: &str) -> Result<Box<dyn Frame>> {
        let start = Url::parse(url)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let location = Arc::new(Mutex::new(None));

        let http = self.http.clone();
        let redirect_uri = self.redirect_uri.clone();
        let task_location = Arc::clone(&location);
        let task = tokio::spawn(async move {
            match follow_redirects(&http, start, &redirect_uri).await {
                Ok(landed) => {
                    *task_location.lock().unwrap_or_else(|e| e.into_inner()) = Some(landed);
                }
                Err(e) => tracing::debug!("Background authorization request failed: {}", e),
            }
            // A frame fires its load event whether or not the page was reachable.
            let _ = tx.send(FrameEvent::Load);
        });

        Ok(Box::new(HttpFrame {
            events: rx,
            location,
            redirect_origin: self.redirect_uri.origin(),
            task: Some(task),
        }))
    }
}

fn is_callback(url: &Url, redirect_uri: &Url) -> bool {
    url.origin() == redirect_uri.origin() && url.path() == redirect_uri.path()
}

async fn follow_redirects(http: &reqwest::Client, start: Url, redirect_uri: &Url) -> Result<Url> {
    let mut current = start;

    for _ in 0..MAX_REDIRECT_HOPS {
        let resp = http.get(current.clone()).send().await?;
        if !resp.status().is_redirection() {
            return Ok(current);
        }

        let Some(location) = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
        else {
            return Ok(current);
        };

        // The callback page belongs to the client, so it is never requested.
        let next = current.join(location)?;
        if is_callback(&next, redirect_uri) {
            return Ok(next);
        }
        current = next;
    }

    Err(PassportError::Frame(format!(
        "more than {} redirects while loading {}",
        MAX_REDIRECT_HOPS, current
    ))
    .into())
}

struct HttpFrame {
    events: mpsc::UnboundedReceiver<FrameEvent>,
    location: Arc<Mutex<Option<Url>>>,
    redirect_origin: Origin,
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl Frame for HttpFrame {
    async fn next_event(&mut self) -> Option<FrameEvent> {
        self.events.recv().await
    }

    fn query(&self) -> Option<String> {
        let location = self.location.lock().unwrap_or_else(|e| e.into_inner());
        location
            .as_ref()
            .filter(|url| url.origin() == self.redirect_origin)
            .map(|url| url.query().map(|q| format!("?{}", q)).unwrap_or_default())
    }

    fn detach(&mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => {
                task.abort();
                Ok(())
            }
            None => Err(PassportError::Frame("frame already detached".to_string()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_frame_reads_query_on_redirect_origin() {
        let server = MockServer::start().await;
        let redirect_uri = Url::parse(&format!("{}/callback", server.uri())).unwrap();

        Mock::given(method("GET"))
            .and(path("/oauth/authorize"))
            .respond_with(ResponseTemplate::new(302).insert_header(
                "Location",
                format!("{}?code=c1&state=s1", redirect_uri).as_str(),
            ))
            .mount(&server)
            .await;

        let host = HttpFrameHost::new(redirect_uri).unwrap();
        let mut frame = host
            .attach(&format!("{}/oauth/authorize", server.uri()))
            .await
            .unwrap();

        assert_eq!(frame.next_event().await, Some(FrameEvent::Load));
        assert_eq!(frame.query().as_deref(), Some("?code=c1&state=s1"));
        assert!(frame.detach().is_ok());
        assert!(frame.detach().is_err(), "second detach must report the frame is gone");
    }

    #[tokio::test]
    async fn test_frame_query_is_unreadable_on_foreign_origin() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oauth/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let host =
            HttpFrameHost::new(Url::parse("https://app.example.com/callback").unwrap()).unwrap();
        let mut frame = host
            .attach(&format!("{}/oauth/authorize", server.uri()))
            .await
            .unwrap();

        assert_eq!(frame.next_event().await, Some(FrameEvent::Load));
        assert_eq!(frame.query(), None);
    }

    #[tokio::test]
    async fn test_frame_follows_same_origin_hops_to_callback() {
        let server = MockServer::start().await;
        let redirect_uri = Url::parse(&format!("{}/callback", server.uri())).unwrap();

        Mock::given(method("GET"))
            .and(path("/oauth/authorize"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/oauth/approve"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/oauth/approve"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "/callback?code=c2&state=s2"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/callback"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let host = HttpFrameHost::new(redirect_uri).unwrap();
        let mut frame = host
            .attach(&format!("{}/oauth/authorize", server.uri()))
            .await
            .unwrap();

        assert_eq!(frame.next_event().await, Some(FrameEvent::Load));
        assert_eq!(frame.query().as_deref(), Some("?code=c2&state=s2"));
    }

    #[test]
    fn test_is_callback_ignores_query_but_not_path() {
        let redirect_uri = Url::parse("https://app.example.com/callback").unwrap();

        let hit = Url::parse("https://app.example.com/callback?code=1&state=2").unwrap();
        let approve = Url::parse("https://app.example.com/oauth/approve").unwrap();
        let other_host = Url::parse("https://auth.example.com/callback").unwrap();

        assert!(is_callback(&hit, &redirect_uri));
        assert!(!is_callback(&approve, &redirect_uri));
        assert!(!is_callback(&other_host, &redirect_uri));
    }
}

//! `reqwest`-backed [`Transport`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONNECTION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::Client;

use super::{CookieJar, HttpRequest, HttpResponse, Method, SessionCookie, Transport};
use crate::{AppError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,\
image/apng,*/*;q=0.8,application/signed-exchange;v=b3";

/// Cookie-aware HTTP client for one account.
///
/// Holds two `reqwest` clients sharing a single [`CookieJar`]: one follows
/// redirects, the other returns 3xx responses untouched.
pub struct HttpTransport {
    following: Client,
    manual: Client,
    jar: Arc<CookieJar>,
}

impl HttpTransport {
    /// Build a transport sending `user_agent` and seeded with `cookies`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the user agent is not a valid header
    /// value, or `AppError::Network` if the TLS client cannot be built.
    pub fn new(user_agent: &str, cookies: Vec<SessionCookie>) -> Result<Self> {
        let jar = Arc::new(CookieJar::from_cookies(cookies));
        let headers = default_headers(user_agent)?;

        let following = Client::builder()
            .default_headers(headers.clone())
            .cookie_provider(Arc::clone(&jar))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let manual = Client::builder()
            .default_headers(headers)
            .cookie_provider(Arc::clone(&jar))
            .redirect(Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            following,
            manual,
            jar,
        })
    }
}

fn default_headers(user_agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|err| AppError::Config(format!("invalid user_agent: {err}")))?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(headers)
}

impl Transport for HttpTransport {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + '_>> {
        Box::pin(async move {
            let client = if request.follow_redirects {
                &self.following
            } else {
                &self.manual
            };

            let mut builder = match request.method {
                Method::Get => client.get(&request.url),
                Method::Post => client.post(&request.url),
            };
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if request.method == Method::Post && !request.form.is_empty() {
                builder = builder.form(&request.form);
            }
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?;
            Ok(HttpResponse::new(status, body.to_vec()))
        })
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.jar.get(name)
    }

    fn cookies(&self) -> Vec<SessionCookie> {
        self.jar.snapshot()
    }

    fn restore(&self, cookies: &[SessionCookie]) {
        for cookie in cookies {
            self.jar.insert(cookie.clone());
        }
    }
}

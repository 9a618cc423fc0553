//! `reqwest`-backed requester used by the command-line service.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::{HttpRequest, HttpRequester, HttpResponse, Method, Result, TransportError};

/// Production requester.
///
/// Holds two clients because redirect policy is fixed per `reqwest::Client`:
/// one follows redirects (reqwest's default limit), the other never does.
pub struct ReqwestRequester {
    client: reqwest::Client,
    no_redirect_client: reqwest::Client,
}

impl ReqwestRequester {
    /// Build both clients with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(format!("building HTTP client: {e}")))?;
        let no_redirect_client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::InvalidRequest(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            no_redirect_client,
        })
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

impl HttpRequester for ReqwestRequester {
    fn id(&self) -> &str {
        "reqwest"
    }

    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + '_>> {
        Box::pin(async move {
            let client = if request.follow_redirects {
                &self.client
            } else {
                &self.no_redirect_client
            };

            let mut builder = client.request(to_reqwest_method(request.method), &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let url = request.url;
            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout { url: url.clone() }
                } else {
                    TransportError::Request {
                        url: url.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_owned(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response.text().await.map_err(|e| TransportError::Request {
                url: url.clone(),
                message: format!("reading response body: {e}"),
            })?;

            debug!(%url, status, "request completed");
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

//! In-memory requester that replays canned responses.
//!
//! Routes are keyed by method and URL with the query string stripped. Each
//! route holds a queue: responses are handed out in order and the last one
//! repeats. Every request is recorded so tests can assert on how many round
//! trips an operation made and what was sent.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{HttpRequest, HttpRequester, HttpResponse, Method, Result, TransportError};

type Outcome = std::result::Result<HttpResponse, TransportError>;

#[derive(Default)]
struct Script {
    routes: HashMap<(Method, String), VecDeque<Outcome>>,
    sent: Vec<HttpRequest>,
}

/// Test double for `HttpRequester`. Cloning shares the script.
#[derive(Clone, Default)]
pub struct ScriptedRequester {
    script: Arc<Mutex<Script>>,
}

fn route_url(url: &str) -> String {
    url.split(['?', '#']).next().unwrap_or(url).to_owned()
}

impl ScriptedRequester {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a response for `method url`.
    pub fn respond(&self, method: Method, url: &str, response: HttpResponse) -> &Self {
        self.lock()
            .routes
            .entry((method, route_url(url)))
            .or_default()
            .push_back(Ok(response));
        self
    }

    /// Queue a transport failure for `method url`.
    pub fn fail(&self, method: Method, url: &str, error: TransportError) -> &Self {
        self.lock()
            .routes
            .entry((method, route_url(url)))
            .or_default()
            .push_back(Err(error));
        self
    }

    /// Every request sent so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().sent.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().sent.len()
    }

    /// Requests sent to one route.
    pub fn requests_to(&self, method: Method, url: &str) -> Vec<HttpRequest> {
        let wanted = route_url(url);
        self.lock()
            .sent
            .iter()
            .filter(|r| r.method == method && route_url(&r.url) == wanted)
            .cloned()
            .collect()
    }

    fn next_outcome(&self, request: &HttpRequest) -> Outcome {
        let mut script = self.lock();
        script.sent.push(request.clone());
        let key = (request.method, route_url(&request.url));
        match script.routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(404, "no scripted response"))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(HttpResponse::new(404, "no scripted response"))),
            None => Ok(HttpResponse::new(404, "no scripted response")),
        }
    }
}

impl HttpRequester for ScriptedRequester {
    fn id(&self) -> &str {
        "scripted"
    }

    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + '_>> {
        let outcome = self.next_outcome(&request);
        Box::pin(async move { outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_queue_then_repeats_last() {
        let requester = ScriptedRequester::new();
        requester
            .respond(Method::Get, "https://a.test/wp-json", HttpResponse::new(500, "first"))
            .respond(Method::Get, "https://a.test/wp-json", HttpResponse::new(200, "second"));

        let url = "https://a.test/wp-json?context=view";
        let first = requester.send(HttpRequest::new(Method::Get, url)).await.unwrap();
        let second = requester.send(HttpRequest::new(Method::Get, url)).await.unwrap();
        let third = requester.send(HttpRequest::new(Method::Get, url)).await.unwrap();

        assert_eq!(first.body, "first");
        assert_eq!(second.body, "second");
        assert_eq!(third.body, "second");
        assert_eq!(requester.request_count(), 3);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let requester = ScriptedRequester::new();
        let response = requester
            .send(HttpRequest::new(Method::Post, "https://a.test/missing"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn scripted_failure_is_returned() {
        let requester = ScriptedRequester::new();
        requester.fail(
            Method::Post,
            "https://a.test/oauth1/access",
            TransportError::Timeout {
                url: "https://a.test/oauth1/access".into(),
            },
        );
        let result = requester
            .send(HttpRequest::new(Method::Post, "https://a.test/oauth1/access"))
            .await;
        assert!(matches!(result, Err(TransportError::Timeout { .. })));
        assert_eq!(
            requester
                .requests_to(Method::Post, "https://a.test/oauth1/access")
                .len(),
            1
        );
    }
}

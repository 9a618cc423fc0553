//! API discovery with a TTL cache
//!
//! Resolves the OAuth 1.0a endpoints of a remote API from its description
//! document. The base URL is fetched once; when the answer is not a
//! description (an HTML front page, say) but advertises the API root in a
//! `Link: <...>; rel="https://api.w.org/"` header, that link is followed once.
//!
//! Successful resolutions are cached in the store's `Cache` namespace for the
//! configured TTL, keyed by `ConnectionKey`. Failures are never cached:
//! transport errors and non-2xx answers surface as `DiscoveryFailed`, a
//! description lacking the `oauth1` block or one of its routes as
//! `OAuthNotSupported`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use transport::{HttpRequest, HttpRequester, HttpResponse, Method};

use crate::clock::Clock;
use crate::constants::{API_LINK_REL, DISCOVERY_TTL, OAUTH1_AUTH_METHOD};
use crate::diagnostics::{Diagnostics, Failure, TracingDiagnostics};
use crate::error::{Error, Result};
use crate::key::ConnectionKey;
use crate::store::{CredentialStore, Namespace, fields, load_json, save_json};

const OPERATION: &str = "discovery";

/// OAuth endpoints of one API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSet {
    pub request_url: String,
    pub authorize_url: String,
    pub access_url: String,
    /// As reported by the remote. Informational only.
    pub protocol_version: Option<String>,
    /// URL the description was read from; relative API paths resolve here.
    pub api_root: String,
}

/// Cache entry. `expires_at` is unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEndpoints {
    pub endpoints: EndpointSet,
    pub expires_at: u64,
}

#[derive(Debug, Default, Deserialize)]
struct RawDescription {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    namespaces: Vec<String>,
    // An empty PHP array serializes as `[]` rather than `{}`.
    #[serde(default)]
    authentication: serde_json::Value,
}

/// Parsed API description document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteDescription {
    pub name: String,
    pub description: String,
    pub url: String,
    pub index_url: String,
    pub namespaces: Vec<String>,
    pub authentication: serde_json::Map<String, serde_json::Value>,
}

impl SiteDescription {
    /// Parse a description body. `None` when the body is not a JSON object.
    pub fn parse(body: &str, index_url: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        if !value.is_object() {
            return None;
        }
        let raw: RawDescription = serde_json::from_value(value).ok()?;
        let authentication = match raw.authentication {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Some(Self {
            name: raw.name,
            description: raw.description,
            url: raw.url,
            index_url: index_url.to_owned(),
            namespaces: raw.namespaces,
            authentication,
        })
    }

    pub fn supports_namespace(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|n| n == namespace)
    }

    pub fn supports_authentication(&self, method: &str) -> bool {
        self.authentication.contains_key(method)
    }

    /// Extract the `oauth1` endpoints. A missing route is reported, never defaulted.
    pub fn oauth1_endpoints(&self) -> Result<EndpointSet> {
        let block = self
            .authentication
            .get(OAUTH1_AUTH_METHOD)
            .and_then(serde_json::Value::as_object)
            .ok_or_else(|| {
                Error::OAuthNotSupported(format!(
                    "{} has no {OAUTH1_AUTH_METHOD} authentication",
                    self.index_url
                ))
            })?;

        let route = |name: &str| -> Result<String> {
            block
                .get(name)
                .and_then(serde_json::Value::as_str)
                .filter(|url| !url.is_empty())
                .map(str::to_owned)
                .ok_or_else(|| {
                    Error::OAuthNotSupported(format!(
                        "{} does not advertise the {OAUTH1_AUTH_METHOD} {name} route",
                        self.index_url
                    ))
                })
        };

        Ok(EndpointSet {
            request_url: route("request")?,
            authorize_url: route("authorize")?,
            access_url: route("access")?,
            protocol_version: block
                .get("version")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned),
            api_root: self.index_url.clone(),
        })
    }
}

/// Resolves and caches endpoint sets.
pub struct DiscoveryCache {
    requester: Arc<dyn HttpRequester>,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<dyn Diagnostics>,
    ttl: Duration,
}

impl DiscoveryCache {
    pub fn new(
        requester: Arc<dyn HttpRequester>,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            requester,
            store,
            clock,
            diagnostics: Arc::new(TracingDiagnostics),
            ttl: DISCOVERY_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Endpoint set for `base_url`, from cache while fresh.
    pub async fn resolve(&self, base_url: &str) -> Result<EndpointSet> {
        let key = ConnectionKey::for_api(base_url)?;
        let now = self.clock.now_secs();

        let cached: Option<CachedEndpoints> =
            load_json(self.store.as_ref(), &key, Namespace::Cache, fields::ENDPOINTS).await?;
        if let Some(entry) = cached {
            if entry.expires_at > now {
                debug!(key = %key, expires_at = entry.expires_at, "discovery cache hit");
                return Ok(entry.endpoints);
            }
            debug!(key = %key, "discovery cache entry expired");
        }

        let (site, response) = self.fetch(&key, base_url).await?;
        let endpoints = match site.oauth1_endpoints() {
            Ok(endpoints) => endpoints,
            Err(e) => {
                self.diagnostics.record(
                    &key,
                    Failure::new(OPERATION, e.to_string())
                        .with_request(Method::Get.as_str(), &site.index_url)
                        .with_response(response.status, &response.body),
                );
                return Err(e);
            }
        };

        let entry = CachedEndpoints {
            endpoints: endpoints.clone(),
            expires_at: now + self.ttl.as_secs(),
        };
        save_json(
            self.store.as_ref(),
            &key,
            Namespace::Cache,
            fields::ENDPOINTS,
            &entry,
        )
        .await?;

        info!(
            key = %key,
            api_root = %endpoints.api_root,
            version = endpoints.protocol_version.as_deref().unwrap_or("-"),
            "discovered OAuth 1.0a endpoints"
        );
        Ok(endpoints)
    }

    /// Full description document. Not cached.
    pub async fn describe(&self, base_url: &str) -> Result<SiteDescription> {
        let key = ConnectionKey::for_api(base_url)?;
        let (site, _) = self.fetch(&key, base_url).await?;
        Ok(site)
    }

    /// Drop cached discovery data for `base_url`.
    pub async fn invalidate(&self, base_url: &str) -> Result<()> {
        let key = ConnectionKey::for_api(base_url)?;
        self.store.delete(&key, Namespace::Cache, None).await?;
        debug!(key = %key, "discovery cache invalidated");
        Ok(())
    }

    /// The parsed description together with the response it came from.
    async fn fetch(
        &self,
        key: &ConnectionKey,
        base_url: &str,
    ) -> Result<(SiteDescription, HttpResponse)> {
        let response = self.get(key, base_url).await?;
        if let Some(site) = SiteDescription::parse(&response.body, base_url) {
            return Ok((site, response));
        }

        let Some(root) = api_link(&response, base_url) else {
            let err = Error::InvalidServerResponse(format!(
                "{base_url} did not return an API description"
            ));
            self.diagnostics.record(
                key,
                Failure::new(OPERATION, err.to_string())
                    .with_request(Method::Get.as_str(), base_url)
                    .with_response(response.status, &response.body),
            );
            return Err(err);
        };

        debug!(key = %key, %root, "following API link header");
        let response = self.get(key, &root).await?;
        match SiteDescription::parse(&response.body, &root) {
            Some(site) => Ok((site, response)),
            None => {
                let err = Error::InvalidServerResponse(format!(
                    "{root} did not return an API description"
                ));
                self.diagnostics.record(
                    key,
                    Failure::new(OPERATION, err.to_string())
                        .with_request(Method::Get.as_str(), &root)
                        .with_response(response.status, &response.body),
                );
                Err(err)
            }
        }
    }

    async fn get(&self, key: &ConnectionKey, url: &str) -> Result<HttpResponse> {
        let response = match self.requester.send(HttpRequest::new(Method::Get, url)).await {
            Ok(response) => response,
            Err(e) => {
                self.diagnostics.record(
                    key,
                    Failure::new(OPERATION, e.to_string()).with_request(Method::Get.as_str(), url),
                );
                return Err(Error::DiscoveryFailed(e.to_string()));
            }
        };

        if !response.is_success() {
            let message = format!(
                "Received error [{}] with status code [{}]",
                response.body, response.status
            );
            self.diagnostics.record(
                key,
                Failure::new(OPERATION, message.clone())
                    .with_request(Method::Get.as_str(), url)
                    .with_response(response.status, &response.body),
            );
            return Err(Error::DiscoveryFailed(message));
        }
        Ok(response)
    }
}

/// Target of the first `rel="https://api.w.org/"` link, resolved against `base_url`.
pub fn api_link(response: &HttpResponse, base_url: &str) -> Option<String> {
    let href = response
        .header_values("link")
        .flat_map(split_links)
        .find_map(|link| {
            let (href, rel) = parse_link(link)?;
            rel.split_whitespace()
                .any(|r| r == API_LINK_REL)
                .then_some(href)
        })?;
    let base = url::Url::parse(base_url).ok()?;
    base.join(href).ok().map(String::from)
}

/// Split one header value into links, only at commas that start a new `<...>`.
fn split_links(value: &str) -> Vec<&str> {
    let mut links = Vec::new();
    let mut start = 0;
    for (i, _) in value.match_indices(',') {
        if value[i + 1..].trim_start().starts_with('<') {
            links.push(&value[start..i]);
            start = i + 1;
        }
    }
    links.push(&value[start..]);
    links
}

/// `<href>; rel="x"` into `(href, rel)`.
fn parse_link(link: &str) -> Option<(&str, &str)> {
    let mut parts = link.split(';');
    let href = parts
        .next()?
        .trim()
        .strip_prefix('<')?
        .strip_suffix('>')?;
    let rel = parts.find_map(|part| {
        let (name, value) = part.split_once('=')?;
        (name.trim().eq_ignore_ascii_case("rel")).then(|| value.trim().trim_matches('"'))
    })?;
    Some((href, rel))
}

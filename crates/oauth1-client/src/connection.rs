//! Three-legged authorization and signed API access for one remote site
//!
//! A `Connection` is bound to one API base URL and one client identity. It
//! keeps no authorization state of its own: token credentials, the pending
//! authorization and cached endpoints all live in the `CredentialStore` under
//! the connection's `ConnectionKey`, so a flow started in one process can be
//! completed in another.
//!
//! Flow:
//! 1. `authorization_url` fetches temporary credentials and returns the URL
//!    the user must visit
//! 2. the site redirects back to the callback URL with a verifier
//! 3. `handle_callback` validates the return trip and exchanges the
//!    temporary credentials for token credentials
//! 4. `request` and friends sign API calls with the token credentials

use std::sync::Arc;
use std::time::Duration;

use oauth1_auth::codec::{Params, flatten, parse_form, percent_decode};
use oauth1_auth::constants::{
    CALLBACK_AUTH_KEY, CALLBACK_AUTH_NONCE, CALLBACK_STEP, CALLBACK_STEP_AUTHORIZE,
    DISCOVERY_TTL, OAUTH_CALLBACK, OAUTH_TOKEN, OAUTH_VERIFIER, USER_DETAILS_PATH,
};
use oauth1_auth::signature::generate_nonce;
use oauth1_auth::store::{fields, load_json, save_json, take_json};
use oauth1_auth::{
    ClientIdentity, Clock, ConnectionKey, CredentialStore, Diagnostics, DiscoveryCache,
    EndpointSet, Failure, Namespace, PendingAuthorization, SignatureContext, Signer,
    SystemClock, TemporaryCredentials, TokenCredentials, TracingDiagnostics,
};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use transport::{HttpRequest, HttpRequester, HttpResponse, Method};

use crate::error::{Error, Result};
use crate::lifecycle::{AuthEvent, AuthState, transition};
use crate::response::{ApiResponse, User};

/// Static settings for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub client: ClientIdentity,
    /// API base URL, e.g. `https://example.test/wp-json`.
    pub base_url: String,
    /// Where the site sends the user after authorization.
    pub callback_url: String,
    pub discovery_ttl: Duration,
}

impl ConnectionConfig {
    pub fn new(
        client: ClientIdentity,
        base_url: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            callback_url: callback_url.into(),
            discovery_ttl: DISCOVERY_TTL,
        }
    }
}

/// External collaborators a connection runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub requester: Arc<dyn HttpRequester>,
    pub store: Arc<dyn CredentialStore>,
    pub clock: Arc<dyn Clock>,
    pub diagnostics: Arc<dyn Diagnostics>,
}

impl Collaborators {
    /// System clock and tracing diagnostics.
    pub fn new(requester: Arc<dyn HttpRequester>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            requester,
            store,
            clock: Arc::new(SystemClock),
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

/// Parameters the site appends to the callback URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub step: Option<String>,
    pub auth_key: Option<String>,
    pub auth_nonce: Option<String>,
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
}

impl CallbackParams {
    /// Parse the callback request's query string (leading `?` optional).
    pub fn from_query(query: &str) -> Self {
        Self::from_params(&parse_form(query))
    }

    pub fn from_params(params: &Params) -> Self {
        let get = |name: &str| params.get_str(name).map(str::to_owned);
        Self {
            step: get(CALLBACK_STEP),
            auth_key: get(CALLBACK_AUTH_KEY),
            auth_nonce: get(CALLBACK_AUTH_NONCE),
            oauth_token: get(OAUTH_TOKEN),
            oauth_verifier: get(OAUTH_VERIFIER),
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Token lifecycle controller for one API.
pub struct Connection {
    key: ConnectionKey,
    base_url: String,
    callback_url: String,
    signer: Signer,
    discovery: DiscoveryCache,
    requester: Arc<dyn HttpRequester>,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<dyn Diagnostics>,
    /// Serializes callback handling for this connection.
    callback_lock: Mutex<()>,
}

impl Connection {
    pub fn new(config: ConnectionConfig, collaborators: Collaborators) -> Result<Self> {
        if config.client.consumer_key.is_empty() || config.client.consumer_secret.is_empty() {
            return Err(Error::MissingClientKey);
        }
        let key = ConnectionKey::for_api(&config.base_url)?;
        url::Url::parse(&config.callback_url).map_err(|e| {
            oauth1_auth::Error::InvalidUrl(format!("{}: {e}", config.callback_url))
        })?;

        let Collaborators {
            requester,
            store,
            clock,
            diagnostics,
        } = collaborators;
        let discovery = DiscoveryCache::new(requester.clone(), store.clone(), clock.clone())
            .with_ttl(config.discovery_ttl)
            .with_diagnostics(diagnostics.clone());

        debug!(key = %key, base_url = %config.base_url, "connection created");
        Ok(Self {
            key,
            base_url: config.base_url,
            callback_url: config.callback_url,
            signer: Signer::new(config.client, clock.clone()),
            discovery,
            requester,
            store,
            clock,
            diagnostics,
            callback_lock: Mutex::new(()),
        })
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Discovered endpoints (cached).
    pub async fn endpoints(&self) -> Result<EndpointSet> {
        Ok(self.discovery.resolve(&self.base_url).await?)
    }

    /// Full description document of the site.
    pub async fn describe(&self) -> Result<oauth1_auth::SiteDescription> {
        Ok(self.discovery.describe(&self.base_url).await?)
    }

    /// Stored token credentials, if complete.
    pub async fn token_credentials(&self) -> Result<Option<TokenCredentials>> {
        let token: Option<TokenCredentials> = load_json(
            self.store.as_ref(),
            &self.key,
            Namespace::Durable,
            fields::TOKEN_CREDENTIALS,
        )
        .await?;
        Ok(token.filter(TokenCredentials::is_valid))
    }

    async fn pending(&self) -> Result<Option<PendingAuthorization>> {
        Ok(load_json(
            self.store.as_ref(),
            &self.key,
            Namespace::Durable,
            fields::PENDING_AUTHORIZATION,
        )
        .await?)
    }

    /// Current state, derived from durable data.
    pub async fn state(&self) -> Result<AuthState> {
        if self.token_credentials().await?.is_some() {
            return Ok(AuthState::Authorized);
        }
        if self.pending().await?.is_some() {
            return Ok(AuthState::AwaitingUserAuthorization);
        }
        Ok(AuthState::Unauthenticated)
    }

    pub async fn is_authorized(&self) -> Result<bool> {
        Ok(self.state().await? == AuthState::Authorized)
    }

    fn advance(&self, from: AuthState, event: AuthEvent) -> Result<AuthState> {
        match transition(from, event) {
            Some(to) => {
                debug!(key = %self.key, %from, %to, ?event, "lifecycle transition");
                Ok(to)
            }
            None if from == AuthState::Authorized => Err(Error::AlreadyAuthorized),
            None => Err(Error::NotAuthorized),
        }
    }

    /// Start an authorization and return the URL the user must visit.
    ///
    /// `callback_params` are appended to the callback URL and come back with
    /// the redirect. Any earlier pending authorization is replaced.
    pub async fn authorization_url(&self, callback_params: &Params) -> Result<String> {
        let state = self.advance(self.state().await?, AuthEvent::TemporaryCredentialsIssued)?;
        let endpoints = self.endpoints().await?;

        let nonce = generate_nonce(Method::Get, callback_params);
        let callback = self.callback_with(&nonce, callback_params)?;

        let signed = self.signer.sign(
            SignatureContext::new(Method::Post, &endpoints.request_url)
                .with_param(OAUTH_CALLBACK, callback.clone()),
        )?;
        let response = self
            .dispatch("request_token", signed.into_http_request()?)
            .await?;
        let temporary = TemporaryCredentials::from_response(&response.body).map_err(|e| {
            self.record_response_failure(
                "request_token",
                &e,
                Method::Post,
                &endpoints.request_url,
                &response,
            );
            e
        })?;

        let pending = PendingAuthorization {
            temporary,
            callback_nonce: nonce,
            issued_at: self.clock.now_secs(),
        };
        save_json(
            self.store.as_ref(),
            &self.key,
            Namespace::Durable,
            fields::PENDING_AUTHORIZATION,
            &pending,
        )
        .await?;
        self.advance(state, AuthEvent::AuthorizationUrlIssued)?;

        let mut authorize = url::Url::parse(&endpoints.authorize_url).map_err(|e| {
            oauth1_auth::Error::InvalidUrl(format!("{}: {e}", endpoints.authorize_url))
        })?;
        authorize
            .query_pairs_mut()
            .append_pair(OAUTH_TOKEN, &pending.temporary.identifier)
            .append_pair(OAUTH_CALLBACK, &callback);

        info!(key = %self.key, "temporary credentials obtained, awaiting user authorization");
        Ok(authorize.into())
    }

    fn callback_with(&self, nonce: &str, extra: &Params) -> Result<String> {
        let mut callback = url::Url::parse(&self.callback_url)
            .map_err(|e| oauth1_auth::Error::InvalidUrl(format!("{}: {e}", self.callback_url)))?;
        {
            let mut query = callback.query_pairs_mut();
            query
                .append_pair(CALLBACK_STEP, CALLBACK_STEP_AUTHORIZE)
                .append_pair(CALLBACK_AUTH_KEY, self.key.as_str())
                .append_pair(CALLBACK_AUTH_NONCE, nonce);
            for pair in flatten(extra) {
                query.append_pair(&percent_decode(&pair.key), &percent_decode(&pair.value));
            }
        }
        Ok(callback.into())
    }

    /// Complete an authorization from the callback's parameters.
    ///
    /// Rejections happen before any network traffic. A pending authorization
    /// is consumed exactly once: replaying a callback yields `NotAuthorized`.
    pub async fn handle_callback(&self, params: &CallbackParams) -> Result<TokenCredentials> {
        let _guard = self.callback_lock.lock().await;

        let identity_ok = params.step.as_deref() == Some(CALLBACK_STEP_AUTHORIZE)
            && params
                .auth_key
                .as_deref()
                .is_some_and(|k| constant_time_eq(k, self.key.as_str()));
        if !identity_ok {
            warn!(key = %self.key, "callback rejected: identity mismatch");
            return Err(Error::IdentityMismatch);
        }

        let Some(pending) = self.pending().await? else {
            warn!(key = %self.key, "callback rejected: no pending authorization");
            return Err(Error::NotAuthorized);
        };

        let nonce_ok = constant_time_eq(
            params.auth_nonce.as_deref().unwrap_or_default(),
            &pending.callback_nonce,
        );
        let token_ok = constant_time_eq(
            params.oauth_token.as_deref().unwrap_or_default(),
            &pending.temporary.identifier,
        );
        if !(nonce_ok & token_ok) {
            warn!(key = %self.key, "callback rejected: nonce or token mismatch");
            return Err(Error::PossibleManInTheMiddle);
        }

        let verifier = params
            .oauth_verifier
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                oauth1_auth::Error::InvalidServerResponse(format!(
                    "callback is missing {OAUTH_VERIFIER}"
                ))
            })?
            .to_owned();

        let endpoints = self.endpoints().await?;

        let taken: Option<PendingAuthorization> = take_json(
            self.store.as_ref(),
            &self.key,
            Namespace::Durable,
            fields::PENDING_AUTHORIZATION,
        )
        .await?;
        let Some(taken) = taken else {
            return Err(Error::NotAuthorized);
        };
        if taken != pending {
            self.restore_pending(&taken).await?;
            warn!(key = %self.key, "callback rejected: pending authorization changed");
            return Err(Error::PossibleManInTheMiddle);
        }

        let awaiting = AuthState::AwaitingUserAuthorization;
        match self.exchange(&endpoints, &taken.temporary, &verifier).await {
            Ok(token) => {
                save_json(
                    self.store.as_ref(),
                    &self.key,
                    Namespace::Durable,
                    fields::TOKEN_CREDENTIALS,
                    &token,
                )
                .await?;
                self.advance(awaiting, AuthEvent::TokenCredentialsIssued)?;
                info!(key = %self.key, "authorization complete");
                Ok(token)
            }
            Err(e) if e.is_transport() => {
                self.restore_pending(&taken).await?;
                self.advance(awaiting, AuthEvent::ExchangeInterrupted)?;
                Err(e)
            }
            Err(e) => {
                self.advance(awaiting, AuthEvent::ExchangeRejected)?;
                Err(e)
            }
        }
    }

    async fn restore_pending(&self, pending: &PendingAuthorization) -> Result<()> {
        save_json(
            self.store.as_ref(),
            &self.key,
            Namespace::Durable,
            fields::PENDING_AUTHORIZATION,
            pending,
        )
        .await?;
        Ok(())
    }

    async fn exchange(
        &self,
        endpoints: &EndpointSet,
        temporary: &TemporaryCredentials,
        verifier: &str,
    ) -> Result<TokenCredentials> {
        let signed = self.signer.sign(
            SignatureContext::new(Method::Post, &endpoints.access_url)
                .with_token(&temporary.identifier, &temporary.secret)
                .with_param(OAUTH_VERIFIER, verifier),
        )?;
        let response = self
            .dispatch("access_token", signed.into_http_request()?)
            .await?;
        TokenCredentials::from_response(&response.body).map_err(|e| {
            self.record_response_failure(
                "access_token",
                &e,
                Method::Post,
                &endpoints.access_url,
                &response,
            );
            e.into()
        })
    }

    /// Resolve a path against the discovered API root.
    ///
    /// Accepts paths relative to the root, with or without slashes, and full
    /// URLs under the root.
    pub async fn api_url(&self, path: &str) -> Result<String> {
        let endpoints = self.endpoints().await?;
        Ok(join_api_url(&endpoints.api_root, path))
    }

    /// Signed request against the API. Requires an authorized connection.
    pub async fn request(&self, method: Method, path: &str, params: Params) -> Result<ApiResponse> {
        let response = self.signed(method, path, params, true).await?;
        Ok(ApiResponse::from_body(&response.body))
    }

    pub async fn get(&self, path: &str, params: Params) -> Result<ApiResponse> {
        self.request(Method::Get, path, params).await
    }

    pub async fn post(&self, path: &str, params: Params) -> Result<ApiResponse> {
        self.request(Method::Post, path, params).await
    }

    pub async fn put(&self, path: &str, params: Params) -> Result<ApiResponse> {
        self.request(Method::Put, path, params).await
    }

    pub async fn delete(&self, path: &str, params: Params) -> Result<ApiResponse> {
        self.request(Method::Delete, path, params).await
    }

    pub async fn head(&self, path: &str, params: Params) -> Result<ApiResponse> {
        self.request(Method::Head, path, params).await
    }

    /// The user the token credentials belong to.
    pub async fn current_user(&self) -> Result<User> {
        let response = self
            .signed(Method::Get, USER_DETAILS_PATH, Params::new(), false)
            .await?;
        serde_json::from_str(&response.body)
            .map_err(|e| Error::Auth(oauth1_auth::Error::Serialization(e)))
    }

    async fn signed(
        &self,
        method: Method,
        path: &str,
        params: Params,
        follow_redirects: bool,
    ) -> Result<HttpResponse> {
        let Some(token) = self.token_credentials().await? else {
            return Err(Error::NotAuthorized);
        };
        let url = self.api_url(path).await?;
        let signed = self.signer.sign(
            SignatureContext::new(method, url)
                .with_params(params)
                .with_token(&token.identifier, &token.secret),
        )?;
        let mut request = signed.into_http_request()?;
        if !follow_redirects {
            request = request.without_redirects();
        }
        self.dispatch("api_request", request).await
    }

    /// Forget everything stored for this connection.
    pub async fn reset(&self) -> Result<()> {
        let state = self.state().await?;
        self.store
            .delete(&self.key, Namespace::Durable, None)
            .await?;
        self.discovery.invalidate(&self.base_url).await?;
        self.diagnostics.clear(&self.key);
        self.advance(state, AuthEvent::Reset)?;
        info!(key = %self.key, "connection reset");
        Ok(())
    }

    /// Send one request; transport errors and non-2xx answers are recorded.
    async fn dispatch(&self, operation: &str, request: HttpRequest) -> Result<HttpResponse> {
        let method = request.method;
        let url = request.url.clone();
        let response = match self.requester.send(request).await {
            Ok(response) => response,
            Err(e) => {
                self.diagnostics.record(
                    &self.key,
                    Failure::new(operation, e.to_string()).with_request(method.as_str(), &url),
                );
                return Err(oauth1_auth::Error::from(e).into());
            }
        };

        if !response.is_success() {
            let err = oauth1_auth::Error::InvalidServerResponse(format!(
                "Received error [{}] with status code [{}]",
                response.body, response.status
            ));
            self.record_response_failure(operation, &err, method, &url, &response);
            return Err(err.into());
        }
        debug!(key = %self.key, operation, %method, status = response.status, "request succeeded");
        Ok(response)
    }

    fn record_response_failure(
        &self,
        operation: &str,
        err: &oauth1_auth::Error,
        method: Method,
        url: &str,
        response: &HttpResponse,
    ) {
        self.diagnostics.record(
            &self.key,
            Failure::new(operation, err.to_string())
                .with_request(method.as_str(), url)
                .with_response(response.status, &response.body),
        );
    }
}

/// Join `path` onto `api_root`, tolerating a repeated root and stray slashes.
pub fn join_api_url(api_root: &str, path: &str) -> String {
    let root = api_root.trim_end_matches('/');
    let relative = path
        .strip_prefix(root)
        .unwrap_or(path)
        .trim_matches('/');
    if relative.is_empty() {
        format!("{root}/")
    } else {
        format!("{root}/{relative}")
    }
}

//! HMAC-SHA1 request signing per RFC 5849
//!
//! `Signer::sign` fills in the protocol parameters a request is missing,
//! builds the signature base string
//!
//! ```text
//! METHOD & percent_encode(url_without_query) & parameter_string
//! ```
//!
//! and signs it with `percent_encode(consumer_secret)&percent_encode(token_secret)`.
//! Query parameters on the target URL are folded into the signed set, with
//! explicit parameters taking precedence.
//!
//! Placement of the signed parameters depends on the method: GET, HEAD and
//! DELETE send the `oauth_*` set in an `Authorization: OAuth ...` header and
//! everything else on the query string; POST and PUT send the full signed set
//! as a form body. The signature is identical either way.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use hmac::{Hmac, Mac};
use rand::RngExt;
use sha1::{Digest, Sha1};
use tracing::debug;
use transport::{HttpRequest, Method};

use crate::clock::Clock;
use crate::codec::{
    Pair, Params, flatten, form_body, parameter_string, parse_form, percent_encode, query_string,
    sort_pairs,
};
use crate::constants::{
    OAUTH_CONSUMER_KEY, OAUTH_NONCE, OAUTH_PREFIX, OAUTH_SIGNATURE, OAUTH_SIGNATURE_METHOD,
    OAUTH_TIMESTAMP, OAUTH_TOKEN, OAUTH_VERSION, OAUTH_VERSION_PARAM, SIGNATURE_METHOD,
};
use crate::credentials::ClientIdentity;
use crate::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// Everything needed to sign one request. Never persisted.
#[derive(Debug, Clone)]
pub struct SignatureContext {
    pub method: Method,
    pub url: String,
    pub params: Params,
    /// Empty until token (or temporary) credentials exist.
    pub token_secret: Secret<String>,
}

impl SignatureContext {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Params::new(),
            token_secret: Secret::new(String::new()),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key, value.into());
        self
    }

    /// Sign on behalf of a token: adds `oauth_token` and keys the HMAC with its secret.
    pub fn with_token(mut self, identifier: &str, secret: &Secret<String>) -> Self {
        self.params.insert(OAUTH_TOKEN, identifier);
        self.token_secret = secret.clone();
        self
    }
}

/// Output of `Signer::sign`.
#[derive(Debug, Clone)]
pub struct SignedParams {
    pub method: Method,
    /// Target URL with query and fragment removed.
    pub url: String,
    /// Full signed set, `oauth_signature` included.
    pub params: Params,
    pub base_string: String,
}

impl SignedParams {
    pub fn signature(&self) -> Option<&str> {
        self.params.get_str(OAUTH_SIGNATURE)
    }

    /// `OAuth k1="v1", k2="v2"` over the sorted, normalized `oauth_*` scalars.
    pub fn authorization_header(&self) -> Result<String> {
        authorization_header(&self.params)
    }

    /// Build the outbound request with parameters placed for the method.
    pub fn into_http_request(self) -> Result<HttpRequest> {
        if self.method.carries_body() {
            let body = form_body(&self.params)?;
            return Ok(HttpRequest::new(self.method, self.url).form_body(body));
        }

        let header = self.authorization_header()?;
        let query = query_string(&self.params.filtered(|k| !k.starts_with(OAUTH_PREFIX)))?;
        let url = if query.is_empty() {
            self.url
        } else {
            format!("{}?{query}", self.url)
        };
        Ok(HttpRequest::new(self.method, url).header("authorization", header))
    }
}

/// Render the `Authorization` header value for a signed parameter set.
pub fn authorization_header(params: &Params) -> Result<String> {
    let oauth = params.filtered(|k| k.starts_with(OAUTH_PREFIX));
    let rendered: Vec<String> = sort_pairs(flatten(&oauth))?
        .iter()
        .map(|Pair { key, value }| format!("{key}=\"{value}\""))
        .collect();
    Ok(format!("OAuth {}", rendered.join(", ")))
}

/// Split a target URL into its signable base and its query parameters.
pub fn split_url(target: &str) -> Result<(String, Params)> {
    let url =
        url::Url::parse(target).map_err(|e| Error::InvalidUrl(format!("{target}: {e}")))?;
    let base = url[..url::Position::AfterPath].to_owned();
    let query = url.query().map(parse_form).unwrap_or_default();
    Ok((base, query))
}

/// `METHOD&enc(url)&parameter_string`.
pub fn base_string(method: Method, base_url: &str, params: &Params) -> Result<String> {
    Ok(format!(
        "{}&{}&{}",
        method.as_str(),
        percent_encode(base_url),
        parameter_string(params)?
    ))
}

/// Base64 HMAC-SHA1 of `base` under `enc(consumer_secret)&enc(token_secret)`.
pub fn hmac_sha1(base: &str, consumer_secret: &str, token_secret: &str) -> Result<String> {
    let key = Secret::new(format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    ));
    let mut mac = HmacSha1::new_from_slice(key.expose().as_bytes())
        .map_err(|e| Error::Signing(e.to_string()))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// 40 hex chars: SHA-1 over 32 CSPRNG bytes, the method and the parameters.
pub fn generate_nonce(method: Method, params: &Params) -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);

    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher.update(method.as_str().as_bytes());
    for pair in flatten(params) {
        hasher.update(pair.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Signs requests for one client identity.
#[derive(Clone)]
pub struct Signer {
    client: ClientIdentity,
    clock: Arc<dyn Clock>,
}

impl Signer {
    pub fn new(client: ClientIdentity, clock: Arc<dyn Clock>) -> Self {
        Self { client, clock }
    }

    pub fn client(&self) -> &ClientIdentity {
        &self.client
    }

    /// Complete and sign a request's parameters.
    ///
    /// Protocol fields already present (a fixed nonce or timestamp, say) are
    /// kept, which makes signing deterministic for fixed inputs.
    pub fn sign(&self, context: SignatureContext) -> Result<SignedParams> {
        let SignatureContext {
            method,
            url,
            mut params,
            token_secret,
        } = context;

        let (base_url, query) = split_url(&url)?;
        params.merge_missing(query);
        params.remove(OAUTH_SIGNATURE);

        params.insert_if_absent(OAUTH_CONSUMER_KEY, self.client.consumer_key.as_str());
        params.insert_if_absent(OAUTH_SIGNATURE_METHOD, SIGNATURE_METHOD);
        params.insert_if_absent(OAUTH_TIMESTAMP, self.clock.now_secs().to_string());
        params.insert_if_absent(OAUTH_VERSION_PARAM, OAUTH_VERSION);
        if !params.contains_key(OAUTH_NONCE) {
            let nonce = generate_nonce(method, &params);
            params.insert(OAUTH_NONCE, nonce);
        }

        let base = base_string(method, &base_url, &params)?;
        let signature = hmac_sha1(
            &base,
            self.client.consumer_secret.expose(),
            token_secret.expose(),
        )?;
        params.insert(OAUTH_SIGNATURE, signature);

        debug!(method = %method, url = %base_url, "signed request");
        Ok(SignedParams {
            method,
            url: base_url,
            params,
            base_string: base,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn signer(consumer_key: &str, consumer_secret: &str) -> Signer {
        Signer::new(
            ClientIdentity::new(consumer_key, consumer_secret),
            Arc::new(FixedClock::new(1_000_000_000)),
        )
    }

    fn golden_context() -> SignatureContext {
        let params: Params = [
            ("oauth_consumer_key", "ck"),
            ("oauth_nonce", "n"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1000000000"),
            ("oauth_version", "1.0"),
        ]
        .into_iter()
        .collect();
        SignatureContext::new(Method::Post, "https://example.test/oauth/request_token")
            .with_params(params)
    }

    #[test]
    fn golden_request_token_vector() {
        let signed = signer("ck", "cs").sign(golden_context()).unwrap();
        assert_eq!(
            signed.base_string,
            "POST&https%3A%2F%2Fexample.test%2Foauth%2Frequest_token&\
             oauth_consumer_key%3Dck%26oauth_nonce%3Dn%26oauth_signature_method%3DHMAC-SHA1%26\
             oauth_timestamp%3D1000000000%26oauth_version%3D1.0"
        );
        assert_eq!(signed.signature(), Some("fWWRfPr7/U3wAXCgn1IRtt8AF74="));
    }

    #[test]
    fn token_secret_is_part_of_the_key() {
        let mut context = golden_context();
        context.token_secret = Secret::from("ts");
        let signed = signer("ck", "cs").sign(context).unwrap();
        assert_eq!(signed.signature(), Some("o35Y1pv+nA6kc6PW92U8QpGsCBc="));
    }

    #[test]
    fn published_status_update_vector() {
        let params: Params = [
            ("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
            ("include_entities", "true"),
            ("oauth_nonce", "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1318622958"),
            ("oauth_version", "1.0"),
        ]
        .into_iter()
        .collect();
        let context =
            SignatureContext::new(Method::Post, "https://api.twitter.com/1.1/statuses/update.json")
                .with_params(params)
                .with_token(
                    "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
                    &Secret::from("LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE"),
                );
        let signed = signer(
            "xvz1evFS4wEEPTGEFPHBog",
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
        )
        .sign(context)
        .unwrap();
        assert_eq!(signed.signature(), Some("hCtSmYh+iHYCEqBWrE7C7hYmtUk="));
    }

    #[test]
    fn signing_is_deterministic_for_fixed_nonce_and_timestamp() {
        let a = signer("ck", "cs").sign(golden_context()).unwrap();
        let b = signer("ck", "cs").sign(golden_context()).unwrap();
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.base_string, b.base_string);
    }

    #[test]
    fn any_parameter_change_changes_the_signature() {
        let mut nested = Params::new();
        nested.insert("title", "Hello");
        let base = golden_context().with_param("page", "1");
        let mut with_nested = base.clone();
        with_nested.params.insert("data", nested.clone());

        let reference = signer("ck", "cs").sign(with_nested.clone()).unwrap();

        let mut changed_scalar = with_nested.clone();
        changed_scalar.params.insert("page", "2");

        let mut changed_nested = with_nested.clone();
        let mut other = nested.clone();
        other.insert("title", "Hello!");
        changed_nested.params.insert("data", other);

        let mut changed_oauth = with_nested.clone();
        changed_oauth.params.insert("oauth_timestamp", "1000000001");

        let changed_method = SignatureContext {
            method: Method::Put,
            ..with_nested.clone()
        };

        for variant in [changed_scalar, changed_nested, changed_oauth, changed_method] {
            let signed = signer("ck", "cs").sign(variant).unwrap();
            assert_ne!(signed.signature(), reference.signature());
        }
    }

    #[test]
    fn missing_protocol_fields_are_filled_in() {
        let signed = signer("ck", "cs")
            .sign(SignatureContext::new(Method::Get, "https://a.test/wp-json/"))
            .unwrap();
        assert_eq!(signed.params.get_str(OAUTH_CONSUMER_KEY), Some("ck"));
        assert_eq!(signed.params.get_str(OAUTH_SIGNATURE_METHOD), Some("HMAC-SHA1"));
        assert_eq!(signed.params.get_str(OAUTH_TIMESTAMP), Some("1000000000"));
        assert_eq!(signed.params.get_str(OAUTH_VERSION_PARAM), Some("1.0"));
        let nonce = signed.params.get_str(OAUTH_NONCE).unwrap();
        assert_eq!(nonce.len(), 40);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn stale_signature_is_replaced() {
        let context = golden_context().with_param(OAUTH_SIGNATURE, "stale");
        let signed = signer("ck", "cs").sign(context).unwrap();
        assert_eq!(signed.signature(), Some("fWWRfPr7/U3wAXCgn1IRtt8AF74="));
        assert!(!signed.base_string.contains("stale"));
    }

    #[test]
    fn nonces_are_unique() {
        let params = Params::new();
        assert_ne!(
            generate_nonce(Method::Get, &params),
            generate_nonce(Method::Get, &params)
        );
    }

    #[test]
    fn authorization_header_format() {
        let signed = signer("ck", "cs").sign(golden_context()).unwrap();
        assert_eq!(
            signed.authorization_header().unwrap(),
            "OAuth oauth_consumer_key=\"ck\", oauth_nonce=\"n\", \
             oauth_signature=\"fWWRfPr7%2FU3wAXCgn1IRtt8AF74%3D\", \
             oauth_signature_method=\"HMAC-SHA1\", oauth_timestamp=\"1000000000\", \
             oauth_version=\"1.0\""
        );
    }

    #[test]
    fn get_sends_header_and_query() {
        let context = SignatureContext::new(
            Method::Get,
            "https://a.test/wp-json/wp/v2/posts?per_page=5",
        )
        .with_param("search", "hello world");
        let signed = signer("ck", "cs").sign(context).unwrap();
        assert_eq!(signed.url, "https://a.test/wp-json/wp/v2/posts");
        assert!(signed.base_string.contains("per_page%3D5"));

        let request = signed.into_http_request().unwrap();
        assert_eq!(request.method, Method::Get);
        assert!(request.body.is_none());
        assert_eq!(
            request.url,
            "https://a.test/wp-json/wp/v2/posts?per_page=5&search=hello%20world"
        );
        let header = request.header_value("Authorization").unwrap();
        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_signature=\""));
        assert!(!header.contains("per_page"));
    }

    #[test]
    fn post_sends_signed_form_body() {
        let context = SignatureContext::new(Method::Post, "https://a.test/wp-json/wp/v2/posts")
            .with_param("title", "Hi");
        let signed = signer("ck", "cs").sign(context).unwrap();
        let signature = percent_encode(signed.signature().unwrap());

        let request = signed.into_http_request().unwrap();
        assert_eq!(request.url, "https://a.test/wp-json/wp/v2/posts");
        assert!(request.header_value("Authorization").is_none());
        let body = request.body.unwrap();
        assert!(body.contains("title=Hi"));
        assert!(body.contains(&format!("oauth_signature={signature}")));
        assert!(body.contains("oauth_consumer_key=ck"));
    }

    #[test]
    fn delete_header_carries_the_signature() {
        let params: Params = [("oauth_nonce", "n"), ("q", "x")].into_iter().collect();
        let delete = signer("ck", "cs")
            .sign(SignatureContext::new(Method::Delete, "https://a.test/r").with_params(params))
            .unwrap();
        let header = delete.authorization_header().unwrap();
        let signature = percent_encode(delete.signature().unwrap());
        assert!(header.contains(&format!("oauth_signature=\"{signature}\"")));
    }

    #[test]
    fn invalid_target_url_is_rejected() {
        let result = signer("ck", "cs").sign(SignatureContext::new(Method::Get, "/relative"));
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }
}

//! OAuth 1.0a protocol constants
//!
//! Parameter names and fixed values from RFC 5849, plus the link relation and
//! route names used by WordPress-style API description documents.

use std::time::Duration;

/// The only signature method this client produces.
pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";

/// Value sent as `oauth_version`. RFC 5849 allows no other value.
pub const OAUTH_VERSION: &str = "1.0";

pub const OAUTH_CONSUMER_KEY: &str = "oauth_consumer_key";
pub const OAUTH_NONCE: &str = "oauth_nonce";
pub const OAUTH_SIGNATURE: &str = "oauth_signature";
pub const OAUTH_SIGNATURE_METHOD: &str = "oauth_signature_method";
pub const OAUTH_TIMESTAMP: &str = "oauth_timestamp";
pub const OAUTH_VERSION_PARAM: &str = "oauth_version";
pub const OAUTH_TOKEN: &str = "oauth_token";
pub const OAUTH_TOKEN_SECRET: &str = "oauth_token_secret";
pub const OAUTH_CALLBACK: &str = "oauth_callback";
pub const OAUTH_CALLBACK_CONFIRMED: &str = "oauth_callback_confirmed";
pub const OAUTH_VERIFIER: &str = "oauth_verifier";

/// Prefix shared by every protocol parameter.
pub const OAUTH_PREFIX: &str = "oauth_";

/// How long a discovered endpoint set stays valid.
pub const DISCOVERY_TTL: Duration = Duration::from_secs(60 * 60);

/// `Link` relation advertising the API root.
pub const API_LINK_REL: &str = "https://api.w.org/";

/// Authentication block name inside the description document.
pub const OAUTH1_AUTH_METHOD: &str = "oauth1";

/// Callback query parameters that correlate the return trip.
pub const CALLBACK_STEP: &str = "step";
pub const CALLBACK_STEP_AUTHORIZE: &str = "authorize";
pub const CALLBACK_AUTH_KEY: &str = "auth_key";
pub const CALLBACK_AUTH_NONCE: &str = "auth_nonce";

/// Path, relative to the API root, returning the authorized user.
pub const USER_DETAILS_PATH: &str = "wp/v2/users/me?context=edit";

//! OAuth 1.0a signing, discovery and credential primitives
//!
//! The building blocks of the three-legged flow, with no knowledge of the
//! flow itself:
//!
//! 1. `codec` normalizes, flattens and orders parameters
//! 2. `signature::Signer` builds the base string and HMAC-SHA1 signature
//! 3. `discovery::DiscoveryCache` finds and caches a site's OAuth endpoints
//! 4. `store::CredentialStore` persists credentials and cache entries
//!
//! Network access goes through `transport::HttpRequester`; time through
//! `clock::Clock`; failures are reported to `diagnostics::Diagnostics`.
//! The lifecycle controller in `oauth1-client` ties these together.

pub mod clock;
pub mod codec;
pub mod constants;
pub mod credentials;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod key;
pub mod signature;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{ParamValue, Params};
pub use credentials::{ClientIdentity, PendingAuthorization, TemporaryCredentials, TokenCredentials};
pub use diagnostics::{Diagnostics, Failure, TracingDiagnostics};
pub use discovery::{CachedEndpoints, DiscoveryCache, EndpointSet, SiteDescription};
pub use error::{Error, Result};
pub use key::ConnectionKey;
pub use signature::{SignatureContext, SignedParams, Signer};
pub use store::{CredentialStore, MemoryStore, Namespace, StoreFuture};

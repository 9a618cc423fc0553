//! Command execution
//!
//! Every command produces one JSON document for stdout. Token secrets never
//! appear in the output.

use anyhow::{Context, Result};
use oauth1_auth::CredentialStore;
use oauth1_auth::store::{Namespace, fields, load_json};
use oauth1_client::{CallbackParams, Connection};
use serde_json::{Value, json};
use tracing::info;

use crate::cli::{Command, USAGE};
use crate::recorder::LastError;

/// Run `command` against `connection`.
pub async fn execute(
    connection: &Connection,
    store: &dyn CredentialStore,
    command: Command,
) -> Result<Value> {
    let name = command.name();
    info!(command = name, key = %connection.key(), "running command");

    let output = match command {
        Command::Discover => {
            let endpoints = connection.endpoints().await?;
            let site = connection.describe().await?;
            json!({
                "key": connection.key(),
                "endpoints": endpoints,
                "site": site,
            })
        }
        Command::Authorize(params) => {
            let url = connection.authorization_url(&params).await?;
            json!({
                "state": connection.state().await?,
                "authorization_url": url,
            })
        }
        Command::Callback(query) => {
            let token = connection
                .handle_callback(&CallbackParams::from_query(&query))
                .await?;
            json!({
                "state": connection.state().await?,
                "token": token.identifier,
            })
        }
        Command::Request {
            method,
            path,
            params,
        } => {
            let response = connection.request(method, &path, params).await?;
            serde_json::to_value(response).context("encoding API response")?
        }
        Command::User => {
            let user = connection.current_user().await?;
            serde_json::to_value(user).context("encoding user")?
        }
        Command::Status => status(connection, store).await?,
        Command::Reset => {
            connection.reset().await?;
            json!({ "state": connection.state().await? })
        }
        Command::Help => Value::String(USAGE.to_owned()),
    };
    Ok(output)
}

async fn status(connection: &Connection, store: &dyn CredentialStore) -> Result<Value> {
    let last_error: Option<LastError> =
        load_json(store, connection.key(), Namespace::Durable, fields::LAST_ERROR).await?;
    let token = connection.token_credentials().await?;
    Ok(json!({
        "key": connection.key(),
        "base_url": connection.base_url(),
        "state": connection.state().await?,
        "token": token.map(|t| t.identifier),
        "last_error": last_error,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use oauth1_auth::constants::{OAUTH_CALLBACK, OAUTH_TOKEN};
    use oauth1_auth::{ClientIdentity, Diagnostics, FixedClock, MemoryStore, Params};
    use oauth1_client::{Collaborators, ConnectionConfig};
    use transport::{HttpResponse, Method, ScriptedRequester};

    use super::*;
    use crate::recorder::LastErrorRecorder;

    const BASE: &str = "https://a.test/wp-json";
    const REQUEST: &str = "https://a.test/oauth1/request";
    const AUTHORIZE: &str = "https://a.test/oauth1/authorize";
    const ACCESS: &str = "https://a.test/oauth1/access";

    struct Harness {
        requester: ScriptedRequester,
        store: Arc<MemoryStore>,
        recorder: Arc<LastErrorRecorder>,
        connection: Connection,
    }

    fn harness() -> Harness {
        let requester = ScriptedRequester::new();
        requester
            .respond(
                Method::Get,
                BASE,
                HttpResponse::json(
                    200,
                    &json!({
                        "name": "Example",
                        "namespaces": ["oauth1", "wp/v2"],
                        "authentication": {
                            "oauth1": {
                                "request": REQUEST,
                                "authorize": AUTHORIZE,
                                "access": ACCESS,
                                "version": "0.1"
                            }
                        }
                    }),
                ),
            )
            .respond(
                Method::Post,
                REQUEST,
                HttpResponse::new(
                    200,
                    "oauth_token=tmp&oauth_token_secret=tmpsecret&oauth_callback_confirmed=true",
                ),
            );
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(1_700_000_000));
        let recorder = Arc::new(LastErrorRecorder::new(clock.clone()));
        let collaborators = Collaborators::new(Arc::new(requester.clone()), store.clone())
            .with_clock(clock)
            .with_diagnostics(recorder.clone());
        let config = ConnectionConfig::new(
            ClientIdentity::new("CK", "CS"),
            BASE,
            "https://app.test/connect",
        );
        Harness {
            requester,
            store,
            recorder,
            connection: Connection::new(config, collaborators).unwrap(),
        }
    }

    async fn run(h: &Harness, command: Command) -> Result<Value> {
        let out = execute(&h.connection, h.store.as_ref(), command).await;
        h.recorder.persist(h.store.as_ref()).await.unwrap();
        out
    }

    /// The query string the site would redirect back with.
    fn redirect_query(authorization_url: &str) -> String {
        let url = url::Url::parse(authorization_url).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let find = |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        let callback = url::Url::parse(&find(OAUTH_CALLBACK)).unwrap();
        format!(
            "{}&oauth_token={}&oauth_verifier=ver",
            callback.query().unwrap(),
            find(OAUTH_TOKEN)
        )
    }

    fn grant_access(h: &Harness) {
        h.requester.respond(
            Method::Post,
            ACCESS,
            HttpResponse::new(200, "oauth_token=tok&oauth_token_secret=toksecret"),
        );
    }

    async fn authorize(h: &Harness) {
        grant_access(h);
        let out = run(h, Command::Authorize(Params::new())).await.unwrap();
        let url = out["authorization_url"].as_str().unwrap().to_owned();
        run(h, Command::Callback(redirect_query(&url))).await.unwrap();
    }

    #[tokio::test]
    async fn discover_reports_endpoints_and_site() {
        let h = harness();
        let out = run(&h, Command::Discover).await.unwrap();
        assert_eq!(out["endpoints"]["access_url"], ACCESS);
        assert_eq!(out["site"]["name"], "Example");
        assert!(out["key"].as_str().unwrap().starts_with("apiconnect_"));
    }

    #[tokio::test]
    async fn authorize_then_callback() {
        let h = harness();
        grant_access(&h);
        let out = run(&h, Command::Authorize(Params::new())).await.unwrap();
        assert_eq!(out["state"], "awaiting_user_authorization");
        let url = out["authorization_url"].as_str().unwrap().to_owned();
        assert!(url.starts_with(AUTHORIZE));

        let out = run(&h, Command::Callback(redirect_query(&url))).await.unwrap();
        assert_eq!(out["state"], "authorized");
        assert_eq!(out["token"], "tok");
        assert!(!out.to_string().contains("toksecret"));
    }

    #[tokio::test]
    async fn status_shows_token_without_secret() {
        let h = harness();
        authorize(&h).await;

        let out = run(&h, Command::Status).await.unwrap();
        assert_eq!(out["state"], "authorized");
        assert_eq!(out["base_url"], BASE);
        assert_eq!(out["token"], "tok");
        assert!(out["last_error"].is_null());
        assert!(!out.to_string().contains("toksecret"));
    }

    #[tokio::test]
    async fn failures_surface_in_status() {
        let h = harness();
        h.requester
            .respond(Method::Post, ACCESS, HttpResponse::new(401, "denied"));

        let out = run(&h, Command::Authorize(Params::new())).await.unwrap();
        let url = out["authorization_url"].as_str().unwrap().to_owned();
        let err = run(&h, Command::Callback(redirect_query(&url)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("status code [401]"), "got: {err}");

        let out = run(&h, Command::Status).await.unwrap();
        assert_eq!(out["state"], "unauthenticated");
        assert_eq!(out["last_error"]["failure"]["operation"], "access_token");
        assert_eq!(out["last_error"]["recorded_at"], 1_700_000_000);
    }

    #[tokio::test]
    async fn request_returns_decoded_body() {
        let h = harness();
        authorize(&h).await;
        h.requester.respond(
            Method::Get,
            "https://a.test/wp-json/wp/v2/posts",
            HttpResponse::json(200, &json!([{ "id": 1 }])),
        );

        let out = run(
            &h,
            Command::Request {
                method: Method::Get,
                path: "wp/v2/posts".into(),
                params: Params::new(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out[0]["id"], 1);
    }

    #[tokio::test]
    async fn request_before_authorization_fails() {
        let h = harness();
        let err = run(&h, Command::User).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<oauth1_client::Error>(),
            Some(oauth1_client::Error::NotAuthorized)
        ));
    }

    #[tokio::test]
    async fn reset_forgets_credentials_and_last_error() {
        let h = harness();
        authorize(&h).await;
        h.recorder.record(
            h.connection.key(),
            oauth1_auth::Failure::new("api_request", "boom"),
        );
        h.recorder.persist(h.store.as_ref()).await.unwrap();

        let out = run(&h, Command::Reset).await.unwrap();
        assert_eq!(out["state"], "unauthenticated");

        let out = run(&h, Command::Status).await.unwrap();
        assert!(out["token"].is_null());
        assert!(out["last_error"].is_null());
    }

    #[tokio::test]
    async fn help_needs_no_network() {
        let h = harness();
        let out = run(&h, Command::Help).await.unwrap();
        assert!(out.as_str().unwrap().starts_with("usage:"));
        assert_eq!(h.requester.request_count(), 0);
    }
}

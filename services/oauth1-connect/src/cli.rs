//! Argument parsing
//!
//! Pulls a global `--config <path>` flag from anywhere on the line, then
//! reads a command name and its arguments.

use oauth1_auth::Params;
use transport::Method;

use crate::error::{Error, Result};

pub const USAGE: &str = "\
usage: oauth1-connect [--config <path>] <command>

commands:
  discover                              show the site's OAuth 1.0a endpoints
  authorize [key=value ...]             print the URL the user must visit
  callback <url-or-query>               complete authorization from the callback
  request <method> <path> [key=value ...] [--json <object>]
                                        send a signed API request
  user                                  show the authorized user
  status                                show connection state and last error
  reset                                 forget credentials for this site
  help                                  show this message";

/// Parsed command line.
#[derive(Debug)]
pub struct Invocation {
    pub config_path: Option<String>,
    pub command: Command,
}

#[derive(Debug)]
pub enum Command {
    Discover,
    /// Extra parameters to carry on the callback URL.
    Authorize(Params),
    /// Query string (or full URL) the site redirected to.
    Callback(String),
    Request {
        method: Method,
        path: String,
        params: Params,
    },
    User,
    Status,
    Reset,
    Help,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Discover => "discover",
            Command::Authorize(_) => "authorize",
            Command::Callback(_) => "callback",
            Command::Request { .. } => "request",
            Command::User => "user",
            Command::Status => "status",
            Command::Reset => "reset",
            Command::Help => "help",
        }
    }
}

/// Parse arguments, excluding the program name.
pub fn parse(args: &[String]) -> Result<Invocation> {
    let mut config_path = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config_path = Some(iter.next().ok_or(Error::MissingConfigPath)?.clone());
        } else {
            rest.push(arg.as_str());
        }
    }

    let (name, rest) = rest.split_first().ok_or(Error::MissingCommand)?;
    let command = match *name {
        "discover" => Command::Discover,
        "authorize" => Command::Authorize(parse_params(rest)?),
        "callback" => {
            let query = rest.first().ok_or(Error::MissingArgument {
                command: "callback",
                argument: "url-or-query",
            })?;
            Command::Callback(callback_query(query).to_owned())
        }
        "request" => {
            let method = rest.first().ok_or(Error::MissingArgument {
                command: "request",
                argument: "method",
            })?;
            let path = rest.get(1).ok_or(Error::MissingArgument {
                command: "request",
                argument: "path",
            })?;
            Command::Request {
                method: method.parse()?,
                path: (*path).to_owned(),
                params: parse_params(&rest[2..])?,
            }
        }
        "user" => Command::User,
        "status" => Command::Status,
        "reset" => Command::Reset,
        "help" | "--help" | "-h" => Command::Help,
        other => return Err(Error::UnknownCommand(other.to_owned())),
    };

    Ok(Invocation {
        config_path,
        command,
    })
}

/// `key=value` arguments, plus `--json <object>` for nested parameters.
///
/// Later arguments replace earlier ones with the same key.
fn parse_params(args: &[&str]) -> Result<Params> {
    let mut params = Params::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if *arg == "--json" {
            let raw = iter.next().ok_or(Error::InvalidJson("missing value".into()))?;
            let value: serde_json::Value =
                serde_json::from_str(raw).map_err(|e| Error::InvalidJson(e.to_string()))?;
            if !value.is_object() {
                return Err(Error::InvalidJson(raw.to_string()));
            }
            for (key, value) in Params::from_json(&value).iter() {
                params.insert(key.clone(), value.clone());
            }
            continue;
        }
        let (key, value) = arg
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| Error::InvalidParam((*arg).to_owned()))?;
        params.insert(key, value);
    }
    Ok(params)
}

/// Accept either the full redirect URL or just its query string.
fn callback_query(input: &str) -> &str {
    let query = match input.split_once('?') {
        Some((_, query)) => query,
        None => input,
    };
    query.split('#').next().unwrap_or(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_owned).collect()
    }

    #[test]
    fn config_flag_anywhere() {
        let inv = parse(&args("status --config /etc/oauth1.toml")).unwrap();
        assert_eq!(inv.config_path.as_deref(), Some("/etc/oauth1.toml"));
        assert!(matches!(inv.command, Command::Status));

        let inv = parse(&args("--config c.toml reset")).unwrap();
        assert_eq!(inv.config_path.as_deref(), Some("c.toml"));
        assert!(matches!(inv.command, Command::Reset));
    }

    #[test]
    fn config_flag_requires_a_value() {
        assert_eq!(
            parse(&args("status --config")).unwrap_err(),
            Error::MissingConfigPath
        );
    }

    #[test]
    fn missing_and_unknown_commands() {
        assert_eq!(parse(&[]).unwrap_err(), Error::MissingCommand);
        assert_eq!(
            parse(&args("frobnicate")).unwrap_err(),
            Error::UnknownCommand("frobnicate".into())
        );
    }

    #[test]
    fn authorize_collects_params() {
        let inv = parse(&args("authorize return_to=/settings tab=oauth")).unwrap();
        let Command::Authorize(params) = inv.command else {
            panic!("expected authorize");
        };
        assert_eq!(params.get_str("return_to"), Some("/settings"));
        assert_eq!(params.get_str("tab"), Some("oauth"));
    }

    #[test]
    fn callback_accepts_url_or_query() {
        let inv = parse(&args(
            "callback https://app.test/connect?step=3&oauth_verifier=v#frag",
        ))
        .unwrap();
        let Command::Callback(query) = inv.command else {
            panic!("expected callback");
        };
        assert_eq!(query, "step=3&oauth_verifier=v");

        let inv = parse(&args("callback oauth_token=t&oauth_verifier=v")).unwrap();
        assert!(matches!(inv.command, Command::Callback(q) if q == "oauth_token=t&oauth_verifier=v"));

        assert!(matches!(
            parse(&args("callback")).unwrap_err(),
            Error::MissingArgument { command: "callback", .. }
        ));
    }

    #[test]
    fn request_parses_method_path_and_params() {
        let inv = parse(&args("request post wp/v2/posts title=Hello status=draft")).unwrap();
        let Command::Request {
            method,
            path,
            params,
        } = inv.command
        else {
            panic!("expected request");
        };
        assert_eq!(method, Method::Post);
        assert_eq!(path, "wp/v2/posts");
        assert_eq!(params.get_str("title"), Some("Hello"));
        assert_eq!(params.get_str("status"), Some("draft"));
    }

    #[test]
    fn request_json_adds_nested_params() {
        let mut line = args("request PUT wp/v2/posts/1 status=publish --json");
        line.push(r#"{"meta":{"views":3},"sticky":true}"#.into());
        let inv = parse(&line).unwrap();
        let Command::Request { params, .. } = inv.command else {
            panic!("expected request");
        };
        assert_eq!(params.get_str("status"), Some("publish"));
        assert_eq!(params.get_str("sticky"), Some("1"));
        assert!(matches!(params.get("meta"), Some(oauth1_auth::ParamValue::Nested(_))));
    }

    #[test]
    fn request_argument_errors() {
        assert!(matches!(
            parse(&args("request")).unwrap_err(),
            Error::MissingArgument { argument: "method", .. }
        ));
        assert!(matches!(
            parse(&args("request GET")).unwrap_err(),
            Error::MissingArgument { argument: "path", .. }
        ));
        assert!(matches!(
            parse(&args("request PATCH wp/v2/posts")).unwrap_err(),
            Error::InvalidMethod(_)
        ));
        assert_eq!(
            parse(&args("request GET wp/v2/posts novalue")).unwrap_err(),
            Error::InvalidParam("novalue".into())
        );
        assert!(matches!(
            parse(&args("request GET wp/v2/posts --json [1]")).unwrap_err(),
            Error::InvalidJson(_)
        ));
    }

    #[test]
    fn command_names() {
        assert_eq!(parse(&args("user")).unwrap().command.name(), "user");
        assert_eq!(parse(&args("discover")).unwrap().command.name(), "discover");
        assert_eq!(parse(&args("--help")).unwrap().command.name(), "help");
    }
}

//! Service-specific error types

use thiserror::Error;

/// Command-line usage errors.
///
/// Failures from the engine itself (`oauth1_client::Error`) and from
/// configuration (`common::Error`) propagate through `anyhow` unchanged.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("missing command\n\n{usage}", usage = crate::cli::USAGE)]
    MissingCommand,

    #[error("unknown command: {0}\n\n{usage}", usage = crate::cli::USAGE)]
    UnknownCommand(String),

    #[error("{command}: missing argument <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("--config requires a path")]
    MissingConfigPath,

    #[error("expected key=value, got: {0}")]
    InvalidParam(String),

    #[error("--json must be a JSON object: {0}")]
    InvalidJson(String),

    #[error(transparent)]
    InvalidMethod(#[from] transport::ParseMethodError),
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages_are_descriptive() {
        assert!(
            Error::MissingCommand
                .to_string()
                .ends_with(crate::cli::USAGE)
        );
        assert!(
            Error::UnknownCommand("frobnicate".into())
                .to_string()
                .contains("usage: oauth1-connect")
        );
        assert!(
            Error::UnknownCommand("frobnicate".into())
                .to_string()
                .starts_with("unknown command: frobnicate")
        );
        assert_eq!(
            Error::MissingArgument {
                command: "request",
                argument: "path"
            }
            .to_string(),
            "request: missing argument <path>"
        );
        assert_eq!(
            Error::InvalidParam("oops".into()).to_string(),
            "expected key=value, got: oops"
        );
    }

    #[test]
    fn method_errors_convert() {
        let err: Error = "PATCH".parse::<transport::Method>().unwrap_err().into();
        assert_eq!(err.to_string(), "unsupported HTTP method: PATCH");
    }
}

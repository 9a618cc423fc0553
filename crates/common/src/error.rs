//! Configuration error types

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_includes_context() {
        let err = Error::Config("consumer_key must not be empty".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: consumer_key must not be empty"
        );
    }

    #[test]
    fn url_parse_error_converts() {
        let parse_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = parse_err.into();
        assert!(err.to_string().starts_with("invalid URL:"), "got: {err}");
    }

    #[test]
    fn io_error_converts_and_keeps_variant() {
        let err: Error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        let debug = format!("{err:?}");
        assert!(debug.contains("Io"), "Debug should include variant name, got: {debug}");
    }
}

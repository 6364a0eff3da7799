//! Client error types.
//!
//! Errors here are the hard failures: a statement rejected before it is
//! sent, a reply that cannot be decoded, a broken configuration. Failures
//! the gateway reports (HTTP errors, `STATUS = ERROR`, misuse of `fetch`)
//! are carried in [`Response`](crate::Response) instead.

use crate::config::ConfigError;
use ifsap_marshal::MarshalError;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("this is not SQL expression: {0}")]
    NotSelect(String),

    #[error("this is not PL/SQL expression: {0}")]
    NotPlSql(String),

    #[error("can't find binding name {0}")]
    UnknownBinding(String),

    #[error("marshal error: {0}")]
    Marshal(#[from] MarshalError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Returns whether the error was raised before anything was sent.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            ClientError::NotSelect(_) | ClientError::NotPlSql(_) | ClientError::UnknownBinding(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ClientError::UnknownBinding("PAR1".into());
        assert_eq!(err.to_string(), "can't find binding name PAR1");
        assert!(err.is_construction());

        let err = ClientError::from(MarshalError::UnsupportedType("XX".into()));
        assert!(err.to_string().contains("XX"));
        assert!(!err.is_construction());
    }
}

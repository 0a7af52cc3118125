use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;
use strum::IntoStaticStr;

/// Shared error used as the source of transport failures.
pub type SourceError = Arc<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by selector validation, target resolution and per-target
/// execution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("option -g/--group or -n/--node is required")]
    MissingSelector,

    #[error("option -c/--cmd is required")]
    MissingCommand,

    #[error("{entity} not found in inventory: {name}")]
    NotFound { entity: Entity, name: String },

    #[error("invalid inventory: {0}")]
    InvalidInventory(String),

    #[error("selector resolved to no targets")]
    NoTargets,

    #[error("no usable credential for {user}@{host}: configure a readable key or a password")]
    AuthUnavailable { host: String, user: String },

    #[error("{method} authentication rejected for {user}@{host}")]
    AuthRejected {
        host: String,
        user: String,
        method: AuthMethod,
    },

    #[error("{phase} failed for {host}: {source}")]
    Transport {
        host: String,
        phase: Phase,
        #[source]
        source: SourceError,
    },

    #[error("{host} did not finish within {after:?}")]
    Timeout { host: String, after: Duration },

    #[error("{host} was not finished when the overall deadline elapsed")]
    DeadlineExceeded { host: String },

    #[error("{host} was cancelled before finishing")]
    Cancelled { host: String },

    #[error("execution task for {host} failed: {message}")]
    Task { host: String, message: String },
}

impl Error {
    /// Builds a [`Error::Transport`] from any error source.
    pub fn transport<E>(host: impl Into<String>, phase: Phase, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            host: host.into(),
            phase,
            source: Arc::new(source),
        }
    }

    /// Coarse classification, suitable for persistence and display.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingSelector | Self::MissingCommand => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidInventory(_) | Self::NoTargets => ErrorKind::Resolution,
            Self::AuthUnavailable { .. } => ErrorKind::AuthUnavailable,
            Self::AuthRejected { .. } => ErrorKind::AuthRejected,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Timeout { .. } | Self::DeadlineExceeded { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Task { .. } => ErrorKind::Internal,
        }
    }

    /// Whether this error only concerns a single target, as opposed to the
    /// whole invocation.
    #[must_use]
    pub fn is_target_scoped(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Resolution
        )
    }
}

/// Inventory entities that can be looked up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Entity {
    Group,
    Node,
}

/// Classification of [`Error`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Resolution,
    AuthUnavailable,
    AuthRejected,
    Transport,
    Timeout,
    Cancelled,
    Internal,
}

/// Stage of session setup or use at which a transport failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Dial,
    Handshake,
    Auth,
    Channel,
}

/// Authentication method attempted against a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AuthMethod {
    #[strum(serialize = "public key")]
    PublicKey,
    Password,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Error::MissingSelector, ErrorKind::Validation, false)]
    #[case(Error::MissingCommand, ErrorKind::Validation, false)]
    #[case(Error::NotFound { entity: Entity::Group, name: "web".into() }, ErrorKind::NotFound, false)]
    #[case(Error::NoTargets, ErrorKind::Resolution, false)]
    #[case(Error::AuthUnavailable { host: "h".into(), user: "u".into() }, ErrorKind::AuthUnavailable, true)]
    #[case(Error::DeadlineExceeded { host: "h".into() }, ErrorKind::Timeout, true)]
    #[case(Error::Cancelled { host: "h".into() }, ErrorKind::Cancelled, true)]
    fn kind_works(#[case] error: Error, #[case] kind: ErrorKind, #[case] scoped: bool) {
        assert_eq!(error.kind(), kind);
        assert_eq!(error.is_target_scoped(), scoped);
    }

    #[test]
    fn kind_roundtrips_through_str() {
        let kind = ErrorKind::AuthRejected;
        assert_eq!(kind.to_string(), "auth_rejected");
        assert_eq!(ErrorKind::from_str("auth_rejected").unwrap(), kind);
    }

    #[test]
    fn transport_message_names_host_and_phase() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = Error::transport("10.0.0.1:22", Phase::Dial, io);
        assert_eq!(error.to_string(), "dial failed for 10.0.0.1:22: refused");
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn auth_rejected_message() {
        let error = Error::AuthRejected {
            host: "db1".into(),
            user: "ops".into(),
            method: AuthMethod::PublicKey,
        };
        assert_eq!(
            error.to_string(),
            "public key authentication rejected for ops@db1"
        );
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types shared by every cohere crate.

use std::fmt;

type Cause = Box<dyn std::error::Error + Send + Sync>;

/// The category of an [`Error`].
///
/// Callers branch on the kind rather than on the message: configuration errors are programming mistakes,
/// computation and persistence errors come from collaborators and may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Unknown refresher, unsupported message shape, misuse of a policy or decorator.
    Configuration,
    /// A cache factory failed while computing a value.
    Computation,
    /// The store rejected a read or write.
    Persistence,
    /// A messenger failed to queue or deliver an instruction.
    Delivery,
    /// A payload could not be serialized or parsed.
    Serialization,
    /// The version store or its lock failed.
    VersionStore,
    /// An operation did not complete within its allotted time.
    Timeout,
}

impl ErrorKind {
    /// Returns the stable lowercase name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Computation => "computation",
            Self::Persistence => "persistence",
            Self::Delivery => "delivery",
            Self::Serialization => "serialization",
            Self::VersionStore => "version store",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from a cache, policy, refresher or synchronization operation.
///
/// The error is cheap to clone so that a single failed computation can be handed to every caller
/// that was waiting on it.
///
/// # Example
///
/// ```
/// use cohere_cache::{Error, ErrorKind};
///
/// let error = Error::configuration("unknown refresher");
/// assert_eq!(error.kind(), ErrorKind::Configuration);
/// ```
#[ohno::error]
#[derive(Clone)]
#[display("{kind} error")]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Creates a configuration error.
    pub fn configuration(cause: impl Into<Cause>) -> Self {
        Self::caused_by(ErrorKind::Configuration, cause)
    }

    /// Creates a computation error.
    pub fn computation(cause: impl Into<Cause>) -> Self {
        Self::caused_by(ErrorKind::Computation, cause)
    }

    /// Creates a persistence error.
    pub fn persistence(cause: impl Into<Cause>) -> Self {
        Self::caused_by(ErrorKind::Persistence, cause)
    }

    /// Creates a delivery error.
    pub fn delivery(cause: impl Into<Cause>) -> Self {
        Self::caused_by(ErrorKind::Delivery, cause)
    }

    /// Creates a serialization error.
    pub fn serialization(cause: impl Into<Cause>) -> Self {
        Self::caused_by(ErrorKind::Serialization, cause)
    }

    /// Creates a version store error.
    pub fn version_store(cause: impl Into<Cause>) -> Self {
        Self::caused_by(ErrorKind::VersionStore, cause)
    }

    /// Creates a timeout error.
    pub fn timeout(cause: impl Into<Cause>) -> Self {
        Self::caused_by(ErrorKind::Timeout, cause)
    }

    /// Returns `true` for programming errors that must never be retried.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        self.kind == ErrorKind::Configuration
    }
}

/// A specialized [`Result`] type for cohere operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use ohno::ErrorExt;

    use super::*;

    #[test]
    fn display_contains_kind_and_cause() {
        let error = Error::persistence("disk full");
        let display = format!("{error}");

        assert!(display.contains("persistence error"), "got: {display}");
        assert!(display.contains("disk full"), "got: {display}");
    }

    #[test]
    fn clone_preserves_kind_and_message() {
        let error = Error::computation("factory exploded");
        let cloned = error.clone();

        assert_eq!(cloned.kind(), ErrorKind::Computation);
        assert_eq!(cloned.message(), error.message());
    }

    #[test]
    fn source_chain_is_searchable() {
        let io = std::io::Error::other("socket closed");
        let error = Error::delivery(io);

        let found = error.find_source::<std::io::Error>().expect("io error should be in the chain");
        assert_eq!(found.to_string(), "socket closed");
    }

    #[test]
    fn only_configuration_errors_are_flagged() {
        assert!(Error::configuration("x").is_configuration());
        assert!(!Error::timeout("x").is_configuration());
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(ErrorKind::VersionStore.to_string(), "version store");
        assert_eq!(ErrorKind::Serialization.as_str(), "serialization");
    }
}

//! User scope type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`UserScope`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// The input string is empty.
    #[error("user scope cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("user scope must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
}

/// The identifier partitioning cart and scan-log data per user.
///
/// The value comes from the external identity provider and is opaque to the
/// pipeline: it is only ever compared for equality and echoed back to the
/// remote store as a filter predicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserScope(String);

impl UserScope {
    /// Maximum length of a scope key.
    pub const MAX_LENGTH: usize = 128;

    /// Parse a `UserScope` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or longer than 128 characters.
    pub fn parse(s: &str) -> Result<Self, ScopeError> {
        if s.is_empty() {
            return Err(ScopeError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(ScopeError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the scope key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for UserScope {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

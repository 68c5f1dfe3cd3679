use std::{fmt, ops::Deref, str::FromStr};

use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};

/// The identifier of a requirement, use case, test or source.
///
/// Identifiers are unique within their entity kind and double as the display
/// key shown to users. They are free-form but never empty.
///
/// Ordering is plain string ordering. Sibling lists rebuilt from the store are
/// sorted with it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(NonEmptyString);

impl ItemId {
    /// Creates a new identifier.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyIdError`] if the string is empty or only whitespace.
    pub fn new(s: String) -> Result<Self, EmptyIdError> {
        if s.trim().is_empty() {
            return Err(EmptyIdError);
        }
        NonEmptyString::new(s).map(Self).map_err(|_| EmptyIdError)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Error returned when an identifier is empty.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("identifiers must not be empty")]
pub struct EmptyIdError;

impl TryFrom<String> for ItemId {
    type Error = EmptyIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ItemId {
    type Error = EmptyIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl FromStr for ItemId {
    type Err = EmptyIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0.as_str().to_owned()
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for ItemId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

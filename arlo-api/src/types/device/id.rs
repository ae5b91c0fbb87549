use crate::{types::Error, Result};
use serde_derive::Deserialize;
use std::fmt;
use std::str::FromStr;

/// The identifier under which a discovered device is exposed to the
/// host. Identifiers are lowercase slugs -- letters, digits, and
/// interior underscores -- so they remain stable and addressable no
/// matter how the user has named the device in the vendor app.

#[derive(Debug, Clone, PartialEq, Deserialize, Hash, Eq)]
#[serde(try_from = "&str")]
pub struct Id(String);

impl Id {
    // Returns `true` if the character can be used in an identifier.

    fn is_valid_char((idx, ch): (usize, char), len: usize) -> bool {
        ch.is_ascii_lowercase()
            || ch.is_ascii_digit()
            || (ch == '_' && idx != 0 && idx != len - 1)
    }

    /// Creates an `Id`, if the string is already a well-formed slug.

    pub fn create(s: &str) -> Result<Self> {
        if !s.is_empty() {
            if s.chars().enumerate().all(|v| Id::is_valid_char(v, s.len())) {
                Ok(Id(String::from(s)))
            } else {
                Err(Error::InvArgument(String::from(
                    "id contains invalid character",
                )))
            }
        } else {
            Err(Error::InvArgument(String::from("id is empty")))
        }
    }

    /// Builds an identifier from a device kind and the free-form name
    /// the user gave the device in the vendor app. Runs of characters
    /// that can't appear in a slug collapse into a single underscore.
    /// Returns `None` when the name has no usable characters at all.

    pub fn from_device_name(kind: &str, name: &str) -> Option<Self> {
        let mut slug = String::with_capacity(kind.len() + name.len() + 1);

        for ch in kind.chars().chain("_".chars()).chain(name.chars()) {
            if ch.is_ascii_alphanumeric() {
                slug.push(ch.to_ascii_lowercase())
            } else if !slug.ends_with('_') && !slug.is_empty() {
                slug.push('_')
            }
        }

        let slug = slug.trim_matches('_');

        if slug.is_empty() {
            None
        } else {
            Some(Id(String::from(slug)))
        }
    }
}

// This trait is defined so the .TOML parser can read identifiers
// directly from configuration values.

impl TryFrom<&str> for Id {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Id::create(s)
    }
}

// This trait allows one to use `.parse::<Id>()`.

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Id::create(s)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0)
    }
}

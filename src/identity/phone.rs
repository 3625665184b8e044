//! Phone number logic management.

use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde::Serialize;

use crate::error::{Result, ServerError};

pub(crate) static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[1-9][0-9]{7,14}$").expect("phone pattern is valid")
});

/// Value object of a phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Converts a string into a [`PhoneNumber`].
    ///
    /// Spaces, dashes and dots used as separators are dropped before
    /// matching.
    pub fn parse(phone: impl AsRef<str>) -> Result<Self> {
        let phone: String = phone
            .as_ref()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.'))
            .collect();

        if PHONE_RE.is_match(&phone) {
            Ok(Self(phone))
        } else {
            Err(ServerError::field(
                "phone",
                "phone",
                "Phone number must contain 8 to 15 digits.",
            ))
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

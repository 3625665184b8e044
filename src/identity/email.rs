//! Email logic management.

use std::fmt;

use serde::Serialize;
use validator::ValidateEmail;

use crate::error::{Result, ServerError};

/// Value object of a valid email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Converts a string into a case-normalized [`EmailAddress`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if the string is not a valid email address.
    pub fn parse(email: impl AsRef<str>) -> Result<Self> {
        let email = email.as_ref().trim().to_lowercase();
        if email.validate_email() {
            Ok(Self(email))
        } else {
            Err(ServerError::field(
                "email",
                "email",
                "Email must be formatted.",
            ))
        }
    }

    /// Returns the same string as a string slice `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

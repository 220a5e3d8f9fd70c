//! The signed-in user's identity.

use crate::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the user this device rings for.
///
/// Loaded once from the identity store at startup and immutable afterwards;
/// a re-login replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    phone: String,
    calling_code: String,
}

impl UserIdentity {
    /// Creates an identity from a local number and a calling code (e.g. "+1").
    ///
    /// Surrounding whitespace is trimmed. The phone must be non-empty ASCII
    /// digits; the calling code is digits with an optional leading `+`.
    pub fn new(phone: impl AsRef<str>, calling_code: impl AsRef<str>) -> DomainResult<Self> {
        let phone = phone.as_ref().trim();
        let calling_code = calling_code.as_ref().trim();

        if phone.is_empty() {
            return Err(DomainError::missing("phone"));
        }
        if !phone.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::InvalidFieldValue {
                field: "phone".to_string(),
                value: phone.to_string(),
                expected: "ASCII digits".to_string(),
            });
        }

        let code_digits = calling_code.strip_prefix('+').unwrap_or(calling_code);
        if code_digits.is_empty() {
            return Err(DomainError::missing("calling_code"));
        }
        if !code_digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::InvalidFieldValue {
                field: "calling_code".to_string(),
                value: calling_code.to_string(),
                expected: "digits with optional leading '+'".to_string(),
            });
        }

        Ok(Self {
            phone: phone.to_string(),
            calling_code: calling_code.to_string(),
        })
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn calling_code(&self) -> &str {
        &self.calling_code
    }

    /// International form: calling code immediately followed by the number.
    ///
    /// `{phone: "5551234", calling_code: "+1"}` gives `"+15551234"`.
    #[must_use]
    pub fn e164(&self) -> String {
        format!("{}{}", self.calling_code, self.phone)
    }

    /// National display form with a trunk prefix (`"0" + phone`).
    #[must_use]
    pub fn national(&self) -> String {
        format!("0{}", self.phone)
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.e164())
    }
}

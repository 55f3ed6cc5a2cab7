//! Strings that must never show up in logs.

use std::fmt::{Debug, Formatter};
use zeroize::Zeroize;

/// Placeholder printed instead of the secret value.
pub static REDACTED: &str = "###REDACTED###";

/// Holds a password or key material. Debug output is redacted and the
/// backing memory is zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct RedactedString {
    inner: String,
}

impl RedactedString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    pub fn expose(&self) -> &str {
        &self.inner
    }
}

impl From<String> for RedactedString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Debug for RedactedString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", REDACTED)
    }
}

impl Drop for RedactedString {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

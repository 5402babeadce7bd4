//! Password material handling
//!
//! Login passwords pass through this crate on their way to the gateway and
//! nowhere else. The wrapper keeps them out of logs and zeroes the memory on
//! drop.

use std::fmt;

use zeroize::Zeroize;

/// A login password. Redacted in `Debug` and `Display`, zeroed on drop.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    /// Wrap password material.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the inner value. Only the wire call should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password([REDACTED])")
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Drop for Password {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

//! Email address parsing (RFC 5322 §3.4).

use serde::{Deserialize, Serialize};

/// A parsed email address.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `display_name = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"user@example.com"` → `display_name = ""`, `address = "user@example.com"`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`).
    pub address: String,
}

impl EmailAddress {
    /// Build an address from its two halves.
    pub fn new(display_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            address: address.into(),
        }
    }

    /// Parse a single email address from a header value.
    ///
    /// Supported formats:
    /// - `"user@domain.com"`
    /// - `"<user@domain.com>"`
    /// - `"Display Name <user@domain.com>"`
    /// - `"\"Display, Name\" <user@domain.com>"`
    ///
    /// If parsing fails, the trimmed raw string is stored as `address`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self {
                    display_name: strip_quotes(&trimmed[..open]),
                    address: trimmed[open + 1..close].trim().to_string(),
                };
            }
        }

        Self {
            display_name: String::new(),
            address: trimmed.to_string(),
        }
    }

    /// Case-insensitive comparison of the address portion only.
    ///
    /// `other` may itself be a full `"Name <addr>"` string; its display name is ignored.
    pub fn same_address(&self, other: &str) -> bool {
        let other = Self::parse(other);
        !self.address.is_empty() && self.address.eq_ignore_ascii_case(&other.address)
    }

    /// Format for display: `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_address() {
        let addr = EmailAddress::parse("user@example.com");
        assert_eq!(addr.address, "user@example.com");
        assert_eq!(addr.display_name, "");
    }

    #[test]
    fn test_parse_quoted_name() {
        let addr = EmailAddress::parse("\"Last, First\" <user@example.com>");
        assert_eq!(addr.address, "user@example.com");
        assert_eq!(addr.display_name, "Last, First");
    }

    #[test]
    fn test_same_address_ignores_case_and_name() {
        let addr = EmailAddress::new("Prof. X", "X@Y.edu");
        assert!(addr.same_address("x@y.edu"));
        assert!(addr.same_address("Someone Else <x@Y.EDU>"));
        assert!(!addr.same_address("z@y.edu"));
    }

    #[test]
    fn test_same_address_is_not_substring_match() {
        let addr = EmailAddress::new("", "max@y.edu");
        assert!(!addr.same_address("x@y.edu"));
    }

    #[test]
    fn test_empty_address_never_matches() {
        let addr = EmailAddress::parse("");
        assert!(!addr.same_address(""));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            EmailAddress::new("Alice", "alice@example.com").display(),
            "Alice <alice@example.com>"
        );
        assert_eq!(
            EmailAddress::new("", "alice@example.com").to_string(),
            "alice@example.com"
        );
    }
}

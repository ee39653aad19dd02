//! WhatsApp contact number type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`WhatsAppNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// The input has no digits at all.
    #[error("phone number cannot be empty")]
    Empty,
    /// The input contains characters other than digits and formatting.
    #[error("phone number contains invalid character '{0}'")]
    InvalidCharacter(char),
    /// Too few or too many digits.
    #[error("phone number must have between {min} and {max} digits (got {got})")]
    InvalidLength {
        /// Minimum allowed digits.
        min: usize,
        /// Maximum allowed digits.
        max: usize,
        /// Digits found.
        got: usize,
    },
}

/// A WhatsApp number, normalized to digits only.
///
/// ## Constraints
///
/// - Formatting characters (spaces, `+`, `-`, `(`, `)`, `.`) are stripped
/// - 10 to 13 digits remain: area code + number, optionally prefixed by
///   the country code
///
/// ## Examples
///
/// ```
/// use atacado_core::WhatsAppNumber;
///
/// let number = WhatsAppNumber::parse("+55 (11) 98765-4321").unwrap();
/// assert_eq!(number.as_str(), "5511987654321");
///
/// assert!(WhatsAppNumber::parse("").is_err());
/// assert!(WhatsAppNumber::parse("12345").is_err());
/// assert!(WhatsAppNumber::parse("11 9876x4321").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct WhatsAppNumber(String);

impl WhatsAppNumber {
    /// Minimum digit count (area code + 8-digit landline).
    pub const MIN_DIGITS: usize = 10;
    /// Maximum digit count (country code + area code + 9-digit mobile).
    pub const MAX_DIGITS: usize = 13;

    /// Parse and normalize a number.
    ///
    /// # Errors
    ///
    /// Returns an error if the input:
    /// - Has no digits
    /// - Contains anything other than digits and common formatting
    /// - Has fewer than 10 or more than 13 digits
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        let mut digits = String::with_capacity(s.len());
        for ch in s.chars() {
            match ch {
                '0'..='9' => digits.push(ch),
                ' ' | '+' | '-' | '(' | ')' | '.' => {}
                other => return Err(PhoneError::InvalidCharacter(other)),
            }
        }

        if digits.is_empty() {
            return Err(PhoneError::Empty);
        }

        if !(Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digits.len()) {
            return Err(PhoneError::InvalidLength {
                min: Self::MIN_DIGITS,
                max: Self::MAX_DIGITS,
                got: digits.len(),
            });
        }

        Ok(Self(digits))
    }

    /// Returns the normalized digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the number and returns its digits.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for WhatsAppNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for WhatsAppNumber {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for WhatsAppNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_formatting() {
        let n = WhatsAppNumber::parse("(11) 98765-4321").unwrap();
        assert_eq!(n.as_str(), "11987654321");
    }

    #[test]
    fn test_parse_with_country_code() {
        let n: WhatsAppNumber = "+55 11 98765 4321".parse().unwrap();
        assert_eq!(n.as_str(), "5511987654321");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(WhatsAppNumber::parse(" - "), Err(PhoneError::Empty));
    }

    #[test]
    fn test_parse_invalid_character() {
        assert_eq!(
            WhatsAppNumber::parse("11a987654321"),
            Err(PhoneError::InvalidCharacter('a'))
        );
    }

    #[test]
    fn test_parse_length_bounds() {
        assert!(matches!(
            WhatsAppNumber::parse("123456789"),
            Err(PhoneError::InvalidLength { got: 9, .. })
        ));
        assert!(WhatsAppNumber::parse("1234567890").is_ok());
        assert!(WhatsAppNumber::parse("1234567890123").is_ok());
        assert!(matches!(
            WhatsAppNumber::parse("12345678901234"),
            Err(PhoneError::InvalidLength { got: 14, .. })
        ));
    }
}

//! Barcode value type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Barcode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BarcodeError {
    /// The input string is empty.
    #[error("barcode cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("barcode must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains a character outside the supported alphabets.
    #[error("barcode contains unsupported character {0:?}")]
    UnsupportedCharacter(char),
}

/// A decoded barcode value.
///
/// This type validates the raw string a decoder (or a manual-entry form)
/// hands us before anything downstream touches the catalog with it.
///
/// ## Constraints
///
/// - Length: 1-48 characters (covers EAN/UPC and practical Code 128 labels)
/// - Characters limited to the Code 39/Code 128 printable subset; numeric
///   symbologies (EAN-13, EAN-8, UPC-A) are digits only and pass trivially
///
/// ## Examples
///
/// ```
/// use cartwheel_core::Barcode;
///
/// assert!(Barcode::parse("0123456789012").is_ok());
/// assert!(Barcode::parse("ABC-123").is_ok());
///
/// assert!(Barcode::parse("").is_err());        // empty
/// assert!(Barcode::parse("caf\u{e9}").is_err()); // outside the label alphabet
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Barcode(String);

impl Barcode {
    /// Maximum length of a barcode value.
    pub const MAX_LENGTH: usize = 48;

    /// Parse a `Barcode` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input:
    /// - Is empty
    /// - Is longer than 48 characters
    /// - Contains characters outside the supported label alphabet
    pub fn parse(s: &str) -> Result<Self, BarcodeError> {
        if s.is_empty() {
            return Err(BarcodeError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(BarcodeError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if let Some(c) = s.chars().find(|c| !Self::is_label_char(*c)) {
            return Err(BarcodeError::UnsupportedCharacter(c));
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the barcode as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Barcode` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    const fn is_label_char(c: char) -> bool {
        c.is_ascii_alphanumeric()
            || matches!(c, '-' | '.' | ' ' | '$' | '/' | '+' | '%')
    }
}

impl fmt::Display for Barcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Barcode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_symbologies() {
        assert!(Barcode::parse("4006381333931").is_ok()); // EAN-13
        assert!(Barcode::parse("96385074").is_ok()); // EAN-8
        assert!(Barcode::parse("036000291452").is_ok()); // UPC-A
    }

    #[test]
    fn test_parse_code39_alphabet() {
        assert!(Barcode::parse("CODE-39 $/+%").is_ok());
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(Barcode::parse(""), Err(BarcodeError::Empty));
    }

    #[test]
    fn test_parse_rejects_too_long() {
        let long = "1".repeat(Barcode::MAX_LENGTH + 1);
        assert_eq!(
            Barcode::parse(&long),
            Err(BarcodeError::TooLong {
                max: Barcode::MAX_LENGTH
            })
        );
    }

    #[test]
    fn test_parse_rejects_unsupported_characters() {
        assert_eq!(
            Barcode::parse("012345\n"),
            Err(BarcodeError::UnsupportedCharacter('\n'))
        );
    }

    #[test]
    fn test_display_round_trip() {
        let code = Barcode::parse("0123456789012").expect("valid barcode");
        assert_eq!(code.to_string(), "0123456789012");
        assert_eq!(code.as_str(), "0123456789012");
    }
}

//! ISBN format validation for the interactive ISBN-override flow.
//!
//! Validation is format-only: 10 or 13 digits after stripping hyphens and
//! spaces (an ISBN-10 may end in an `X` check character). No checksum is
//! computed; the metadata provider is the authority on whether the ISBN
//! resolves.

/// Strips hyphens and spaces from a candidate ISBN.
#[must_use]
pub fn strip_separators(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect()
}

/// Returns the cleaned digit string if `raw` is a well-formed ISBN-10 or
/// ISBN-13, otherwise `None`.
#[must_use]
pub fn validate(raw: &str) -> Option<String> {
    let cleaned = strip_separators(raw);

    let valid = match cleaned.len() {
        13 => cleaned.chars().all(|c| c.is_ascii_digit()),
        10 => {
            let (head, tail) = cleaned.split_at(9);
            head.chars().all(|c| c.is_ascii_digit())
                && tail
                    .chars()
                    .all(|c| c.is_ascii_digit() || c == 'X' || c == 'x')
        }
        _ => false,
    };

    valid.then(|| cleaned.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_isbn13_plain() {
        assert_eq!(validate("9780261103283"), Some("9780261103283".to_string()));
    }

    #[test]
    fn test_validate_isbn13_hyphenated() {
        assert_eq!(
            validate("978-0-261-10328-3"),
            Some("9780261103283".to_string())
        );
    }

    #[test]
    fn test_validate_isbn10_with_spaces() {
        assert_eq!(validate("0 261 10328 4"), Some("0261103284".to_string()));
    }

    #[test]
    fn test_validate_isbn10_x_check_char() {
        assert_eq!(validate("080442957X"), Some("080442957X".to_string()));
        assert_eq!(validate("080442957x"), Some("080442957X".to_string()));
    }

    #[test]
    fn test_validate_rejects_wrong_length() {
        assert_eq!(validate("12345"), None);
        assert_eq!(validate("978026110328"), None); // 12 digits
        assert_eq!(validate(""), None);
    }

    #[test]
    fn test_validate_rejects_letters() {
        assert_eq!(validate("97802611032AB"), None);
        assert_eq!(validate("not an isbn"), None);
    }

    #[test]
    fn test_validate_rejects_x_in_middle() {
        assert_eq!(validate("08044X9571"), None);
    }

    #[test]
    fn test_no_checksum_validation() {
        // Format-only: a digit string with an invalid check digit still passes
        assert_eq!(validate("9780000000002"), Some("9780000000002".to_string()));
    }
}

//! Normalized string similarity scoring for title/author comparison.
//!
//! Review mentions arrive in mixed case, with stray punctuation and
//! diacritics ("Cien años de soledad", "cien anos de soledad!"), so both
//! sides are folded to a canonical form before the edit-distance ratio is
//! computed. Pure functions, no I/O.

use unicode_normalization::UnicodeNormalization;

/// Normalizes a string for comparison.
///
/// NFKD-decomposes, drops combining marks (so "é" compares equal to "e"),
/// lowercases, strips everything that is not a Unicode letter, digit, or
/// whitespace, collapses runs of whitespace, and trims.
///
/// # Examples
///
/// ```
/// use libris_core::similarity::normalize;
///
/// assert_eq!(normalize("  The Hobbit!  "), "the hobbit");
/// assert_eq!(normalize("Cien años"), "cien anos");
/// assert_eq!(normalize("A -- B"), "a b");
/// ```
#[must_use]
pub fn normalize(s: &str) -> String {
    let folded: String = s
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns the similarity of two strings in `[0, 1]`.
///
/// 1.0 when the normalized forms are equal (including both empty);
/// otherwise the normalized Levenshtein ratio over the normalized forms.
/// Symmetric and deterministic.
///
/// # Examples
///
/// ```
/// use libris_core::similarity::similarity;
///
/// assert_eq!(similarity("The Hobbit", "the hobbit!"), 1.0);
/// assert_eq!(similarity("test", ""), 0.0);
/// ```
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = normalize(a);
    let right = normalize(b);

    if left == right {
        return 1.0;
    }

    strsim::normalized_levenshtein(&left, &right)
}

/// True for Unicode combining marks left behind by NFKD decomposition.
fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{1AB0}'..='\u{1AFF}' | '\u{1DC0}'..='\u{1DFF}' | '\u{20D0}'..='\u{20FF}' | '\u{FE20}'..='\u{FE2F}')
}

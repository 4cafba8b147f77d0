//! Text similarity for SQL drift detection
//!
//! This is a positional character comparison over aggressively normalised
//! text, not an edit distance. Characters are compared pairwise up to the
//! shorter length; any excess on the longer side only counts through the
//! denominator. A result of `100.0` means the normalised texts are identical.

use once_cell::sync::Lazy;
use regex::Regex;

static NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\s+|;|\bgo\b)").unwrap());

/// Strip surrounding whitespace, then remove every whitespace run, semicolon
/// and standalone `GO` token.
///
/// Dropping separators can expose a new standalone `go` (`g;o` becomes
/// `go`), so removal repeats until the text is stable.
pub fn normalize(text: &str) -> String {
    let mut current = NOISE.replace_all(text.trim(), "").into_owned();
    loop {
        let next = NOISE.replace_all(&current, "");
        if next == current {
            return current;
        }
        current = next.into_owned();
    }
}

/// Similarity percentage of two SQL fragments, rounded to two decimals.
///
/// Both sides empty after normalisation counts as identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = normalize(a).chars().collect();
    let b: Vec<char> = normalize(b).chars().collect();

    let total = a.len().max(b.len());
    if total == 0 {
        return 100.0;
    }

    let matches = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    let ratio = matches as f64 / total as f64 * 100.0;
    (ratio * 100.0).round() / 100.0
}

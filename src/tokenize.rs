//! Keyword extraction from raw log lines.

use std::sync::LazyLock;

use regex::Regex;

/// Characters stripped from both ends of every whitespace-separated piece.
const SPECIALS: &[char] = &[' ', '\t', '(', ')', '[', ']', '{', '}', ':'];

/// Volatile patterns that would fragment the tree without adding structure:
/// timestamps, dates, addresses and short durations. Matching is anchored at
/// the start of the piece; any match marks the piece as cruft.
static CRUFT_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}",
        r"^\d{1,4}/\d{1,2}/\d{1,4}",
        r"^\d{1,2}-[A-Za-z]{3}-\d{2,4}",
        r"^\d{1,4}-\d{1,2}-\d{1,4}",
        r"^\d{2}:\d{2}:\d{2}",
        r"^\d{1,4}(\.\d+)?(ms|s|m|h)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("cruft pattern compiles"))
    .collect()
});

/// Check whether a piece should be excluded from grouping.
pub fn is_cruft(piece: &str) -> bool {
    CRUFT_RES.iter().any(|re| re.is_match(piece))
}

/// Remove surrounding whitespace, brackets and colons.
pub fn strip_specials(piece: &str) -> &str {
    piece.trim_matches(SPECIALS)
}

/// Convert a log line into its keyword tokens, in order. Pure and
/// deterministic; cruft pieces and pieces that strip down to nothing are
/// dropped.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace()
        .map(strip_specials)
        .filter(|piece| !piece.is_empty() && !is_cruft(piece))
        .map(str::to_string)
        .collect()
}

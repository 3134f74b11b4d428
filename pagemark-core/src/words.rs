//! Word counting and progress arithmetic.
//!
//! Word counts must agree with the server, which sums `strings.Fields` over
//! every text token of every spine document. [`count_words`] is that rule:
//! runs of whitespace separate words, leading and trailing whitespace is
//! ignored, and an empty or all-whitespace string has no words.

/// Count the words in `text`.
pub fn count_words(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Percentage complete in `[0, 100]`, rounded to two decimals.
pub fn percentage(current_word: u64, total_words: u64) -> f64 {
    if total_words == 0 {
        return 0.0;
    }
    let ratio = current_word.min(total_words) as f64 / total_words as f64;
    (ratio * 10_000.0).round() / 100.0
}

/// Fraction of the book read in `[0, 1]`, rounded to five decimals.
///
/// This is the value carried by progress sync events.
pub fn sync_fraction(current_word: u64, total_words: u64) -> f64 {
    if total_words == 0 {
        return 0.0;
    }
    let ratio = current_word.min(total_words) as f64 / total_words as f64;
    (ratio * 100_000.0).round() / 100_000.0
}

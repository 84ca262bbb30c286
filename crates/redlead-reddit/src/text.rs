//! Keyword matching over post text.

/// Lowercase ASCII alphanumerics, every other character becomes a single space.
#[must_use]
pub fn normalize_text_for_match(input: &str) -> String {
    input
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether every word of `keyword` appears as a whole word in `text`.
///
/// Reddit search matches loosely (stemming, title-or-body, sometimes
/// neither); this re-checks the result locally. Word order is not enforced.
#[must_use]
pub fn mentions_all_words(text: &str, keyword: &str) -> bool {
    let padded = format!(" {} ", normalize_text_for_match(text));
    let words: Vec<String> = normalize_text_for_match(keyword)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(|w| format!(" {w} "))
        .collect();
    !words.is_empty() && words.iter().all(|needle| padded.contains(needle))
}

/// Whether `phrase` appears in `text` as a whole-word phrase.
#[must_use]
pub fn mentions_phrase(text: &str, phrase: &str) -> bool {
    let phrase = normalize_text_for_match(phrase);
    if phrase.is_empty() {
        return false;
    }
    let padded = format!(" {} ", normalize_text_for_match(text));
    padded.contains(&format!(" {phrase} "))
}

/// Placeholder bodies Reddit substitutes for deleted or moderated content.
#[must_use]
pub fn is_removed_marker(text: &str) -> bool {
    matches!(text.trim(), "[deleted]" | "[removed]")
}

//! Small text helpers shared by the hashing encoder, the heuristic
//! reflection stages and the repetition guard.

/// Split `text` into lowercase word tokens.
///
/// A word is a maximal run of alphanumeric characters or underscores, so
/// punctuation never ends up inside a token. Works for any script that
/// `char::is_alphanumeric` understands, including Hangul.
#[must_use]
pub fn word_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Shorten `text` to at most `max_chars` characters, appending an ellipsis
/// when something was cut.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_lowercase_words() {
        assert_eq!(
            word_tokens("Hello, World! It's 9am_now."),
            vec!["hello", "world", "it", "s", "9am_now"]
        );
    }

    #[test]
    fn tokens_handle_hangul() {
        assert_eq!(word_tokens("안녕 하세요!"), vec!["안녕", "하세요"]);
    }

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc…");
    }
}

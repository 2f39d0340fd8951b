//! Prompt sanitization.

use std::sync::LazyLock;

use regex::Regex;

/// Replacement for restricted words.
const NEUTRAL_WORD: &str = "atmospheric";

/// Words that trip image safety filters even in a poetic context.
static RESTRICTED_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(death|dead|die|blood|kill|murder|suicide|war|battle|weapon|gun|knife|attack|violence|naked|explicit|divine|god|religious|demon|hell|evil|terror|bomb|crash|pain|suffering)\b",
    )
    .unwrap()
});

/// Replace restricted words in a subject line with a neutral word.
///
/// Only the text sent to providers is sanitized; captions keep the raw line.
pub fn sanitize_subject(text: &str) -> String {
    RESTRICTED_WORDS.replace_all(text, NEUTRAL_WORD).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_whole_words_only() {
        assert_eq!(
            sanitize_subject("the War of roses"),
            "the atmospheric of roses"
        );
        // "warm" and "painted" contain restricted substrings but are not restricted words
        assert_eq!(sanitize_subject("warm painted light"), "warm painted light");
    }

    #[test]
    fn test_clean_text_untouched() {
        let line = "Soft rain over the harbor";
        assert_eq!(sanitize_subject(line), line);
    }
}

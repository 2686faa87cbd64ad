use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x{4e00}-\x{9fa5}]+|[0-9]+\.?[0-9]*|[a-zA-Z]+").expect("valid regex")
});

/// Term granularity shared by indexing and querying.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerMode {
    /// One term per CJK character plus lowercased alphanumeric runs.
    #[default]
    Chars,
    /// CJK runs, numbers and Latin words of at least two characters.
    Words,
}

impl TokenizerMode {
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        match self {
            TokenizerMode::Chars => char_terms(text),
            TokenizerMode::Words => WORD_RE
                .find_iter(text)
                .map(|m| m.as_str())
                .filter(|token| token.chars().count() >= 2)
                .map(|token| token.to_lowercase())
                .collect(),
        }
    }
}

fn is_cjk(ch: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&ch)
}

fn char_terms(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut word = String::new();
    for ch in text.chars() {
        if is_cjk(ch) {
            flush(&mut word, &mut terms);
            terms.push(ch.to_string());
        } else if ch.is_alphanumeric() {
            word.extend(ch.to_lowercase());
        } else {
            flush(&mut word, &mut terms);
        }
    }
    flush(&mut word, &mut terms);
    terms
}

fn flush(word: &mut String, terms: &mut Vec<String>) {
    if !word.is_empty() {
        terms.push(std::mem::take(word));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chars_mode_splits_cjk_and_keeps_words() {
        let terms = TokenizerMode::Chars.tokenize("烟草RFID改造 2024年");
        assert_eq!(terms, vec!["烟", "草", "rfid", "改", "造", "2024", "年"]);
    }

    #[test]
    fn words_mode_keeps_runs_of_two_or_more() {
        let terms = TokenizerMode::Words.tokenize("数字化转型，投入1.5亿元 a AI");
        assert_eq!(terms, vec!["数字化转型", "投入", "1.5", "亿元", "ai"]);
    }

    #[test]
    fn empty_text_has_no_terms() {
        assert!(TokenizerMode::Chars.tokenize("  ，。").is_empty());
        assert!(TokenizerMode::Words.tokenize("").is_empty());
    }
}

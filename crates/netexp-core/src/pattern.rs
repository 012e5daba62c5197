//! Console output patterns.
//!
//! Consoles are scraped, not queried. Every prompt, marker and value shape
//! is a [`Pattern`]: the exact source text plus its compiled regex. Matching
//! can be restricted to the trailing window of a transcript so that stale
//! output earlier in the buffer never satisfies a wait.

use std::fmt;

use regex::Regex;

use crate::Result;

/// A named console pattern.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern from regex source.
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let regex = Regex::new(&source)?;
        Ok(Self { source, regex })
    }

    /// Compile a pattern that matches `text` literally.
    pub fn literal(text: &str) -> Result<Self> {
        let regex = Regex::new(&regex::escape(text))?;
        Ok(Self {
            source: text.to_string(),
            regex,
        })
    }

    /// The source text of the pattern.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Length of the pattern source in characters.
    ///
    /// Prompt waits use this as their match window.
    pub fn char_len(&self) -> usize {
        self.source.chars().count()
    }

    /// The compiled regex.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Match anywhere in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Match within the last `window` characters of `text`.
    ///
    /// `None` searches the whole text.
    pub fn is_match_in_tail(&self, text: &str, window: Option<usize>) -> bool {
        match window {
            Some(window) => self.regex.is_match(tail(text, window)),
            None => self.regex.is_match(text),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// The last `max_chars` characters of `text`.
pub fn tail(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return &text[text.len()..];
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_ascii() {
        assert_eq!(tail("hello world", 5), "world");
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("abc", 0), "");
    }

    #[test]
    fn test_tail_counts_characters_not_bytes() {
        assert_eq!(tail("ééé", 2), "éé");
    }

    #[test]
    fn test_prompt_char_len() {
        let prompt = Pattern::new("\r\n% ").unwrap();
        assert_eq!(prompt.char_len(), 4);
    }

    #[test]
    fn test_match_only_in_window() {
        let prompt = Pattern::new("\r\nPktgen:/> ").unwrap();
        let text = "\r\nPktgen:/> set 0 rate 10\r\nsome more output";
        assert!(prompt.is_match_in_tail(text, None));
        assert!(!prompt.is_match_in_tail(text, Some(prompt.char_len())));

        let text = "output\r\nPktgen:/> ";
        assert!(prompt.is_match_in_tail(text, Some(prompt.char_len())));
    }

    #[test]
    fn test_literal_escapes_metacharacters() {
        let marker = Pattern::literal("[done] (ok)").unwrap();
        assert!(marker.is_match("job [done] (ok)"));
        assert!(!marker.is_match("job done ok"));
        assert_eq!(marker.as_str(), "[done] (ok)");
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(Pattern::new("([unclosed").is_err());
    }
}

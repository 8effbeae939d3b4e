//! Statement normalizer
//!
//! Replaces string and numeric literals with `?` so statements that differ
//! only by literal values group together.

use crate::utils::BoundedCache;

const PLACEHOLDER: char = '?';

/// Literal-stripping normalizer memoized by exact input
#[derive(Debug)]
pub struct StatementNormalizer {
    cache: BoundedCache<String, String>,
}

impl StatementNormalizer {
    pub fn new(capacity: usize) -> Self {
        Self { cache: BoundedCache::new(capacity) }
    }

    /// Normalized form of `statement`, cached
    pub fn normalize(&mut self, statement: &str) -> String {
        if let Some(normalized) = self.cache.get(statement) {
            return normalized.clone();
        }
        let normalized = Self::normalize_uncached(statement);
        self.cache.insert(statement.to_string(), normalized.clone());
        normalized
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Replace `'...'`, `"..."` and standalone numbers with `?`
    ///
    /// Back-quoted identifiers are copied verbatim. Inside literals both
    /// backslash escapes and doubled delimiters are honored. Idempotent.
    pub fn normalize_uncached(statement: &str) -> String {
        let chars: Vec<char> = statement.chars().collect();
        let mut out = String::with_capacity(statement.len());
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\'' | '"' => {
                    i = Self::skip_quoted(&chars, i);
                    out.push(PLACEHOLDER);
                },
                '`' => {
                    let end = Self::skip_quoted(&chars, i);
                    out.extend(&chars[i..end]);
                    i = end;
                },
                d if d.is_ascii_digit() && !Self::follows_identifier(&out) => {
                    let end = Self::scan_number(&chars, i);
                    if chars.get(end).is_some_and(|next| Self::is_identifier_char(*next)) {
                        // `1st`, `2xl`: part of a word, not a literal
                        out.extend(&chars[i..end]);
                    } else {
                        out.push(PLACEHOLDER);
                    }
                    i = end;
                },
                _ => {
                    out.push(c);
                    i += 1;
                },
            }
        }

        out
    }

    /// Index just past the literal opened at `start`; unterminated literals run to the end
    fn skip_quoted(chars: &[char], start: usize) -> usize {
        let delimiter = chars[start];
        let mut i = start + 1;

        while i < chars.len() {
            match chars[i] {
                '\\' if delimiter != '`' => i += 2,
                c if c == delimiter => {
                    if chars.get(i + 1) == Some(&delimiter) {
                        i += 2;
                    } else {
                        return i + 1;
                    }
                },
                _ => i += 1,
            }
        }

        chars.len()
    }

    /// Digits, optional fraction, optional exponent
    fn scan_number(chars: &[char], start: usize) -> usize {
        let digits_from = |mut i: usize| {
            while chars.get(i).is_some_and(char::is_ascii_digit) {
                i += 1;
            }
            i
        };

        let mut i = digits_from(start);

        if chars.get(i) == Some(&'.') && chars.get(i + 1).is_some_and(char::is_ascii_digit) {
            i = digits_from(i + 1);
        }

        if matches!(chars.get(i), Some('e') | Some('E')) {
            let mut j = i + 1;
            if matches!(chars.get(j), Some('+') | Some('-')) {
                j += 1;
            }
            if chars.get(j).is_some_and(char::is_ascii_digit) {
                i = digits_from(j);
            }
        }

        i
    }

    fn follows_identifier(out: &str) -> bool {
        out.chars().next_back().is_some_and(Self::is_identifier_char)
    }

    fn is_identifier_char(c: char) -> bool {
        c.is_alphanumeric() || c == '_' || c == '$'
    }
}

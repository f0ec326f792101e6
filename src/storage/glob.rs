//! Glob pattern matcher for `Store::keys`.
//!
//! Supported patterns:
//! - `*` matches any run of bytes, including none
//! - `?` matches exactly one byte
//! - `[ae]`, `[a-z]`, `[^a]` match (or exclude) a set of bytes
//! - `\x` matches `x` literally
//!
//! Patterns are checked when compiled: an unterminated class, an empty class
//! or a trailing backslash is reported as [`StoreError::BadPattern`].

use crate::error::StoreError;

/// A validated glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: Vec<u8>,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self, StoreError> {
        let bytes = pattern.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => {
                    if i + 1 >= bytes.len() {
                        return Err(StoreError::BadPattern(pattern.to_string()));
                    }
                    i += 2;
                }
                b'[' => match parse_class(bytes, i, None) {
                    Some((_, end)) => i = end,
                    None => return Err(StoreError::BadPattern(pattern.to_string())),
                },
                _ => i += 1,
            }
        }
        Ok(Self {
            pattern: bytes.to_vec(),
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        matches_at(&self.pattern, text.as_bytes())
    }
}

/// Greedy wildcard match in `O(pattern × text)`.
///
/// Only the most recent `*` is ever backtracked to: a later star subsumes
/// every alignment an earlier one could have tried.
fn matches_at(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // (pattern index after the last `*`, text index that star resumes from)
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if pattern.get(p) == Some(&b'*') {
            p += 1;
            star = Some((p, t));
            continue;
        }
        if let Some(next) = match_one(pattern, p, text[t]) {
            p = next;
            t += 1;
            continue;
        }
        match star {
            Some((after_star, resume)) => {
                p = after_star;
                t = resume + 1;
                star = Some((after_star, t));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}

/// Matches the single-byte token at `pattern[p]` against `c`, returning the
/// index of the next token.
fn match_one(pattern: &[u8], p: usize, c: u8) -> Option<usize> {
    match *pattern.get(p)? {
        b'*' => None,
        b'?' => Some(p + 1),
        b'[' => match parse_class(pattern, p, Some(c)) {
            Some((true, end)) => Some(end),
            _ => None,
        },
        b'\\' => (*pattern.get(p + 1)? == c).then_some(p + 2),
        literal => (literal == c).then_some(p + 1),
    }
}

/// Parses the class starting at `pattern[start] == b'['`.
///
/// Returns whether `probe` is a member and the index just past the closing
/// `]`, or `None` if the class is malformed.
fn parse_class(pattern: &[u8], start: usize, probe: Option<u8>) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    let mut members = 0;
    loop {
        let mut lo = *pattern.get(i)?;
        if lo == b']' {
            break;
        }
        if lo == b'\\' {
            i += 1;
            lo = *pattern.get(i)?;
        }
        i += 1;

        let mut hi = lo;
        if pattern.get(i) == Some(&b'-') && pattern.get(i + 1).is_some_and(|&b| b != b']') {
            i += 1;
            hi = pattern[i];
            if hi == b'\\' {
                i += 1;
                hi = *pattern.get(i)?;
            }
            i += 1;
        }

        members += 1;
        if let Some(c) = probe {
            if lo <= c && c <= hi {
                matched = true;
            }
        }
    }

    if members == 0 {
        return None;
    }
    Some((matched != negate, i + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn glob(p: &str) -> GlobPattern {
        GlobPattern::new(p).unwrap()
    }

    #[test]
    fn test_glob_pattern() {
        let pattern = glob("h*llo");
        assert!(pattern.matches("hello"));
        assert!(pattern.matches("hallo"));
        assert!(pattern.matches("hllo"));
        assert!(pattern.matches("heeeello"));
        assert!(!pattern.matches("world"));

        let pattern = glob("h?llo");
        assert!(pattern.matches("hello"));
        assert!(pattern.matches("hallo"));
        assert!(!pattern.matches("hllo"));
        assert!(!pattern.matches("heello"));

        let pattern = glob("*");
        assert!(pattern.matches(""));
        assert!(pattern.matches("anything"));

        let pattern = glob("h[ae]llo");
        assert!(pattern.matches("hello"));
        assert!(pattern.matches("hallo"));
        assert!(!pattern.matches("hillo"));
    }

    #[test]
    fn test_ranges_negation_and_escapes() {
        let pattern = glob("key[0-3]");
        assert!(pattern.matches("key0"));
        assert!(pattern.matches("key3"));
        assert!(!pattern.matches("key4"));

        let pattern = glob("h[^e]llo");
        assert!(pattern.matches("hallo"));
        assert!(!pattern.matches("hello"));

        let pattern = glob("a\\*b");
        assert!(pattern.matches("a*b"));
        assert!(!pattern.matches("axb"));
    }

    #[test]
    fn test_multiple_stars() {
        let pattern = glob("*user*:*id*");
        assert!(pattern.matches("app:user:42:id"));
        assert!(pattern.matches("user:id"));
        assert!(!pattern.matches("user-id"));

        let pattern = glob("a*b*c");
        assert!(pattern.matches("abc"));
        assert!(pattern.matches("axxbyybzzc"));
        assert!(!pattern.matches("axxbyyc"));
        assert!(!pattern.matches("abcx"));

        assert!(glob("**").matches(""));
        assert!(glob("x*[0-9]?").matches("x__5z"));
        assert!(glob("*\\**").matches("a*b"));
        assert!(!glob("*\\**").matches("ab"));
    }

    #[test]
    fn test_many_stars_against_long_key_is_fast() {
        let pattern = glob("*a*a*a*a*a*a*a*a*a*a*b");
        let key = "a".repeat(4_000);

        let started = Instant::now();
        assert!(!pattern.matches(&key));
        assert!(pattern.matches(&format!("{}b", key)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_malformed_patterns() {
        for bad in ["[abc", "abc\\", "[]", "x[^]", "[a-"] {
            assert!(
                matches!(GlobPattern::new(bad), Err(StoreError::BadPattern(_))),
                "{bad} should be rejected"
            );
        }
    }
}

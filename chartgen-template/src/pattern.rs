//! Minimal glob matching for selector names and label values.
//!
//! Supports `*` (any number of characters) and `?` (exactly one character).
//! The matcher follows the backtracking scheme described by Kirk J Krauss,
//! operating on a pre-tokenized pattern: consecutive `?` collapse into one
//! counted token and consecutive `*` collapse into a single wildcard.

/// A pre-tokenized glob pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// A verbatim string which must match exactly.
    Literal(String),
    /// Exactly `n` arbitrary characters.
    Any(usize),
    /// Any number of arbitrary characters, including none.
    Wildcard,
}

/// Returns `true` if `s` contains glob metacharacters.
pub fn contains_meta(s: &str) -> bool {
    s.contains(['*', '?'])
}

impl Pattern {
    /// Tokenizes `pattern`. Never fails; a pattern without metacharacters
    /// degenerates to a single literal token.
    pub fn new(pattern: &str) -> Self {
        let mut tokens = Vec::new();
        let mut literal = String::new();

        for c in pattern.chars() {
            match c {
                '*' => {
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    if tokens.last() != Some(&Token::Wildcard) {
                        tokens.push(Token::Wildcard);
                    }
                }
                '?' => {
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    match tokens.last_mut() {
                        Some(Token::Any(n)) => *n += 1,
                        _ => tokens.push(Token::Any(1)),
                    }
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Self {
            raw: pattern.to_owned(),
            tokens,
        }
    }

    /// The original pattern source.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches `haystack` against this pattern.
    pub fn is_match(&self, haystack: &str) -> bool {
        // Remainder of the haystack which still needs to be matched.
        let mut h_current = haystack;
        // Saved haystack position for backtracking.
        let mut h_revert = haystack;
        // Token index to revert to; zero means no wildcard seen yet.
        let mut t_revert = 0;
        // The next token to evaluate.
        let mut t_next = 0;

        loop {
            if t_next == self.tokens.len() && h_current.is_empty() {
                return true;
            }

            let matched = if t_next == self.tokens.len() {
                false
            } else {
                let token = &self.tokens[t_next];
                t_next += 1;

                match token {
                    Token::Literal(literal) => match h_current.strip_prefix(literal.as_str()) {
                        Some(rest) => {
                            h_current = rest;
                            true
                        }
                        None => false,
                    },
                    Token::Any(n) => match n_chars_to_bytes(*n, h_current) {
                        Some(bytes) => {
                            h_current = &h_current[bytes..];
                            true
                        }
                        // Not enough characters remaining, no other
                        // backtracking position can make this match.
                        None => return false,
                    },
                    Token::Wildcard => {
                        // A trailing wildcard matches everything left.
                        if t_next == self.tokens.len() {
                            return true;
                        }
                        t_revert = t_next;
                        h_revert = h_current;
                        true
                    }
                }
            };

            if !matched {
                if t_revert == 0 {
                    return false;
                }
                match h_revert.chars().next() {
                    Some(c) => {
                        h_revert = &h_revert[c.len_utf8()..];
                        h_current = h_revert;
                        t_next = t_revert;
                    }
                    None => return false,
                }
            }
        }
    }
}

/// Byte length of the first `n` characters of `s`, or `None` if `s` is
/// shorter than `n` characters.
fn n_chars_to_bytes(n: usize, s: &str) -> Option<usize> {
    if n == 0 {
        return Some(0);
    }
    let mut chars = 0;
    for (offset, c) in s.char_indices() {
        chars += 1;
        if chars == n {
            return Some(offset + c.len_utf8());
        }
    }
    None
}

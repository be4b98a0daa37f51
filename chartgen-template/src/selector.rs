//! Series selector parsing and matching.
//!
//! A selector binds a dimension to metric series:
//!
//! ```text
//! svc.requests_total
//! svc.requests_total{method="GET"}
//! svc.request_time{quantile=~".+"}
//! *{direction!="out", nic=~"eth.*"}
//! ```
//!
//! The metric-name part and `=`/`!=` values accept glob patterns (`*`, `?`);
//! `=~`/`!~` values are regular expressions, anchored on both ends. A
//! selector whose name part is `*` (or missing) carries no metric-name
//! constraint and matches by label alone.

use regex::Regex;

use crate::error::SelectorError;
use crate::pattern::{self, Pattern};
use crate::program::Labels;

/// A compiled series selector.
#[derive(Debug, Clone)]
pub struct Selector {
    raw: String,
    name: NameMatcher,
    labels: Vec<LabelMatcher>,
}

#[derive(Debug, Clone)]
enum NameMatcher {
    Exact(String),
    Glob(Pattern),
    Any,
}

#[derive(Debug, Clone)]
struct LabelMatcher {
    key: String,
    op: LabelOp,
}

#[derive(Debug, Clone)]
enum LabelOp {
    Eq(ValueMatcher),
    Neq(ValueMatcher),
    Re(Regex),
    NotRe(Regex),
}

#[derive(Debug, Clone)]
enum ValueMatcher {
    Exact(String),
    Glob(Pattern),
}

impl ValueMatcher {
    fn new(value: &str) -> Self {
        if pattern::contains_meta(value) {
            Self::Glob(Pattern::new(value))
        } else {
            Self::Exact(value.to_owned())
        }
    }

    fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == value,
            Self::Glob(glob) => glob.is_match(value),
        }
    }
}

impl Selector {
    /// Parses a selector from its textual form.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SelectorError::Empty);
        }

        let (name_part, block) = match input.find('{') {
            Some(open) => {
                let rest = &input[open..];
                let inner = rest
                    .strip_prefix('{')
                    .and_then(|r| r.strip_suffix('}'))
                    .ok_or(SelectorError::UnbalancedBraces)?;
                (input[..open].trim(), Some(inner))
            }
            None if input.contains('}') => return Err(SelectorError::UnbalancedBraces),
            None => (input, None),
        };

        let name = parse_name(name_part)?;
        let labels = match block {
            Some(block) => parse_label_block(block)?,
            None => Vec::new(),
        };

        if matches!(name, NameMatcher::Any) && labels.is_empty() {
            return Err(SelectorError::Empty);
        }

        Ok(Self {
            raw: input.to_owned(),
            name,
            labels,
        })
    }

    /// The selector source text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The exact metric name this selector constrains, if any.
    pub fn metric_name(&self) -> Option<&str> {
        match &self.name {
            NameMatcher::Exact(name) => Some(name),
            _ => None,
        }
    }

    /// Returns `true` if the selector has no exact metric-name constraint
    /// and must be matched against every series.
    pub fn is_wildcard(&self) -> bool {
        !matches!(self.name, NameMatcher::Exact(_))
    }

    /// The label keys this selector constrains, positive or negative.
    pub fn constrained_keys(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|matcher| matcher.key.as_str())
    }

    /// Matches a series by metric name and full label set.
    ///
    /// A missing label fails positive matchers (`=`, `=~`) and satisfies
    /// negative ones (`!=`, `!~`).
    pub fn matches(&self, name: &str, labels: &Labels) -> bool {
        let name_ok = match &self.name {
            NameMatcher::Exact(exact) => exact == name,
            NameMatcher::Glob(glob) => glob.is_match(name),
            NameMatcher::Any => true,
        };
        if !name_ok {
            return false;
        }

        self.labels.iter().all(|matcher| {
            let value = labels.get(&matcher.key).map(String::as_str);
            match (&matcher.op, value) {
                (LabelOp::Eq(m), Some(value)) => m.is_match(value),
                (LabelOp::Neq(m), Some(value)) => !m.is_match(value),
                (LabelOp::Re(re), Some(value)) => re.is_match(value),
                (LabelOp::NotRe(re), Some(value)) => !re.is_match(value),
                (LabelOp::Eq(_) | LabelOp::Re(_), None) => false,
                (LabelOp::Neq(_) | LabelOp::NotRe(_), None) => true,
            }
        })
    }
}

fn parse_name(name: &str) -> Result<NameMatcher, SelectorError> {
    if name.is_empty() || name == "*" {
        return Ok(NameMatcher::Any);
    }

    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '*' | '?'));
    if !valid {
        return Err(SelectorError::InvalidName {
            name: name.to_owned(),
        });
    }

    if pattern::contains_meta(name) {
        Ok(NameMatcher::Glob(Pattern::new(name)))
    } else {
        Ok(NameMatcher::Exact(name.to_owned()))
    }
}

fn parse_label_block(block: &str) -> Result<Vec<LabelMatcher>, SelectorError> {
    let mut matchers = Vec::new();
    for fragment in split_matchers(block) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            continue;
        }
        matchers.push(parse_matcher(fragment)?);
    }
    Ok(matchers)
}

/// Splits a label block on commas outside of quoted values.
fn split_matchers(block: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in block.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                out.push(&block[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&block[start..]);
    out
}

fn parse_matcher(fragment: &str) -> Result<LabelMatcher, SelectorError> {
    let invalid = || SelectorError::InvalidMatcher {
        matcher: fragment.to_owned(),
    };

    let op_start = fragment.find(['=', '!']).ok_or_else(invalid)?;
    let key = fragment[..op_start].trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid());
    }

    let rest = &fragment[op_start..];
    let (op, value) = if let Some(value) = rest.strip_prefix("=~") {
        ("=~", value)
    } else if let Some(value) = rest.strip_prefix("!~") {
        ("!~", value)
    } else if let Some(value) = rest.strip_prefix("!=") {
        ("!=", value)
    } else if let Some(value) = rest.strip_prefix('=') {
        ("=", value)
    } else {
        return Err(invalid());
    };

    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(invalid)?;

    let op = match op {
        "=" => LabelOp::Eq(ValueMatcher::new(value)),
        "!=" => LabelOp::Neq(ValueMatcher::new(value)),
        "=~" => LabelOp::Re(anchored(value)?),
        "!~" => LabelOp::NotRe(anchored(value)?),
        _ => unreachable!(),
    };

    Ok(LabelMatcher {
        key: key.to_owned(),
        op,
    })
}

fn anchored(re: &str) -> Result<Regex, SelectorError> {
    Ok(Regex::new(&format!("^(?:{re})$"))?)
}

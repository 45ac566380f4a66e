//! Per-field extraction with an explicit outcome.
//!
//! Every field is located and converted on its own. A missing node yields
//! [`Extracted::Absent`], a node whose text cannot be converted yields
//! [`Extracted::Malformed`]; neither stops extraction of the other fields.

use chrono::NaiveDate;
use scraper::{ElementRef, Selector};
use staywatch_core::{Result, StaywatchError};
use tracing::{debug, warn};

/// Outcome tag of a single field extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Found,
    Absent,
    Malformed,
}

/// A field value together with how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<T> {
    Found(T),
    /// The node holding the field was not located.
    Absent,
    /// The node was located but its content could not be converted. Carries
    /// the raw text for diagnostics.
    Malformed(String),
}

impl<T> Extracted<T> {
    pub fn outcome(&self) -> Outcome {
        match self {
            Extracted::Found(_) => Outcome::Found,
            Extracted::Absent => Outcome::Absent,
            Extracted::Malformed(_) => Outcome::Malformed,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Extracted::Found(_))
    }

    pub fn value(self) -> Option<T> {
        match self {
            Extracted::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Extracted::Absent, Extracted::Found)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Extracted<U> {
        match self {
            Extracted::Found(value) => Extracted::Found(f(value)),
            Extracted::Absent => Extracted::Absent,
            Extracted::Malformed(raw) => Extracted::Malformed(raw),
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Extracted<U>) -> Extracted<U> {
        match self {
            Extracted::Found(value) => f(value),
            Extracted::Absent => Extracted::Absent,
            Extracted::Malformed(raw) => Extracted::Malformed(raw),
        }
    }

    /// Tries `fallback` unless a value was already found. When both fail, a
    /// malformed result wins over an absent one.
    pub fn or_else(self, fallback: impl FnOnce() -> Extracted<T>) -> Extracted<T> {
        if self.is_found() {
            return self;
        }
        match (self, fallback()) {
            (_, found @ Extracted::Found(_)) => found,
            (malformed @ Extracted::Malformed(_), _) => malformed,
            (_, other) => other,
        }
    }

    /// Found only when both sides are found.
    pub fn zip<U>(self, other: Extracted<U>) -> Extracted<(T, U)> {
        match (self, other) {
            (Extracted::Found(a), Extracted::Found(b)) => Extracted::Found((a, b)),
            (Extracted::Malformed(raw), _) | (_, Extracted::Malformed(raw)) => Extracted::Malformed(raw),
            _ => Extracted::Absent,
        }
    }

    /// Collapses to an optional value, logging why a field was dropped.
    pub fn log(self, field: &'static str) -> Option<T> {
        match self {
            Extracted::Found(value) => Some(value),
            Extracted::Absent => {
                debug!(field, "Field absent");
                None
            }
            Extracted::Malformed(raw) => {
                warn!(field, raw = %raw, "Field malformed");
                None
            }
        }
    }
}

/// Where a rule reads its value from once the node is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Trimmed text fragments joined with no separator.
    Text,
    /// Trimmed text fragments joined with single spaces.
    Prose,
    Attr(&'static str),
}

/// A selector plus the place to read from.
#[derive(Debug, Clone)]
pub struct Rule {
    selector: Selector,
    source: Source,
}

pub fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| StaywatchError::Selector(format!("{}: {}", css, e)))
}

impl Rule {
    pub fn new(css: &str, source: Source) -> Result<Self> {
        Ok(Self {
            selector: parse_selector(css)?,
            source,
        })
    }

    pub fn text(css: &str) -> Result<Self> {
        Self::new(css, Source::Text)
    }

    pub fn prose(css: &str) -> Result<Self> {
        Self::new(css, Source::Prose)
    }

    pub fn attr(css: &str, name: &'static str) -> Result<Self> {
        Self::new(css, Source::Attr(name))
    }

    pub fn first<'a>(&self, node: ElementRef<'a>) -> Option<ElementRef<'a>> {
        node.select(&self.selector).next()
    }

    /// Value of the first matching node.
    pub fn extract(&self, node: ElementRef<'_>) -> Extracted<String> {
        match self.first(node) {
            Some(element) => self.read(element),
            None => Extracted::Absent,
        }
    }

    /// Non-empty values of every matching node, in document order.
    pub fn extract_all(&self, node: ElementRef<'_>) -> Vec<String> {
        node.select(&self.selector)
            .filter_map(|element| self.read(element).value())
            .collect()
    }

    fn read(&self, element: ElementRef<'_>) -> Extracted<String> {
        let value = match self.source {
            Source::Text => collapsed_text(element),
            Source::Prose => prose_text(element),
            Source::Attr(name) => match element.value().attr(name) {
                Some(value) => value.trim().to_string(),
                None => return Extracted::Absent,
            },
        };

        if value.is_empty() {
            Extracted::Absent
        } else {
            Extracted::Found(value)
        }
    }
}

/// Trimmed text nodes concatenated without separators.
pub fn collapsed_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn prose_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Direct element children of `element`, in order.
pub fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

fn is_space_separator(c: char) -> bool {
    matches!(c, ' ' | '\u{a0}' | '\u{202f}' | '\'')
}

/// Exactly three digits starting at `at`, not followed by a fourth.
fn digit_group_at(chars: &[char], at: usize) -> bool {
    let group = chars.get(at..at + 3);
    group.is_some_and(|g| g.iter().all(char::is_ascii_digit))
        && !chars.get(at + 3).is_some_and(char::is_ascii_digit)
}

/// First run of digits and separators in `raw`, e.g. `"1.234,50"` out of
/// `"desde 1.234,50 €"`.
fn numeric_token(raw: &str) -> Option<String> {
    let chars: Vec<char> = raw.chars().collect();
    let start = chars.iter().position(char::is_ascii_digit)?;

    let mut token = String::new();
    if start > 0 && chars[start - 1] == '-' {
        token.push('-');
    }

    let mut i = start;
    while let Some(&c) = chars.get(i) {
        let keep = c.is_ascii_digit()
            || (matches!(c, '.' | ',') && chars.get(i + 1).is_some_and(char::is_ascii_digit))
            || (is_space_separator(c) && digit_group_at(&chars, i + 1));
        if !keep {
            break;
        }
        token.push(c);
        i += 1;
    }
    Some(token)
}

/// A lone separator is a thousands mark when it is followed by exactly three
/// digits and preceded by one to three digits not starting with zero.
fn lone_separator_is_decimal(body: &str, sep: char) -> bool {
    if body.matches(sep).count() > 1 {
        return false;
    }
    match body.split_once(sep) {
        Some((head, tail)) => {
            let grouping = tail.len() == 3 && (1..=3).contains(&head.len()) && !head.starts_with('0');
            !grouping
        }
        None => false,
    }
}

/// Rewrites a locale-formatted number into the `1234.5` form.
///
/// Handles comma-as-decimal with dot grouping (`1.234,50`), the reverse
/// (`1,234.50`) and space grouping (`1 234,5`). Returns `None` when `raw`
/// holds no digits.
pub fn normalize_number(raw: &str) -> Option<String> {
    let token = numeric_token(raw)?;
    let (sign, body) = match token.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", token.as_str()),
    };
    let body: String = body.chars().filter(|c| !is_space_separator(*c)).collect();

    let decimal = match (body.rfind('.'), body.rfind(',')) {
        (Some(dot), Some(comma)) => Some(if dot > comma { '.' } else { ',' }),
        (Some(_), None) => lone_separator_is_decimal(&body, '.').then_some('.'),
        (None, Some(_)) => lone_separator_is_decimal(&body, ',').then_some(','),
        (None, None) => None,
    };

    let strip_grouping = |s: &str| s.chars().filter(char::is_ascii_digit).collect::<String>();
    let normalized = match decimal.and_then(|sep| body.rfind(sep)) {
        Some(idx) => format!("{}{}.{}", sign, strip_grouping(&body[..idx]), &body[idx + 1..]),
        None => format!("{}{}", sign, strip_grouping(&body)),
    };
    Some(normalized)
}

pub fn to_decimal(raw: &str) -> Extracted<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Extracted::Absent;
    }
    match normalize_number(trimmed)
        .and_then(|n| n.parse::<f64>().ok())
        .filter(|v| v.is_finite())
    {
        Some(value) => Extracted::Found(value),
        None => Extracted::Malformed(trimmed.to_string()),
    }
}

/// Whole units; any fractional part is truncated, not rounded.
pub fn to_integer(raw: &str) -> Extracted<i64> {
    to_decimal(raw).and_then(|value| {
        if value.abs() < i64::MAX as f64 {
            Extracted::Found(value.trunc() as i64)
        } else {
            Extracted::Malformed(raw.trim().to_string())
        }
    })
}

pub fn to_count(raw: &str) -> Extracted<u32> {
    to_integer(raw).and_then(|value| match u32::try_from(value) {
        Ok(count) => Extracted::Found(count),
        Err(_) => Extracted::Malformed(raw.trim().to_string()),
    })
}

pub fn to_date(raw: &str) -> Extracted<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Extracted::Absent;
    }
    ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .map_or_else(|| Extracted::Malformed(trimmed.to_string()), Extracted::Found)
}

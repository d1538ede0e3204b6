//! Profit queries over the derived margin table.
//!
//! A query is parsed from loosely typed request parameters (strings from a
//! query string, or JSON numbers), validated with every problem collected,
//! and then applied as filter → sort by gain margin → offset/count window.

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::{MarginEntry, MarginTable, RankedMargins};

pub const DEFAULT_NAME_PATTERN: &str = "*";
pub const DEFAULT_ITEMS_COUNT: usize = 10;
pub const MAX_ITEMS_COUNT: i64 = 100;

// Request parameter names.
pub const PARAM_GEM_NAME: &str = "gem_name";
pub const PARAM_MIN_SELL_PRICE: &str = "min_sell_price_chaos";
pub const PARAM_MAX_BUY_PRICE: &str = "max_buy_price_chaos";
pub const PARAM_MIN_EXPERIENCE_DELTA: &str = "min_experience_delta";
pub const PARAM_ITEMS_OFFSET: &str = "items_offset";
pub const PARAM_ITEMS_COUNT: &str = "items_count";

const KNOWN_PARAMS: &[&str] = &[
    PARAM_GEM_NAME,
    PARAM_MIN_SELL_PRICE,
    PARAM_MAX_BUY_PRICE,
    PARAM_MIN_EXPERIENCE_DELTA,
    PARAM_ITEMS_OFFSET,
    PARAM_ITEMS_COUNT,
];

/// Untyped request parameters, keyed by parameter name.
pub type RawParams = HashMap<String, Value>;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// A validated profit query.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitQuery {
    /// Glob pattern (`*`, `?`, `[...]`) matched against the gem name.
    pub gem_name: String,
    /// Keep gems whose costliest price is at least this.
    pub min_sell_price: Option<i64>,
    /// Keep gems whose cheapest price is at most this.
    pub max_buy_price: Option<i64>,
    /// Keep gems whose experience delta is at least this.
    pub min_experience_delta: Option<i64>,
    pub offset: usize,
    pub count: usize,
}

impl Default for ProfitQuery {
    fn default() -> Self {
        Self {
            gem_name: DEFAULT_NAME_PATTERN.to_string(),
            min_sell_price: None,
            max_buy_price: None,
            min_experience_delta: None,
            offset: 0,
            count: DEFAULT_ITEMS_COUNT,
        }
    }
}

/// Integer coercion of one parameter. `Ok(None)` when absent.
fn coerce_int(field: &str, value: Option<&Value>) -> Result<Option<i64>, String> {
    let err = |shown: &dyn std::fmt::Display| format!("Could not convert {field} value '{shown}' to integer");
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Some(i)),
            // Floats truncate toward zero
            None => n.as_f64().filter(|f| f.is_finite()).map(|f| Some(f as i64)).ok_or_else(|| err(n)),
        },
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| err(s)),
        Some(other) => Err(err(other)),
    }
}

impl ProfitQuery {
    /// Parse and validate raw parameters, reporting every problem at once.
    pub fn parse(params: &RawParams) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();

        let mut unknown: Vec<&String> = params
            .keys()
            .filter(|k| !KNOWN_PARAMS.contains(&k.as_str()))
            .collect();
        unknown.sort();
        errors.extend(unknown.into_iter().map(|k| format!("Unknown query parameter '{k}'")));

        let gem_name = match params.get(PARAM_GEM_NAME) {
            None | Some(Value::Null) => DEFAULT_NAME_PATTERN.to_string(),
            Some(Value::String(s)) if s.is_empty() => DEFAULT_NAME_PATTERN.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        let mut int_param = |field: &str| match coerce_int(field, params.get(field)) {
            Ok(v) => v,
            Err(e) => {
                errors.push(e);
                None
            }
        };
        let min_sell_price = int_param(PARAM_MIN_SELL_PRICE);
        let max_buy_price = int_param(PARAM_MAX_BUY_PRICE);
        let min_experience_delta = int_param(PARAM_MIN_EXPERIENCE_DELTA);
        let offset = int_param(PARAM_ITEMS_OFFSET).unwrap_or(0);
        let count = int_param(PARAM_ITEMS_COUNT).unwrap_or(DEFAULT_ITEMS_COUNT as i64);

        if min_sell_price.is_some_and(|v| v < 0) {
            errors.push("Min sell price must not be negative".to_string());
        }
        if max_buy_price.is_some_and(|v| v < 0) {
            errors.push("Max buy price must not be negative".to_string());
        }
        if min_experience_delta.is_some_and(|v| v < 0) {
            errors.push("Min experience delta must not be negative".to_string());
        }
        if offset < 0 {
            errors.push("Items offset must not be negative".to_string());
        }
        if !(0..=MAX_ITEMS_COUNT).contains(&count) {
            errors.push(format!("Items count must be between 0 and {MAX_ITEMS_COUNT}"));
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            gem_name,
            min_sell_price,
            max_buy_price,
            min_experience_delta,
            offset: offset as usize,
            count: count as usize,
        })
    }

    /// Parse parameters taken straight from a query string.
    pub fn from_query_string(params: &HashMap<String, String>) -> Result<Self, Vec<String>> {
        let raw: RawParams = params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Self::parse(&raw)
    }

    /// Whether a gem passes the name pattern and every numeric filter.
    pub fn matches(&self, name: &str, entry: &MarginEntry) -> bool {
        if !wildcard_match(&self.gem_name, name) {
            return false;
        }
        if let Some(min_sell) = self.min_sell_price {
            if entry.max.price < min_sell as f64 {
                return false;
            }
        }
        if let Some(max_buy) = self.max_buy_price {
            if entry.min.price > max_buy as f64 {
                return false;
            }
        }
        if let Some(min_delta) = self.min_experience_delta {
            if entry.experience_delta() < min_delta as f64 {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Filter, sort by gain margin descending (stable), then window the result.
pub fn rank(margins: &MarginTable, query: &ProfitQuery) -> RankedMargins {
    let mut hits: Vec<(String, MarginEntry)> = margins
        .iter()
        .filter(|(name, entry)| query.matches(name, entry))
        .map(|(name, entry)| (name.clone(), *entry))
        .collect();

    hits.sort_by(|a, b| descending(a.1.gain_margin, b.1.gain_margin));

    RankedMargins(hits.into_iter().skip(query.offset).take(query.count).collect())
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or_else(|| b.is_nan().cmp(&a.is_nan()))
}

// ---------------------------------------------------------------------------
// Glob matching
// ---------------------------------------------------------------------------

/// `[...]` / `[!...]` character set.
struct CharClass {
    negated: bool,
    ranges: Vec<(char, char)>,
}

impl CharClass {
    fn matches(&self, c: char) -> bool {
        self.ranges.iter().any(|(lo, hi)| *lo <= c && c <= *hi) != self.negated
    }
}

/// Parse a character class starting at `pattern[start] == '['`.
/// Returns the class and the index after its closing `]`, or `None` if the
/// bracket is never closed (it is then a literal `[`).
fn parse_class(pattern: &[char], start: usize) -> Option<(CharClass, usize)> {
    let mut i = start + 1;
    let negated = pattern.get(i) == Some(&'!');
    if negated {
        i += 1;
    }
    let body_start = i;
    // A leading `]` belongs to the set
    if pattern.get(i) == Some(&']') {
        i += 1;
    }
    while i < pattern.len() && pattern[i] != ']' {
        i += 1;
    }
    if i >= pattern.len() {
        return None;
    }

    let body = &pattern[body_start..i];
    let mut ranges = Vec::new();
    let mut k = 0;
    while k < body.len() {
        if k + 2 < body.len() && body[k + 1] == '-' {
            ranges.push((body[k], body[k + 2]));
            k += 3;
        } else {
            ranges.push((body[k], body[k]));
            k += 1;
        }
    }
    Some((CharClass { negated, ranges }, i + 1))
}

/// Shell-style, case-sensitive glob match over the whole string.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // (pattern index of the last `*`, text index it is currently absorbing up to)
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        let next = match p.get(pi) {
            Some('*') => {
                star = Some((pi, ti));
                pi += 1;
                continue;
            }
            Some('?') => Some(pi + 1),
            Some('[') => match parse_class(&p, pi) {
                Some((class, after)) => class.matches(t[ti]).then_some(after),
                None => (t[ti] == '[').then_some(pi + 1),
            },
            Some(c) => (*c == t[ti]).then_some(pi + 1),
            None => None,
        };

        match (next, star) {
            (Some(after), _) => {
                pi = after;
                ti += 1;
            }
            (None, Some((star_pi, star_ti))) => {
                pi = star_pi + 1;
                ti = star_ti + 1;
                star = Some((star_pi, star_ti + 1));
            }
            (None, None) => return false,
        }
    }

    p[pi.min(p.len())..].iter().all(|c| *c == '*')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Type Inference - Classifies raw CSV text into SQLite column types

use crate::config::TypingPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared SQL type of a column
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    /// Surrogate identifier column, never produced by classification
    IntegerPrimaryKey,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
            SqlType::IntegerPrimaryKey => "INTEGER PRIMARY KEY",
        }
    }

    /// Lattice join: TEXT beats REAL beats INTEGER
    pub fn widen(self, observed: SqlType) -> SqlType {
        match (self, observed) {
            (current, new) if current == new => current,
            (_, SqlType::Text) => SqlType::Text,
            (SqlType::Integer, SqlType::Real) => SqlType::Real,
            (current, _) => current,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Classify a single raw value as INTEGER, REAL or TEXT
pub fn classify_value(text: &str) -> SqlType {
    let trimmed = text.trim();
    if is_integer_literal(trimmed) {
        SqlType::Integer
    } else if is_real_literal(trimmed) {
        SqlType::Real
    } else {
        SqlType::Text
    }
}

/// Optional sign, then decimal digits; single underscores may separate digits.
/// No width limit: values beyond i64 are still integer literals.
fn is_integer_literal(text: &str) -> bool {
    let digits = text.strip_prefix(&['+', '-'][..]).unwrap_or(text);
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') {
        return false;
    }
    let mut previous_underscore = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => previous_underscore = false,
            '_' if !previous_underscore => previous_underscore = true,
            _ => return false,
        }
    }
    true
}

fn is_real_literal(text: &str) -> bool {
    !text.is_empty() && text.parse::<f64>().is_ok()
}

/// Row-at-a-time column type reduction under a typing policy
#[derive(Clone, Debug)]
pub struct ColumnTypeAccumulator {
    policy: TypingPolicy,
    types: Vec<SqlType>,
    rows_seen: usize,
}

impl ColumnTypeAccumulator {
    pub fn new(policy: TypingPolicy, width: usize) -> Self {
        let initial = match policy {
            TypingPolicy::None => SqlType::Text,
            TypingPolicy::Full | TypingPolicy::Quick => SqlType::Integer,
        };
        Self {
            policy,
            types: vec![initial; width],
            rows_seen: 0,
        }
    }

    /// Whether another data row would change anything
    pub fn wants_more(&self) -> bool {
        match self.policy {
            TypingPolicy::None => false,
            TypingPolicy::Quick => self.rows_seen == 0,
            TypingPolicy::Full => self.types.iter().any(|t| *t != SqlType::Text),
        }
    }

    /// Fold one data row into the column types; extra values are ignored
    pub fn observe<S: AsRef<str>>(&mut self, row: &[S]) {
        if !self.wants_more() {
            self.rows_seen += 1;
            return;
        }
        for (current, value) in self.types.iter_mut().zip(row) {
            if *current == SqlType::Text {
                continue;
            }
            *current = current.widen(classify_value(value.as_ref()));
        }
        self.rows_seen += 1;
    }

    pub fn rows_seen(&self) -> usize {
        self.rows_seen
    }

    pub fn finish(self) -> Vec<SqlType> {
        self.types
    }
}

/// Reduce one column's values to a single type under `policy`
pub fn classify_column<I, S>(values: I, policy: TypingPolicy) -> SqlType
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut accumulator = ColumnTypeAccumulator::new(policy, 1);
    for value in values {
        if !accumulator.wants_more() {
            break;
        }
        accumulator.observe(&[value]);
    }
    accumulator
        .finish()
        .into_iter()
        .next()
        .unwrap_or(SqlType::Text)
}

use std::collections::HashMap;
use std::fmt::Display;

use serde::Serialize;
use serde_json::{Map, Value};

/// Schema-less row. The grid returns whatever columns the backend decides to
/// include and detail pages carry free-form field labels, so rows are ordered
/// key/value maps rather than fixed structs. Key order is first-seen
/// (serde_json's `preserve_order`).
pub type Record = Map<String, Value>;

/// Filter parameters for one scrape invocation. Built once, immutable after.
/// Blank values are dropped on insert.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct FilterSet(HashMap<String, String>);

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a filter set from raw key/value input, trimming values and
    /// dropping blank ones.
    pub fn from_raw<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut filters = Self::new();
        for (key, value) in pairs {
            filters.insert(key, value.as_ref());
        }
        filters
    }

    pub fn insert(&mut self, key: impl Into<String>, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.0.insert(key.into(), value.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// One decoded page of the grid response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridPage {
    /// Declared total page count (not row count).
    pub total: u32,
    pub rows: Vec<Record>,
}

/// Final output of a scrape: summary rows plus zero or more detail records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeResult {
    pub summary: Vec<Record>,
    pub details: Vec<Record>,
}

/// One option of a filter `<select>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOption {
    pub label: String,
    pub value: String,
}

/// A filter form field with its available options, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterField {
    pub name: String,
    pub options: Vec<FilterOption>,
}

impl Display for FilterField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ({} option(s))", self.name, self.options.len())?;
        for option in &self.options {
            writeln!(f, "  {} = {}", option.label, option.value)?;
        }
        Ok(())
    }
}

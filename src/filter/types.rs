use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use super::error::FilterError;

/// How a filter value is compared against its column(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    ContainsInsensitive,
}

/// Type the raw filter text is converted to before binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Text,
    Integer,
}

/// One optional predicate an entity view accepts.
#[derive(Debug, Clone, Serialize)]
pub struct FilterSpec {
    pub name: &'static str,
    pub columns: Vec<&'static str>,
    pub mode: MatchMode,
    pub kind: ValueKind,
}

impl FilterSpec {
    /// Case-insensitive substring search over one or more text columns.
    pub fn contains(name: &'static str, columns: &[&'static str]) -> Self {
        Self {
            name,
            columns: columns.to_vec(),
            mode: MatchMode::ContainsInsensitive,
            kind: ValueKind::Text,
        }
    }

    pub fn exact(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            columns: vec![column],
            mode: MatchMode::Exact,
            kind: ValueKind::Text,
        }
    }

    pub fn exact_integer(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            columns: vec![column],
            mode: MatchMode::Exact,
            kind: ValueKind::Integer,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub column: String,
    pub sort: SortDirection,
    pub nulls_last: bool,
}

/// Query text plus its positional parameters; `$n` refers to `params[n-1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Value>,
}

/// Caller-supplied filter values keyed by filter name.
///
/// Values are trimmed on read; a blank value is the same as an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    values: BTreeMap<String, String>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    /// True when no filter carries a usable value.
    pub fn is_empty(&self) -> bool {
        self.values.values().all(|v| v.trim().is_empty())
    }
}

impl From<HashMap<String, String>> for FilterSet {
    fn from(values: HashMap<String, String>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for FilterSet {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }
}

/// 1-based page number and a positive page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Result<Self, FilterError> {
        if page == 0 {
            return Err(FilterError::InvalidPage("page numbers start at 1".to_string()));
        }
        if page_size == 0 {
            return Err(FilterError::InvalidPage("page size must be positive".to_string()));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn limit(&self) -> u64 {
        self.page_size as u64
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }

    /// Same page number with the size clamped to `max`.
    pub fn capped(self, max: u32) -> Self {
        Self {
            page: self.page,
            page_size: self.page_size.min(max.max(1)),
        }
    }

    pub fn total_pages(&self, total_matching: u64) -> u64 {
        total_matching.div_ceil(self.page_size as u64)
    }
}

/// Count and page queries built from the same predicate fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQueries {
    pub count: SqlResult,
    pub page: SqlResult,
}

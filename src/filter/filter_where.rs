use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterSet, FilterSpec, MatchMode, SqlResult, ValueKind};

/// Compiles present filters into one AND-joined predicate fragment.
///
/// The fragment carries no `WHERE` keyword and is empty when no filter is
/// present. Placeholders are numbered in the order parameters are pushed.
pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
    conditions: Vec<String>,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
            conditions: vec![],
        }
    }

    /// Predicate fragment for `filters` against the declared `specs`, in
    /// declaration order.
    pub fn generate(view: &str, specs: &[FilterSpec], filters: &FilterSet) -> Result<SqlResult, FilterError> {
        Self::reject_unknown(view, specs, filters)?;

        let mut filter_where = Self::new(0);
        for spec in specs {
            if let Some(raw) = filters.get(spec.name) {
                filter_where.push_condition(spec, raw)?;
            }
        }

        Ok(SqlResult {
            query: filter_where.conditions.join(" AND "),
            params: filter_where.param_values,
        })
    }

    fn reject_unknown(view: &str, specs: &[FilterSpec], filters: &FilterSet) -> Result<(), FilterError> {
        for name in filters.names() {
            if !specs.iter().any(|s| s.name == name) {
                return Err(FilterError::UnknownFilter {
                    view: view.to_string(),
                    filter: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn push_condition(&mut self, spec: &FilterSpec, raw: &str) -> Result<(), FilterError> {
        let value = Self::typed_value(spec, raw)?;

        let clauses: Vec<String> = spec
            .columns
            .iter()
            .map(|column| match spec.mode {
                MatchMode::Exact => format!("{} = {}", column, self.param(value.clone())),
                MatchMode::ContainsInsensitive => {
                    let pattern = format!("%{}%", escape_like(raw));
                    format!("{} ILIKE {}", column, self.param(Value::String(pattern)))
                }
            })
            .collect();

        let sql = if clauses.len() == 1 {
            clauses.into_iter().collect()
        } else {
            format!("({})", clauses.join(" OR "))
        };
        self.conditions.push(sql);
        Ok(())
    }

    fn typed_value(spec: &FilterSpec, raw: &str) -> Result<Value, FilterError> {
        match spec.kind {
            ValueKind::Text => Ok(Value::String(raw.to_string())),
            ValueKind::Integer => raw.parse::<i64>().map(Value::from).map_err(|_| FilterError::InvalidValue {
                filter: spec.name.to_string(),
                value: raw.to_string(),
                reason: "expected an integer".to_string(),
            }),
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

/// Escape LIKE metacharacters so user text only ever matches literally.
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

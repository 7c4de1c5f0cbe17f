use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::filter::{SqlResult, ValueKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatementError {
    #[error("Unknown statement: {0}")]
    UnknownStatement(String),

    #[error("Statement {statement} requires parameter {param}")]
    MissingParam { statement: String, param: String },

    #[error("Statement {statement} has no parameter {param}")]
    UnknownParam { statement: String, param: String },

    #[error("Invalid value for {statement}.{param}: {reason}")]
    InvalidParam {
        statement: String,
        param: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ValueKind,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ValueKind) -> Self {
        Self { name, kind, required: true }
    }

    pub fn optional(name: &'static str, kind: ValueKind) -> Self {
        Self { name, kind, required: false }
    }
}

/// A fixed write statement whose `$n` placeholders follow `params` order.
#[derive(Debug, Clone, Serialize)]
pub struct WriteStatement {
    pub id: &'static str,
    pub sql: &'static str,
    pub params: Vec<ParamSpec>,
}

impl WriteStatement {
    /// Bind named values positionally. Absent or blank optional values bind NULL.
    pub fn bind(&self, values: &HashMap<String, Value>) -> Result<SqlResult, StatementError> {
        if let Some(unknown) = values.keys().find(|k| !self.params.iter().any(|p| p.name == k.as_str())) {
            return Err(StatementError::UnknownParam {
                statement: self.id.to_string(),
                param: unknown.clone(),
            });
        }

        let mut params = Vec::with_capacity(self.params.len());
        for spec in &self.params {
            let value = match values.get(spec.name).map(normalize) {
                Some(Value::Null) | None if spec.required => {
                    return Err(StatementError::MissingParam {
                        statement: self.id.to_string(),
                        param: spec.name.to_string(),
                    })
                }
                Some(Value::Null) | None => Value::Null,
                Some(value) => self.coerce(spec, value)?,
            };
            params.push(value);
        }

        Ok(SqlResult {
            query: self.sql.to_string(),
            params,
        })
    }

    fn coerce(&self, spec: &ParamSpec, value: Value) -> Result<Value, StatementError> {
        let invalid = |reason: &str| StatementError::InvalidParam {
            statement: self.id.to_string(),
            param: spec.name.to_string(),
            reason: reason.to_string(),
        };

        match (spec.kind, value) {
            (ValueKind::Text, Value::String(s)) => Ok(Value::String(s)),
            (ValueKind::Text, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (ValueKind::Integer, Value::Number(n)) => n.as_i64().map(Value::from).ok_or_else(|| invalid("expected an integer")),
            (ValueKind::Integer, Value::String(s)) => s
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid("expected an integer")),
            (_, other) => Err(invalid(&format!("unsupported value {}", other))),
        }
    }
}

/// Trim strings; blank strings become NULL.
fn normalize(value: &Value) -> Value {
    match value {
        Value::String(s) if s.trim().is_empty() => Value::Null,
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other.clone(),
    }
}

pub fn add_to_inventory() -> WriteStatement {
    WriteStatement {
        id: "user_inventory.add",
        sql: "INSERT INTO user_inventory (set_num, quantity, build_status, display_location, notes, date_acquired) \
              VALUES ($1, $2, $3, $4, $5, CURRENT_DATE)",
        params: vec![
            ParamSpec::required("set_num", ValueKind::Text),
            ParamSpec::required("quantity", ValueKind::Integer),
            ParamSpec::optional("build_status", ValueKind::Text),
            ParamSpec::optional("display_location", ValueKind::Text),
            ParamSpec::optional("notes", ValueKind::Text),
        ],
    }
}

pub fn remove_from_inventory() -> WriteStatement {
    WriteStatement {
        id: "user_inventory.remove",
        sql: "DELETE FROM user_inventory WHERE id = $1",
        params: vec![ParamSpec::required("id", ValueKind::Integer)],
    }
}

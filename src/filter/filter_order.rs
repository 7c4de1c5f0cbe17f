use super::error::FilterError;
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    /// Parse `"col [asc|desc] [nulls last], ..."` into ordering terms.
    pub fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            let column = tokens[0];
            validate_column(column)?;

            let mut sort = SortDirection::Asc;
            let mut nulls_last = false;
            let mut rest = tokens[1..].iter().map(|t| t.to_ascii_lowercase());
            while let Some(token) = rest.next() {
                match token.as_str() {
                    "asc" => sort = SortDirection::Asc,
                    "desc" => sort = SortDirection::Desc,
                    "nulls" => match rest.next().as_deref() {
                        Some("last") => nulls_last = true,
                        Some("first") => nulls_last = false,
                        _ => return Err(FilterError::InvalidColumn(format!("bad NULLS clause in {:?}", trimmed))),
                    },
                    _ => return Err(FilterError::InvalidColumn(format!("unexpected token in {:?}", trimmed))),
                }
            }

            out.push(FilterOrderInfo {
                column: column.to_string(),
                sort,
                nulls_last,
            });
        }
        Ok(out)
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        if infos.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| {
                let nulls = if i.nulls_last { " NULLS LAST" } else { "" };
                format!("{} {}{}", i.column, i.sort.to_sql(), nulls)
            })
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}

/// Accepts `column` or `alias.column`, each segment `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_column(column: &str) -> Result<(), FilterError> {
    let valid_segment = |seg: &str| {
        let mut chars = seg.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
            _ => false,
        }
    };
    let segments: Vec<&str> = column.split('.').collect();
    if segments.len() > 2 || !segments.iter().all(|s| valid_segment(s)) {
        return Err(FilterError::InvalidColumn(format!("Invalid column name format: {}", column)));
    }
    Ok(())
}

use serde::Serialize;
use serde_json::Value;

use super::error::FilterError;
use super::filter_order::{validate_column, FilterOrder};
use super::filter_where::FilterWhere;
use super::types::{FilterSet, FilterSpec, PageQueries, PageRequest, SqlResult};

/// A named, pre-joined query shape that listings are built against.
#[derive(Debug, Clone, Serialize)]
pub struct EntityView {
    pub name: &'static str,
    /// Select list, e.g. `ls.*, lt.name AS theme_name`.
    pub projection: &'static str,
    /// FROM target including joins.
    pub source: &'static str,
    pub group_by: Option<&'static str>,
    /// Must end in a unique key so pages are stable.
    pub default_order: &'static str,
    pub filters: Vec<FilterSpec>,
}

impl EntityView {
    pub fn new(name: &'static str, projection: &'static str, source: &'static str, default_order: &'static str) -> Self {
        Self {
            name,
            projection,
            source,
            group_by: None,
            default_order,
            filters: vec![],
        }
    }

    pub fn group_by(mut self, columns: &'static str) -> Self {
        self.group_by = Some(columns);
        self
    }

    pub fn filter(mut self, spec: FilterSpec) -> Self {
        self.filters.push(spec);
        self
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        FilterOrder::parse_order_string(self.default_order)?;
        for (i, spec) in self.filters.iter().enumerate() {
            if self.filters[..i].iter().any(|s| s.name == spec.name) {
                return Err(FilterError::DuplicateFilter(spec.name.to_string()));
            }
            if spec.columns.is_empty() {
                return Err(FilterError::InvalidColumn(format!("filter {} has no columns", spec.name)));
            }
            for column in &spec.columns {
                validate_column(column)?;
            }
        }
        Ok(())
    }
}

/// Builds count and page queries for an [`EntityView`].
pub struct Filter;

impl Filter {
    /// The WHERE fragment is generated once and shared by both queries, so
    /// their predicate text and leading parameters are identical.
    pub fn build(view: &EntityView, filters: &FilterSet, page: PageRequest) -> Result<PageQueries, FilterError> {
        let predicate = FilterWhere::generate(view.name, &view.filters, filters)?;
        let order = FilterOrder::parse_order_string(view.default_order)?;

        let where_clause = if predicate.query.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", predicate.query)
        };
        let group_clause = view.group_by.map(|g| format!("GROUP BY {}", g)).unwrap_or_default();

        let count_query = match view.group_by {
            None => join_clauses(&[
                "SELECT COUNT(*) AS count".to_string(),
                format!("FROM {}", view.source),
                where_clause.clone(),
            ]),
            Some(_) => format!(
                "SELECT COUNT(*) AS count FROM ({}) AS grouped",
                join_clauses(&[
                    "SELECT 1".to_string(),
                    format!("FROM {}", view.source),
                    where_clause.clone(),
                    group_clause.clone(),
                ])
            ),
        };

        let limit_index = predicate.params.len() + 1;
        let page_query = join_clauses(&[
            format!("SELECT {}", view.projection),
            format!("FROM {}", view.source),
            where_clause,
            group_clause,
            FilterOrder::generate(&order),
            format!("LIMIT ${} OFFSET ${}", limit_index, limit_index + 1),
        ]);

        let mut page_params = predicate.params.clone();
        page_params.push(Value::from(page.limit()));
        page_params.push(Value::from(page.offset()));

        Ok(PageQueries {
            count: SqlResult {
                query: count_query,
                params: predicate.params,
            },
            page: SqlResult {
                query: page_query,
                params: page_params,
            },
        })
    }
}

fn join_clauses(clauses: &[String]) -> String {
    clauses
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

//! Registry of entity views and write statements callers may address by name.

pub mod statements;
pub mod views;

use once_cell::sync::Lazy;
use std::sync::Arc;

use crate::filter::{EntityView, FilterError};

pub use statements::{ParamSpec, StatementError, WriteStatement};

static LEGO_CATALOG: Lazy<Arc<Catalog>> = Lazy::new(|| {
    Arc::new(
        Catalog::new()
            .with_view(views::sets())
            .with_view(views::parts())
            .with_view(views::inventory_parts())
            .with_view(views::user_inventory())
            .with_view(views::colors())
            .with_view(views::popular_themes())
            .with_view(views::themes())
            .with_view(views::part_categories())
            .with_statement(statements::add_to_inventory())
            .with_statement(statements::remove_from_inventory()),
    )
});

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    views: Vec<EntityView>,
    statements: Vec<WriteStatement>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in LEGO collection catalog.
    pub fn lego() -> Arc<Catalog> {
        LEGO_CATALOG.clone()
    }

    /// Later registrations replace earlier ones with the same name.
    pub fn with_view(mut self, view: EntityView) -> Self {
        self.views.retain(|v| v.name != view.name);
        self.views.push(view);
        self
    }

    pub fn with_statement(mut self, statement: WriteStatement) -> Self {
        self.statements.retain(|s| s.id != statement.id);
        self.statements.push(statement);
        self
    }

    pub fn view(&self, name: &str) -> Result<&EntityView, FilterError> {
        self.views
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| FilterError::UnknownView(name.to_string()))
    }

    pub fn statement(&self, id: &str) -> Result<&WriteStatement, StatementError> {
        self.statements
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| StatementError::UnknownStatement(id.to_string()))
    }

    pub fn views(&self) -> &[EntityView] {
        &self.views
    }

    pub fn statements(&self) -> &[WriteStatement] {
        &self.statements
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        self.views.iter().try_for_each(|v| v.validate())
    }
}

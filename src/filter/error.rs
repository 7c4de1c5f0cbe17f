use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Unknown entity view: {0}")]
    UnknownView(String),

    #[error("View {view} has no filter named {filter:?}")]
    UnknownFilter { view: String, filter: String },

    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    #[error("Invalid value for filter {filter}: {value:?} ({reason})")]
    InvalidValue {
        filter: String,
        value: String,
        reason: String,
    },

    #[error("Invalid page request: {0}")]
    InvalidPage(String),

    #[error("Filter {0} declared more than once")]
    DuplicateFilter(String),
}

pub mod catalog;
pub mod cli;
pub mod config;
pub mod credential;
pub mod database;
pub mod error;
pub mod filter;
pub mod services;

#[cfg(test)]
pub mod testing;

pub use error::{DataAccessError, DataAccessErrorKind};
pub use services::{DataAccess, PageResult};

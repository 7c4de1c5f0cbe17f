pub mod collection;
pub mod diagnose;
pub mod list;
pub mod summary;
pub mod views;

pub mod classify;
pub mod error;
pub mod factory;
pub mod session;

pub use error::{AuthRejection, ConnectionError, QueryError};
pub use factory::{retry_transport, ConnectionFactory, PgConnectionFactory};
pub use session::{PgSession, Record, Session};

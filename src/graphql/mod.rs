pub mod executor;
pub mod value;

pub use executor::{HttpQueryExecutor, QueryError, QueryRunner, RemoteQuery};
pub use value::Variables;

/// Cheap round trip used at startup to check the endpoint is reachable.
pub const SCHEMA_PING: &str = "query { __schema { queryType { name } } }";

//! Database layer: pool, queries, and the Postgres-backed collaborator store.

mod pool;
mod repositories;
mod store;

pub use pool::{create_lazy_pool, create_pool, DbPool};
pub use repositories::*;
pub use store::PgStore;

pub mod pool;
pub mod tags;

pub use pool::{create_pool, run_migrations};

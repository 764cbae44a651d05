pub mod migrator;
mod pg_alerts;
mod pool;

pub use pg_alerts::PgAlertStore;
pub use pool::create_pool;

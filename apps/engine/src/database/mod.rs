/// Check store - persistence for services, the check log and alerts.
///
/// The engine only talks to the [`CheckStore`] trait. [`LibsqlStore`] is the
/// libsql-backed implementation used by the binaries and tests.

pub mod error;
pub mod migrations;
pub mod models;
pub mod repository;

pub use error::StoreError;
pub use repository::{CheckStore, LibsqlStore, ROW_RETURN_CAP};

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> anyhow::Result<()> {
    migrations::run_migrations(conn).await
}

/// PostgreSQL persistence for run records.
///
/// This module provides `PostgresRunStore`, a PostgreSQL-backed
/// implementation of the [`RunStore`](crate::store::RunStore) trait.
pub mod postgres;

pub use postgres::PostgresRunStore;

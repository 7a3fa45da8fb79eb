//! Connection pooling for sqlshift.
//!
//! This crate provides a thread-safe connection pool built on a mutex and
//! a condition variable, plus a handler that keeps one pool per logical
//! connection name.
//!
//! - [`ConnectionPool`]: bounded checkout/checkin with timeout, health
//!   checks on checkout, and an optional background reaper
//! - [`PooledConnection`]: RAII guard that checks the connection back in
//! - [`ConnectionHandler`]: name -> pool registry; replacing a pool closes
//!   the old one first
//! - [`AdapterRegistry`]: adapter name -> connection opener
//!
//! ```rust,ignore
//! use sqlshift_pool::{ConnectionPool, PoolConfig};
//!
//! let pool = ConnectionPool::new("primary", PoolConfig::new(5), || open_connection())?;
//! pool.with_connection(|conn| {
//!     conn.execute_batch("CREATE TABLE t (id INTEGER)")
//! })?;
//! ```

pub mod config;
pub mod handler;
pub mod pool;
mod reaper;

#[cfg(test)]
mod testing;

pub use config::{PoolConfig, PoolStats};
pub use handler::{AdapterFn, AdapterRegistry, ConnectionHandler};
pub use pool::{ConnectionFactory, ConnectionPool, PooledConnection};

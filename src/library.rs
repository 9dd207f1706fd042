//! Catalog, rental ledger, favorites and reading progress.
//!
//! Every operation here is a short sequence of storage calls on
//! [`Database`](crate::db::Database); handlers and the CLI call into these
//! functions rather than touching the store directly.

/// Catalog search and book registration.
pub mod catalog;
/// Reader content resolution.
pub mod content;
/// Favorite toggling.
pub mod favorite;
/// Reading progress updates.
pub mod progress;
/// Rental creation and pricing.
pub mod rental;

pub use catalog::{CatalogQuery, NewBook};
pub use favorite::Toggle;
pub use rental::RentalTerms;

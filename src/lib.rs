//! bookly: a book rental web application.
//!
//! Readers register, browse a catalog, rent books for a day or a month,
//! read them in the browser and pick up where they left off.
//!
//! # Features
//!
//! - Email/password accounts with cookie sessions
//! - Catalog search by title or author, genre filter
//! - Daily and monthly rentals with fixed expiry and price
//! - Per-rental reading progress
//! - Favorites
//! - CLI for account and catalog management

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and user management.
pub mod auth;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Catalog, rentals, favorites and progress.
pub mod library;
/// HTTP server.
pub mod server;


pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;

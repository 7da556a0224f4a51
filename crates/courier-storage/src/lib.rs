// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for Courier.
//!
//! WAL-mode SQLite with embedded refinery migrations and a single-writer
//! connection via `tokio-rusqlite`. [`SqliteStore`] implements the
//! repository traits from `courier-core` on top of the typed queries.

pub mod database;
pub mod migrations;
pub mod queries;
pub mod store;

pub use database::Database;
pub use store::SqliteStore;

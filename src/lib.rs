//! # collector
//!
//! A concurrent command engine over an indexed record store.
//!
//! Command lines are wrapped into tasks and executed by a fixed-size worker
//! pool against one shared, lock-guarded [`storage::CollectionStore`].
//! Entries are soft-deleted, never erased, and the whole store persists to
//! a compact little-endian binary file.

pub mod codec;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod model;
pub mod output;
pub mod storage;
pub mod telemetry;

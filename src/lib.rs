//! Task hierarchy engine library
//!
//! Closure-table subtasks, acyclic task dependencies and calendar activity
//! statistics over a SQLite store.

pub mod activity;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod notify;
pub mod types;

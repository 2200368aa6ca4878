//! Full-page HTTP response cache.
//!
//! The [`cache`] module holds the cache itself; the remaining modules host a
//! small demo site behind it.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
pub mod presentation;

//! Remote functions for the Reflect mobile app, served against an LMS
//! database.
//!
//! Requests enter through [`routes`], are authenticated by web service token
//! and dispatched to the functions in [`external`]. Those read and write LMS
//! records through the [`lms::Lms`] trait.

pub mod access;
pub mod allowlist;
pub mod config;
pub mod db;
pub mod error;
pub mod external;
pub mod form;
pub mod lms;
pub mod models;
pub mod routes;
pub mod schema;
pub mod settings;

//! Incident intake backend for emergency-call reception and dispatch consoles.
//!
//! Incidents are kept in a pluggable [`state::KeyValueStore`] (in-memory, sled
//! or Redis). [`repository::IncidentRepository`] owns the records and the
//! active-incidents index; [`api`] exposes them over HTTP with a uniform
//! `{ success, data?, error? }` envelope; [`client`] talks to that API.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod state;

pub use error::{AppError, Result};

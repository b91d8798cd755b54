//! EchoMe web tier.
//!
//! Accepts voice and product-ingestion jobs from signed-in users, records
//! them in Postgres and hands their ids to the Redis queues the workers
//! consume. Also serves job status, extracted audio, a speech synthesis
//! passthrough and the polling dashboard.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod tracker;

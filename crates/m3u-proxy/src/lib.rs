//! IPTV aggregation and proxy service library: ingest (C2), the rule
//! engine (C3), the generator pipeline (C4), the publisher (C5), the
//! stream gateway (C6), the progress bus (C7), the scheduler (C8), and the
//! thin Axum web layer wiring them together.

pub mod config;
pub mod errors;
pub mod gateway;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod publish;
pub mod repositories;
pub mod rules;
pub mod scheduler;
pub mod services;
pub mod utils;
pub mod web;

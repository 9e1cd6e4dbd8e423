//! # framehub-receiver: Consumer Node
//!
//! Accepts frames from any number of framehub senders, measures
//! per-sender latency and frame rate, and prints a final report when
//! interrupted.

pub mod config;
pub mod service;

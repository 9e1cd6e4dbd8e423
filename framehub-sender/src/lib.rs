//! # framehub-sender: Producer Node
//!
//! Captures frames (a synthetic test pattern or a directory of image
//! files), stamps each with this node's identity and the current wall
//! clock, and streams them to a framehub receiver.
//!
//! The identity defaults to the host name, so several senders can feed
//! one receiver without extra configuration.

pub mod config;
pub mod service;

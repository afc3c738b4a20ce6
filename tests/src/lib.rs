//! # State Bus Test Suite
//!
//! Cross-component scenarios over real loopback TCP.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/   # Publisher → transport → hub scenarios
//! │   ├── fixtures.rs    # Registries, polling helpers
//! │   ├── scenarios.rs   # Delivery, staleness, isolation, shutdown
//! │   └── registry_file.rs
//! └── benches/           # Codec and delivery latency
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p state-bus-tests
//! cargo bench -p state-bus-tests
//! ```
//!
//! Every scenario binds its own fixed loopback port, so they can run in
//! parallel.

#![allow(dead_code)]

pub mod integration;

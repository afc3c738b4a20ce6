//! # Integration Scenarios
//!
//! Publisher, transport and subscriber hub wired together the way a
//! deployment runs them.

pub mod fixtures;
pub mod registry_file;
pub mod scenarios;

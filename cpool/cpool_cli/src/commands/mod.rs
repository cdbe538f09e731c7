//! Harness commands

pub mod config;
pub mod run;

//! # frb
//!
//! Command-line front end of the FRB follow-up status engine.
//!
//! - `cli`: clap command tree and command implementations
//! - `config`: TOML seeding of sample criteria and follow-up resources

pub mod cli;
pub mod config;

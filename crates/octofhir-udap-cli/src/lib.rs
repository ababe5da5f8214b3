//! `udap` command line client.

pub mod cli;
pub mod commands;
pub mod config;
pub mod keys;
pub mod observability;
pub mod output;

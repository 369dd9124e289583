//! CLI module - command-line interface
//!
//! Command handlers for the `planexec` binary.

pub mod commands;

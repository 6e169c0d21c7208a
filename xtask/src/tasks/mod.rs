//! Task implementations for the xtask CLI.

pub mod boundary;

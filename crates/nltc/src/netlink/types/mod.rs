//! Kernel ABI structures and constants.

pub mod link;
pub mod tc;

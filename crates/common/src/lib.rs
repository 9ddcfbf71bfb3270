//! Shared service plumbing.

pub mod logging;

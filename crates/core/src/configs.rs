//! Configuration file parsing

pub mod targets;

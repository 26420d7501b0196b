//! Small helpers shared by the sync workspace crates.

pub mod env;

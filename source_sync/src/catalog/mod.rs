//! Source catalog subsystem.
//!
//! Source configs can be declared in a TOML catalog and synchronized into the source
//! repository. See [`crate::catalog::config`] for the TOML model and normalization, and
//! [`crate::catalog::sync`] for diffing and applying it.

pub mod config;
pub mod sync;

//! # Tempo Utils
//!
//! Small shared primitives used by every crate in the workspace.

pub mod locks;
pub mod time;

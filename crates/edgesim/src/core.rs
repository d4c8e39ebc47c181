//! Core edgesim data structures and routines. The most common entry point is
//! building a [`Spec`](edgesim_core::Spec) and validating it into a
//! [`World`](edgesim_core::World).

pub use edgesim_core::*;

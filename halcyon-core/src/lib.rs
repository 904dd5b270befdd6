//! Shared primitives for the Halcyon MCMC engine.
//!
//! `halcyon-core` provides the foundation the engine crates build on:
//!
//! - **Error types** — [`HalcyonError`] and [`Result`] for structured error handling
//! - **Traits** — Small shared abstractions like [`Summarizable`]

pub mod error;
pub mod traits;

pub use error::{HalcyonError, Result};
pub use traits::Summarizable;

//! Small shared traits for the Halcyon crates.

/// A type that can describe itself in one line.
pub trait Summarizable {
    /// A one-line summary suitable for display.
    fn summary(&self) -> String;
}

#![forbid(unsafe_code)]

//! Error types for the dispatch engine.
//!
//! There are exactly two recoverable failures in this crate. Everything
//! else a slot body can do wrong is a panic and propagates to the dispatch
//! caller unchanged.

/// A tracked dependency of a slot has been destroyed.
///
/// Surfaces from [`Slot::lock_tracked`](crate::slot::Slot::lock_tracked)
/// and from weak-bound callables invoked after their target dropped.
/// Dispatch never reports it: the iterator treats an expired record as
/// "skip, and lazily disconnect".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredError;

impl std::fmt::Display for ExpiredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tracked dependency of the slot has been destroyed")
    }
}

impl std::error::Error for ExpiredError {}

/// No slot produced a value for a value-returning combiner.
///
/// Raised by [`LastValue`](crate::combiner::LastValue) when the signal has
/// zero connections, or every connection was blocked or expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoSlotsError;

impl std::fmt::Display for NoSlotsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no slot produced a value for the dispatch")
    }
}

impl std::error::Error for NoSlotsError {}

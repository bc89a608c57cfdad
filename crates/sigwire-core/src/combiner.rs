#![forbid(unsafe_code)]

//! Combiners: user reductions over the sequence of slot results.
//!
//! A combiner is invoked once per dispatch with the lazy result iterator;
//! slots run only as the combiner pulls values, so a combiner that stops
//! reading early simply never invokes the records beyond that point.

use std::marker::PhantomData;

use crate::error::NoSlotsError;

/// Reduction over the values produced by one dispatch pass.
pub trait Combiner<R>: Send + Sync + 'static {
    /// What [`invoke`](crate::signal::SignalCore::invoke) returns.
    type Output;

    /// Fold the (lazy) result sequence into the dispatch result.
    fn combine<I>(&self, results: I) -> Self::Output
    where
        I: Iterator<Item = R>;
}

/// Keeps the last produced value; yields `None` when no slot produced one.
///
/// This is the default combiner.
pub struct OptionalLastValue<R> {
    _marker: PhantomData<fn() -> R>,
}

impl<R> Default for OptionalLastValue<R> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<R> Clone for OptionalLastValue<R> {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl<R> std::fmt::Debug for OptionalLastValue<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OptionalLastValue")
    }
}

impl<R: 'static> Combiner<R> for OptionalLastValue<R> {
    type Output = Option<R>;

    fn combine<I>(&self, results: I) -> Self::Output
    where
        I: Iterator<Item = R>,
    {
        results.last()
    }
}

/// Keeps the last produced value; fails with [`NoSlotsError`] when the
/// signal had nothing to deliver to (zero connections, or every connection
/// blocked or expired).
pub struct LastValue<R> {
    _marker: PhantomData<fn() -> R>,
}

impl<R> Default for LastValue<R> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<R> Clone for LastValue<R> {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl<R> std::fmt::Debug for LastValue<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LastValue")
    }
}

impl<R: 'static> Combiner<R> for LastValue<R> {
    type Output = Result<R, NoSlotsError>;

    fn combine<I>(&self, results: I) -> Self::Output
    where
        I: Iterator<Item = R>,
    {
        results.last().ok_or(NoSlotsError)
    }
}

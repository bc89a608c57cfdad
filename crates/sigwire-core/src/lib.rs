#![forbid(unsafe_code)]

//! Core: connection lifecycle and dispatch machinery for sigwire signals.
//!
//! # Role in sigwire
//! `sigwire-core` is the engine. It owns the connection record state
//! machine, the grouped/ordered connection list, the copy-on-write
//! invocation snapshot, the lazy slot-calling iterator, and the
//! incremental garbage collector. The `sigwire` crate wraps this in the
//! caller-facing `Signal` handle.
//!
//! # Primary responsibilities
//! - **SignalCore**: connect/disconnect/dispatch orchestration under the
//!   clone-on-write snapshot discipline.
//! - **ConnectionRecord / ConnectionHandle**: per-registration state and
//!   its weak caller-facing identity.
//! - **Slot**: the adapted callable with its tracked weak dependencies.
//! - **DispatchIterator**: lazy delivery that skips blocked, disconnected,
//!   and expired registrations.
//! - **Garbage collection**: amortized physical removal of disconnected
//!   records, tuned by `SweepPolicy`.
//!
//! # How it fits in the system
//! Everything here is synchronous and thread-safe: any thread may connect,
//! disconnect, or dispatch concurrently, including from inside a running
//! slot. No lock is ever held across a slot call.

pub mod combiner;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod gc;
pub mod group;
pub mod list;
pub mod record;
pub mod signal;
pub mod slot;
pub mod snapshot;

pub use combiner::{Combiner, LastValue, OptionalLastValue};
pub use connection::{BlockGuard, ConnectionHandle, ScopedConnection};
pub use error::{ExpiredError, NoSlotsError};
pub use gc::SweepPolicy;
pub use group::{ConnectPosition, GroupKey};
pub use signal::SignalCore;
pub use slot::{ExtendedSlot, Slot, SlotId, SlotResult, Trackable};

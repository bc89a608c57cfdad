#![forbid(unsafe_code)]

//! Thread-safe signal/slot dispatch with deterministic ordering, grouped
//! connections, and automatic lifetime tracking.
//!
//! # Role in sigwire
//! This crate is the caller-facing surface over the `sigwire-core` engine:
//! the shared [`Signal`] handle, slot construction, combiners, and
//! connection management. The hard parts (the copy-on-write snapshot,
//! the lazy dispatch iterator, and the incremental garbage collector)
//! live in the core crate.
//!
//! # Overview
//!
//! A [`Signal`] delivers one argument tuple to every connected [`Slot`]
//! and reduces the slot results with a [`Combiner`]:
//!
//! ```
//! use sigwire::prelude::*;
//!
//! let hello: Signal<(i32, i32), i32> = Signal::new();
//! hello.connect(Slot::new(|(a, b): &(i32, i32)| a + b), ConnectPosition::Back);
//! assert_eq!(hello.invoke(&(2, 3)), Some(5));
//! ```
//!
//! Connections are ordered (front-ungrouped, then groups in key order,
//! then back-ungrouped) and stay valid while a dispatch is running:
//! disconnects are lazy, handled by an incremental garbage collector, so
//! in-flight passes never observe a half-mutated list.
//!
//! Slots can track the objects they depend on; a tracked object dropping
//! expires the slot instead of leaving a dangling callback:
//!
//! ```
//! use std::sync::Arc;
//! use sigwire::prelude::*;
//!
//! let renderer = Arc::new(String::from("renderer"));
//! let repaint: Signal<u32> = Signal::new();
//! repaint.connect(
//!     Slot::bound(&renderer, |renderer, frame: &u32| {
//!         let _ = (renderer, frame);
//!     }),
//!     ConnectPosition::Back,
//! );
//!
//! assert_eq!(repaint.num_slots(), 1);
//! drop(renderer);
//! let _ = repaint.invoke(&1); // expired slot is skipped and disconnected
//! assert_eq!(repaint.num_slots(), 0);
//! ```

pub mod signal;

pub use signal::Signal;

pub use sigwire_core::combiner::{Combiner, LastValue, OptionalLastValue};
pub use sigwire_core::connection::{BlockGuard, ConnectionHandle, ScopedConnection};
pub use sigwire_core::error::{ExpiredError, NoSlotsError};
pub use sigwire_core::gc::SweepPolicy;
pub use sigwire_core::group::{ConnectPosition, GroupKey};
pub use sigwire_core::slot::{ExtendedSlot, Slot, SlotId, SlotResult, Trackable};

/// The common surface in one import.
pub mod prelude {
    pub use crate::Signal;
    pub use sigwire_core::combiner::{Combiner, LastValue, OptionalLastValue};
    pub use sigwire_core::connection::{BlockGuard, ConnectionHandle, ScopedConnection};
    pub use sigwire_core::error::{ExpiredError, NoSlotsError};
    pub use sigwire_core::group::ConnectPosition;
    pub use sigwire_core::slot::{ExtendedSlot, Slot, SlotId, Trackable};
}

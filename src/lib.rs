//! rxflow: a push-based reactive stream engine.
//!
//! The engine is built around four contracts:
//!
//! * [`observable::Observable`] — a cold descriptor of how to produce a
//!   sequence of values followed by at most one terminal event.
//! * [`observer::Observer`] — the consumer endpoint; terminal methods
//!   consume the observer, so the protocol's "nothing after terminal"
//!   rule is mostly enforced by the type system.
//! * [`subscription::Subscription`] — the cancellation handle returned by
//!   every subscribe, with idempotent, race-safe teardown.
//! * [`context::Ctx`] — a Go-style cancellation context threaded through
//!   each subscribe call, carrying values, deadlines and cancel signals
//!   from the subscriber toward the source.
//!
//! Hot multicasting lives in [`subject`], reference-counted sharing in
//! the `share`/`share_replay` operators, and thread handoff in
//! `observe_on`/`subscribe_on`, whose bounded queues block the producer
//! when full — backpressure by blocking is the engine's only flow
//! control.
//!
//! ```
//! use rxflow::prelude::*;
//!
//! let mut evens = vec![];
//! from_iter(1..=6).subscribe(|v| {
//!   if v % 2 == 0 {
//!     evens.push(v);
//!   }
//! });
//! assert_eq!(evens, vec![2, 4, 6]);
//! ```

pub mod context;
pub mod emission;
pub mod observable;
pub mod observer;
pub mod ops;
pub mod prelude;
pub mod rc;
pub(crate) mod scheduler;
pub mod subject;
pub mod subscription;

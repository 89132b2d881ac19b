//! Auth state transitions and their delivery.
//!
//! # Key items
//!
//! - [`reconcile`]: turns a prior snapshot and a probe result into one
//!   [`Reconciliation`]: a `TransitionEvent` plus a [`StoreWrite`]
//! - [`SubscriberRegistry`]: hands each event to every interested
//!   widget, isolating them from each other's panics
//!
//! Both are synchronous and free of I/O; the core crate wires them to the
//! prober and the store.

mod reconciler;
mod registry;

pub use reconciler::{Reconciliation, StoreWrite, reconcile};
pub use registry::{SubscriberRegistry, Subscription, SubscriptionId, TransitionHandler};

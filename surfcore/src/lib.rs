//! Runtime of the control-surface property engine.
//!
//! Entities ([`base::inspectable::InspectableWithProps`]) own property trees
//! from `surfprop` and are reachable through an injectable identifier registry
//! held by a [`base::SurfaceContext`]. Any leaf may switch to expression mode;
//! its [`expr::Expression`] reads other properties, remote parameter servers
//! and the ambient URL, keeps its remote subscriptions in step through the
//! deferred [`sched::Scheduler`], and heals references to renamed entities.
//! [`binding::PropertyBinding`] wires a single property to a single remote
//! address without any expression text.

pub mod base;
pub mod binding;
pub mod expr;
pub mod magic;
pub mod sched;
#[cfg(any(test, feature = "test-utils"))]
pub mod tests_utils;
pub mod utils;

pub extern crate surfprop;

//! Adapter utilities for the `tree-virtualizer` crate.
//!
//! The `tree-virtualizer` crate is UI-agnostic and only mirrors a source it is told about. This
//! crate provides small, framework-neutral pieces commonly needed around it:
//!
//! - [`TreeStore`]: an in-memory keyed tree that reports its own mutations to a reflector
//! - [`Controller`]: viewport/scroll forwarding, paging and cursor navigation
//! - Scroll anchoring (keep the row on screen in place across structural changes)
//!
//! This crate is intentionally framework-agnostic (no ratatui/egui bindings).
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod anchor;
mod controller;
mod error;
mod store;


pub use anchor::{ScrollAnchor, apply_anchor, capture_first_visible_anchor};
pub use controller::Controller;
pub use error::{StoreError, StoreResult};
pub use store::TreeStore;

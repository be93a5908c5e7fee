//! Root protection for native handles.
//!
//! The native runtime garbage-collects its own heap and has no knowledge of
//! host-side references. Every native object the host still needs must sit
//! in a root slot the native collector can see; everything else is fair game
//! for collection at any moment.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RootStack                                                  │
//! │  ├── Mutex-protected array of RawValue slots                │
//! │  ├── mark/push/release with LIFO discipline                 │
//! │  └── Doubling growth up to a hard capacity                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RootManager                                                │
//! │  ├── Fail-safe adapter: no-ops after close()                │
//! │  ├── Active-mark bookkeeping (nesting enforcement)          │
//! │  └── Drains deferred clears before every operation          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  EscapeRegistry + DeferredClearQueue                        │
//! │  ├── registration id ↔ slot index, both directions          │
//! │  ├── EscapeGuard (RAII): wrapper drop → queue a clear       │
//! │  └── Explicit release unregisters, so a stale guard can     │
//! │      never clear a reused slot                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Slot indices are reused after release. The one invariant everything else
//! leans on: whenever a slot is released through the explicit path, any
//! pending escape registration for that index is invalidated first.

mod manager;
mod registry;
mod stack;

pub use manager::RootManager;
pub use stack::{RootStack, DEFAULT_MAX_ROOTS};

pub(crate) use registry::EscapeGuard;

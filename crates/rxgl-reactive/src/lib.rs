#![forbid(unsafe_code)]

//! Reactive primitives shared by the runtime and the scene graph.
//!
//! - [`Atom`]: a mutable cell with subscribers, per-program render fan-out and
//!   before-draw hooks.
//! - [`Registry`]: a memoizing key → `{value, dirty}` cache.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`); GL contexts are not `Send` either.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod atom;
pub mod listeners;
pub mod registry;

pub use atom::{Atom, AtomId, BindFlow, BindingKey, RenderRequest, SetFlags, WeakAtom};
pub use listeners::{ListenerKey, Listeners, Subscription};
pub use registry::{Record, Registry};

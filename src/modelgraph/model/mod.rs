//! # Models
//!
//! A [`ModelClass`] is declared once through a [`ClassBuilder`] and shared by
//! every instance. A [`Model`] is a cheap, clonable handle to one instance;
//! clones share the same state and compare identical under
//! [`Model::ptr_eq`].
//!
//! Instance state lives behind `RefCell`s since models are single-threaded.
//! No borrow is ever held while user code (defaults, normalizers, performers,
//! validators) or a child's lifecycle runs.
//!
//! ## Lifecycle
//!
//! ```text
//! new ──save──► persisted ──destroy──► destroyed
//!  ▲                                        │
//!  └──────── re-added to a collection ◄─────┘
//! ```
//!
//! `instantiate` starts an instance as persisted. Embedded children have no
//! performers of their own: their saves and destroys are redirected to the
//! owning association, which writes into the owner's backing attribute.

mod access;
mod class;
mod dirty;
mod instance;
mod lifecycle;

pub use class::{ClassBuilder, Method, ModelClass, Performer};
pub use instance::Model;
pub(crate) use instance::{Embedding, ModelInner};
pub(crate) use lifecycle::Operation;

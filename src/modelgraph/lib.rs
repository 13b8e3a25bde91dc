//! # Modelgraph Architecture
//!
//! Modelgraph lets plain in-process objects declare typed attributes, trees of
//! embedded and referenced children, validation rules and persistence hooks,
//! without a backing relational schema. Storage is never assumed: embedded
//! children serialize into an attribute of their owner, referenced children
//! go through an [`Adapter`] supplied by the application.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Nested Attributes (nested.rs) + Validation (validations/)  │
//! │  - Drive associations in bulk from flat parameter maps      │
//! │  - Fold child errors into dotted keys on the owner          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Association Runtime (associations/)                        │
//! │  - EmbedsOne / EmbedsMany: children stored in the owner     │
//! │  - ReferencesOne / ReferencesMany: keys stored in the owner │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Model Instance (model/)                                    │
//! │  - Attribute cells, dirty tracking, save / destroy          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Attribute Reflection (attributes/) + Typecast (typecast/)  │
//! │  - Declared names, types, defaults, enums, normalizers      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Declaring a class
//!
//! Classes are built once and shared through `Rc`:
//!
//! ```ignore
//! let part = ModelClass::builder("Part")
//!     .attribute(AttributeReflection::new("name", Type::String))
//!     .validates("name", Validator::Presence)
//!     .build()?;
//! let machine = ModelClass::builder("Machine")
//!     .embeds_many("parts", &part)
//!     .accepts_nested_attributes_for("parts", NestedAttributesOptions::new())
//!     .define_save(|_| Ok(true))
//!     .build()?;
//! ```
//!
//! ## Threading
//!
//! Model graphs are single-threaded (`Rc` handles, `RefCell` state). Only the
//! typecaster and normalizer registries and the [`config`] are process-wide
//! and guarded by locks.
//!
//! ## Module Overview
//!
//! - [`model`]: Model classes, instances, attribute access, dirty tracking, lifecycle
//! - [`attributes`]: Attribute reflections and per-instance cells
//! - [`associations`]: Embedded and referenced association runtimes
//! - [`nested`]: Nested attribute assignment
//! - [`validations`]: Validators, error collections, error key folding
//! - [`adapter`]: Persistence adapter trait and an in-memory implementation
//! - [`typecast`]: Type descriptors and the typecaster registry
//! - [`normalize`]: Named normalizer registry
//! - [`value`]: Dynamic attribute values
//! - [`config`]: Process-wide settings
//! - [`error`]: Error types

pub mod adapter;
pub mod associations;
pub mod attributes;
pub mod config;
pub mod error;
pub mod model;
pub mod nested;
pub mod normalize;
pub mod typecast;
pub mod validations;
pub mod value;

pub use adapter::{Adapter, MemoryAdapter, Scope};
pub use associations::{Association, AssociationKind, AssociationReflection, Target};
pub use attributes::{AttributeKind, AttributeReflection};
pub use config::Config;
pub use error::{ModelError, Result};
pub use model::{ClassBuilder, Model, ModelClass};
pub use nested::{NestedAttributesOptions, RejectIf};
pub use typecast::Type;
pub use validations::{Errors, Validator};
pub use value::{Dict, Value};

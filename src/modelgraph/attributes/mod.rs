//! # Attribute System
//!
//! Attributes are declared once per model class as [`AttributeReflection`]s
//! and materialize per instance as [`AttributeCell`]s, created lazily on first
//! access.
//!
//! ## Attribute Kinds
//!
//! | Kind | Constructor | Raw value | Read value |
//! |------|-------------|-----------|------------|
//! | `Attribute` | [`AttributeReflection::new`] | anything | coerced scalar |
//! | `Collection` | [`AttributeReflection::collection`] | array (scalars are wrapped) | array of coerced elements |
//! | `Dictionary` | [`AttributeReflection::dictionary`] | dict | dict of coerced values, optionally key-filtered |
//! | `Localized` | [`AttributeReflection::localized`] | dict of locale to value | dict of coerced translations |
//! | `Represents` | [`AttributeReflection::represents`] | local fallback | the referenced object's column |
//! | `Association` | declared by associations | embedded document | the document as stored |
//!
//! ## Read Pipeline
//!
//! ```text
//! raw ──► default (if absent) ──► coerce ──► enum filter ──► normalizers ──► value
//!         └── cached as "before type cast"                               └── cached
//! ```
//!
//! Both caches are dropped together on every write. Writes to a readonly
//! attribute are discarded.

mod cell;
mod reflection;

pub use cell::AttributeCell;
pub use reflection::{
    AttributeKind, AttributeReflection, DefaultValue, Enumeration, NormalizerSpec, Readonly,
};

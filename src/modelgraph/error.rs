use crate::validations::Errors;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("No typecaster registered for type {0}")]
    TypecasterMissing(String),

    #[error("No normalizer registered under the name {0}")]
    NormalizerMissing(String),

    #[error("Expected an instance of {expected}, got {got}")]
    AssociationTypeMismatch { expected: String, got: String },

    #[error("Cannot link {class} through {association}: object is not persisted")]
    AssociationObjectNotPersisted { class: String, association: String },

    #[error("Unable to apply changes of association {association} on {class}")]
    AssociationChangesNotApplied { class: String, association: String },

    #[error("Couldn't find {association} with {primary_key} = {key} on {class}")]
    ObjectNotFound {
        class: String,
        association: String,
        primary_key: String,
        key: String,
    },

    #[error("Maximum {limit} objects are allowed. Got {count} objects instead.")]
    TooManyObjects { limit: usize, count: usize },

    #[error("Undefined attribute {name} on {class}")]
    UndefinedAttribute { class: String, name: String },

    #[error("No primary attribute defined for {class} (needed by {association})")]
    UndefinedPrimaryAttribute { class: String, association: String },

    #[error("Argument error: {0}")]
    Argument(String),

    #[error("Unable to save {0}: no save performer defined")]
    UnsavableObject(String),

    #[error("Unable to destroy {0}: no destroy performer defined")]
    UndestroyableObject(String),

    #[error("{0} was not saved")]
    ObjectNotSaved(String),

    #[error("{0} was not destroyed")]
    ObjectNotDestroyed(String),

    #[error("Validation failed: {}", .0.full_messages().join(", "))]
    Validation(Errors),

    #[error("Association {0} outlived its owner")]
    OwnerReleased(String),

    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;

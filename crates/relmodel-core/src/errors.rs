use relmodel_core_types::{EntityId, InstanceId, PropertyId};
use thiserror::Error;

/// Result type alias using ModelError
pub type Result<T> = std::result::Result<T, ModelError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Stable, structured classification of every error the runtime raises. Each
/// kind maps to a stable error code usable for programmatic handling and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Definition (registry resolution)
    InvalidDefinition,
    NotFound,
    AlreadyExists,
    CycleDetected,
    InheritanceConflict,
    MissingAccessor,
    DuplicateTag,
    MalformedDefault,
    DanglingInverse,
    InvalidExpression,

    // Execution (dispatcher misuse)
    WrongCardinality,
    NotWritable,
    Deleted,
    TypeMismatch,
    OutOfBounds,
    AbstractEntity,
    ReentrantClone,

    // Lifecycle
    Uninitialized,

    // Integrity
    IntegrityViolation,

    // Configuration
    Config,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidDefinition => "ERR_INVALID_DEFINITION",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            ExErrorKind::CycleDetected => "ERR_CYCLE_DETECTED",
            ExErrorKind::InheritanceConflict => "ERR_INHERITANCE_CONFLICT",
            ExErrorKind::MissingAccessor => "ERR_MISSING_ACCESSOR",
            ExErrorKind::DuplicateTag => "ERR_DUPLICATE_TAG",
            ExErrorKind::MalformedDefault => "ERR_MALFORMED_DEFAULT",
            ExErrorKind::DanglingInverse => "ERR_DANGLING_INVERSE",
            ExErrorKind::InvalidExpression => "ERR_INVALID_EXPRESSION",
            ExErrorKind::WrongCardinality => "ERR_WRONG_CARDINALITY",
            ExErrorKind::NotWritable => "ERR_NOT_WRITABLE",
            ExErrorKind::Deleted => "ERR_DELETED",
            ExErrorKind::TypeMismatch => "ERR_TYPE_MISMATCH",
            ExErrorKind::OutOfBounds => "ERR_OUT_OF_BOUNDS",
            ExErrorKind::AbstractEntity => "ERR_ABSTRACT_ENTITY",
            ExErrorKind::ReentrantClone => "ERR_REENTRANT_CLONE",
            ExErrorKind::Uninitialized => "ERR_UNINITIALIZED",
            ExErrorKind::IntegrityViolation => "ERR_INTEGRITY_VIOLATION",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries classification fields for programmatic handling and identifiers
/// of the entity, property and instance involved for debugging.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    property_id: Option<String>,
    instance_id: Option<String>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            property_id: None,
            instance_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add property ID context
    pub fn with_property_id(mut self, id: impl Into<String>) -> Self {
        self.property_id = Some(id.into());
        self
    }

    /// Add instance ID context
    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity ID context, if any
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// Get the property ID context, if any
    pub fn property_id(&self) -> Option<&str> {
        self.property_id.as_deref()
    }

    /// Get the instance ID context, if any
    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(property_id) = &self.property_id {
            write!(f, " (property_id: {})", property_id)?;
        }
        if let Some(instance_id) = &self.instance_id {
            write!(f, " (instance_id: {})", instance_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Broad class of a [`ModelError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Raised only while building or resolving the metamodel
    Definition,
    /// Caller misuse of the dispatcher or lifecycle operations
    Execution,
    /// Property access before the instance initializer completed
    Uninitialized,
    /// Configuration could not be loaded or validated
    Config,
    /// Broken internal invariant (poisoned lock, inconsistent graph)
    Internal,
}

/// Comprehensive error taxonomy for relmodel operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    // ===== Definition Errors =====
    /// Entity id is not declared
    #[error("Unknown entity: {entity}")]
    UnknownEntity { entity: EntityId },

    /// Entity id declared twice
    #[error("Entity declared more than once: {entity}")]
    DuplicateEntity { entity: EntityId },

    /// Property declared twice on one entity
    #[error("Property {property} declared more than once on entity {entity}")]
    DuplicateProperty {
        entity: EntityId,
        property: PropertyId,
    },

    /// Entity inherits from itself, directly or transitively
    #[error("Inheritance cycle through entity {entity}")]
    InheritanceCycle { entity: EntityId },

    /// Two unrelated ancestors define a field differently and the entity does not rule
    #[error("Entity {entity} inherits conflicting '{field}' of {property} via {first}, {second}")]
    InheritanceConflict {
        entity: EntityId,
        property: PropertyId,
        field: &'static str,
        first: EntityId,
        second: EntityId,
    },

    /// No declaration along the lineage gives the property a value type
    #[error("Property {entity}.{property} has no value type")]
    MissingValueType {
        entity: EntityId,
        property: PropertyId,
    },

    /// Cardinality requires an accessor the declaration disables
    #[error("Property {entity}.{property} requires the '{accessor}' accessor")]
    MissingAccessor {
        entity: EntityId,
        property: PropertyId,
        accessor: &'static str,
    },

    /// Two properties of one entity share a serialization tag
    #[error("Serialization tag '{tag}' used by both {entity}.{first} and {entity}.{second}")]
    DuplicateSerializationTag {
        entity: EntityId,
        tag: String,
        first: PropertyId,
        second: PropertyId,
    },

    /// Declared default value cannot be converted
    #[error("Malformed default for {entity}.{property}: {reason}")]
    MalformedDefault {
        entity: EntityId,
        property: PropertyId,
        reason: String,
    },

    /// Inverse names a property the target entity does not have
    #[error("Property {entity}.{property} names inverse {inverse} missing on {target}")]
    DanglingInverse {
        entity: EntityId,
        property: PropertyId,
        inverse: PropertyId,
        target: EntityId,
    },

    /// Inverse pair is not mutual or not entity-typed
    #[error("Inverse of {entity}.{property} does not point back: {reason}")]
    InverseMismatch {
        entity: EntityId,
        property: PropertyId,
        reason: String,
    },

    /// Both sides of a SINGLE/SINGLE inverse pair are declared derived
    #[error("Both {entity}.{property} and its inverse {inverse} are declared derived")]
    AmbiguousDerivation {
        entity: EntityId,
        property: PropertyId,
        inverse: PropertyId,
    },

    /// Clone-after dependencies form a cycle
    #[error("Clone order cycle on {entity} through property {property}")]
    CloneOrderCycle {
        entity: EntityId,
        property: PropertyId,
    },

    /// Property referenced by clone-after or a companion list is not declared
    #[error("Property {entity}.{property} references unknown property {referenced}")]
    UnknownPropertyReference {
        entity: EntityId,
        property: PropertyId,
        referenced: PropertyId,
    },

    /// Embedding rule declared on a property that cannot embed
    #[error("Invalid embedding on {entity}.{property}: {reason}")]
    InvalidEmbedding {
        entity: EntityId,
        property: PropertyId,
        reason: String,
    },

    /// Custom clone expression does not parse
    #[error("Malformed clone expression for {entity}.{property}: {reason}")]
    MalformedExpression {
        entity: EntityId,
        property: PropertyId,
        reason: String,
    },

    /// Cloning strategy is not applicable to the property
    #[error("Invalid clone strategy for {entity}.{property}: {reason}")]
    InvalidCloneStrategy {
        entity: EntityId,
        property: PropertyId,
        reason: String,
    },

    // ===== Execution Errors =====
    /// Instance does not exist in this graph
    #[error("Instance not found: {instance}")]
    InstanceNotFound { instance: InstanceId },

    /// Property is not declared on the instance's entity
    #[error("Unknown property {property} on entity {entity}")]
    UnknownProperty {
        entity: EntityId,
        property: PropertyId,
    },

    /// Operation does not fit the property's cardinality
    #[error("Operation '{op}' is not valid for {cardinality} property {entity}.{property}")]
    WrongCardinality {
        entity: EntityId,
        property: PropertyId,
        op: &'static str,
        cardinality: &'static str,
    },

    /// No writable accessor outside privileged contexts
    #[error("Property {entity}.{property} is not writable through '{op}'")]
    NotWritable {
        entity: EntityId,
        property: PropertyId,
        op: &'static str,
    },

    /// Instance was deleted
    #[error("Instance was deleted: {instance}")]
    InstanceDeleted { instance: InstanceId },

    /// Value does not conform to the declared value type
    #[error("Type mismatch on {entity}.{property}: expected {expected}, found {found}")]
    TypeMismatch {
        entity: EntityId,
        property: PropertyId,
        expected: String,
        found: String,
    },

    /// List index outside the current bounds
    #[error("Index {index} out of bounds for {entity}.{property} (len {len})")]
    IndexOutOfBounds {
        entity: EntityId,
        property: PropertyId,
        index: usize,
        len: usize,
    },

    /// Element is not present in the list
    #[error("Element not present in {entity}.{property}")]
    ElementNotFound {
        entity: EntityId,
        property: PropertyId,
    },

    /// Abstract entities cannot be instantiated
    #[error("Cannot instantiate abstract entity {entity}")]
    AbstractEntity { entity: EntityId },

    /// Merge requires both instances to share one entity
    #[error("Cannot merge {right} into {left}: entity types differ")]
    EntityMismatch { left: EntityId, right: EntityId },

    /// Instance is already being cloned
    #[error("Instance {instance} is already being cloned")]
    CloneInProgress { instance: InstanceId },

    /// Custom clone expression failed at evaluation time
    #[error("Clone expression failed for property {property}: {reason}")]
    ExpressionFailed { property: PropertyId, reason: String },

    // ===== Lifecycle Errors =====
    /// Property access before the initializer completed
    #[error("Instance {instance} accessed before its initializer completed")]
    UninitializedState { instance: InstanceId },

    // ===== Integrity Errors =====
    /// Graph-wide structural check failed
    #[error("Integrity violation on {instance}.{property}: {reason}")]
    IntegrityViolation {
        instance: InstanceId,
        property: PropertyId,
        reason: String,
    },

    // ===== Generic Errors =====
    /// Configuration could not be parsed or is out of range
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ModelError {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            ModelError::UnknownEntity { .. }
            | ModelError::DuplicateEntity { .. }
            | ModelError::DuplicateProperty { .. }
            | ModelError::InheritanceCycle { .. }
            | ModelError::InheritanceConflict { .. }
            | ModelError::MissingValueType { .. }
            | ModelError::MissingAccessor { .. }
            | ModelError::DuplicateSerializationTag { .. }
            | ModelError::MalformedDefault { .. }
            | ModelError::DanglingInverse { .. }
            | ModelError::InverseMismatch { .. }
            | ModelError::AmbiguousDerivation { .. }
            | ModelError::CloneOrderCycle { .. }
            | ModelError::UnknownPropertyReference { .. }
            | ModelError::InvalidEmbedding { .. }
            | ModelError::MalformedExpression { .. }
            | ModelError::InvalidCloneStrategy { .. } => ErrorCategory::Definition,

            ModelError::InstanceNotFound { .. }
            | ModelError::UnknownProperty { .. }
            | ModelError::WrongCardinality { .. }
            | ModelError::NotWritable { .. }
            | ModelError::InstanceDeleted { .. }
            | ModelError::TypeMismatch { .. }
            | ModelError::IndexOutOfBounds { .. }
            | ModelError::ElementNotFound { .. }
            | ModelError::AbstractEntity { .. }
            | ModelError::EntityMismatch { .. }
            | ModelError::CloneInProgress { .. }
            | ModelError::ExpressionFailed { .. } => ErrorCategory::Execution,

            ModelError::UninitializedState { .. } => ErrorCategory::Uninitialized,

            ModelError::Config { .. } => ErrorCategory::Config,

            ModelError::IntegrityViolation { .. } | ModelError::Internal { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    /// True for errors raised during metamodel resolution
    pub fn is_definition_error(&self) -> bool {
        self.category() == ErrorCategory::Definition
    }

    /// True for dispatcher misuse errors
    pub fn is_execution_error(&self) -> bool {
        self.category() == ErrorCategory::Execution
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        ModelError::Internal {
            message: format!("{} lock poisoned", what),
        }
    }
}

/// Conversion from ModelError to the canonical ExError
impl From<ModelError> for ExError {
    fn from(err: ModelError) -> Self {
        let message = err.to_string();
        match err {
            ModelError::UnknownEntity { entity } => ExError::new(ExErrorKind::NotFound)
                .with_entity_id(entity.as_str())
                .with_op("resolve")
                .with_message(message),

            ModelError::DuplicateEntity { entity } => ExError::new(ExErrorKind::AlreadyExists)
                .with_entity_id(entity.as_str())
                .with_op("build_registry")
                .with_message(message),

            ModelError::DuplicateProperty { entity, property } => {
                ExError::new(ExErrorKind::AlreadyExists)
                    .with_entity_id(entity.as_str())
                    .with_property_id(property.as_str())
                    .with_op("resolve")
                    .with_message(message)
            }

            ModelError::InheritanceCycle { entity } => ExError::new(ExErrorKind::CycleDetected)
                .with_entity_id(entity.as_str())
                .with_op("resolve")
                .with_message(message),

            ModelError::InheritanceConflict {
                entity, property, ..
            } => ExError::new(ExErrorKind::InheritanceConflict)
                .with_entity_id(entity.as_str())
                .with_property_id(property.as_str())
                .with_op("resolve")
                .with_message(message),

            ModelError::MissingValueType { entity, property }
            | ModelError::AmbiguousDerivation {
                entity, property, ..
            }
            | ModelError::InvalidCloneStrategy {
                entity, property, ..
            }
            | ModelError::InvalidEmbedding {
                entity, property, ..
            }
            | ModelError::UnknownPropertyReference {
                entity, property, ..
            } => ExError::new(ExErrorKind::InvalidDefinition)
                .with_entity_id(entity.as_str())
                .with_property_id(property.as_str())
                .with_op("resolve")
                .with_message(message),

            ModelError::MissingAccessor {
                entity, property, ..
            } => ExError::new(ExErrorKind::MissingAccessor)
                .with_entity_id(entity.as_str())
                .with_property_id(property.as_str())
                .with_op("resolve")
                .with_message(message),

            ModelError::DuplicateSerializationTag { entity, first, .. } => {
                ExError::new(ExErrorKind::DuplicateTag)
                    .with_entity_id(entity.as_str())
                    .with_property_id(first.as_str())
                    .with_op("resolve")
                    .with_message(message)
            }

            ModelError::MalformedDefault {
                entity, property, ..
            } => ExError::new(ExErrorKind::MalformedDefault)
                .with_entity_id(entity.as_str())
                .with_property_id(property.as_str())
                .with_op("resolve")
                .with_message(message),

            ModelError::DanglingInverse {
                entity, property, ..
            }
            | ModelError::InverseMismatch {
                entity, property, ..
            } => ExError::new(ExErrorKind::DanglingInverse)
                .with_entity_id(entity.as_str())
                .with_property_id(property.as_str())
                .with_op("resolve")
                .with_message(message),

            ModelError::CloneOrderCycle { entity, property } => {
                ExError::new(ExErrorKind::CycleDetected)
                    .with_entity_id(entity.as_str())
                    .with_property_id(property.as_str())
                    .with_op("resolve")
                    .with_message(message)
            }

            ModelError::MalformedExpression {
                entity, property, ..
            } => ExError::new(ExErrorKind::InvalidExpression)
                .with_entity_id(entity.as_str())
                .with_property_id(property.as_str())
                .with_op("resolve")
                .with_message(message),

            ModelError::InstanceNotFound { instance } => ExError::new(ExErrorKind::NotFound)
                .with_instance_id(instance.to_string())
                .with_message(message),

            ModelError::UnknownProperty { entity, property }
            | ModelError::ElementNotFound { entity, property } => {
                ExError::new(ExErrorKind::NotFound)
                    .with_entity_id(entity.as_str())
                    .with_property_id(property.as_str())
                    .with_message(message)
            }

            ModelError::WrongCardinality {
                entity,
                property,
                op,
                ..
            } => ExError::new(ExErrorKind::WrongCardinality)
                .with_entity_id(entity.as_str())
                .with_property_id(property.as_str())
                .with_op(op)
                .with_message(message),

            ModelError::NotWritable {
                entity,
                property,
                op,
            } => ExError::new(ExErrorKind::NotWritable)
                .with_entity_id(entity.as_str())
                .with_property_id(property.as_str())
                .with_op(op)
                .with_message(message),

            ModelError::InstanceDeleted { instance } => ExError::new(ExErrorKind::Deleted)
                .with_instance_id(instance.to_string())
                .with_message(message),

            ModelError::TypeMismatch {
                entity, property, ..
            } => ExError::new(ExErrorKind::TypeMismatch)
                .with_entity_id(entity.as_str())
                .with_property_id(property.as_str())
                .with_message(message),

            ModelError::IndexOutOfBounds {
                entity, property, ..
            } => ExError::new(ExErrorKind::OutOfBounds)
                .with_entity_id(entity.as_str())
                .with_property_id(property.as_str())
                .with_message(message),

            ModelError::AbstractEntity { entity } => ExError::new(ExErrorKind::AbstractEntity)
                .with_entity_id(entity.as_str())
                .with_op("create")
                .with_message(message),

            ModelError::EntityMismatch { left, .. } => ExError::new(ExErrorKind::TypeMismatch)
                .with_entity_id(left.as_str())
                .with_op("update_with")
                .with_message(message),

            ModelError::CloneInProgress { instance } => ExError::new(ExErrorKind::ReentrantClone)
                .with_instance_id(instance.to_string())
                .with_op("clone")
                .with_message(message),

            ModelError::ExpressionFailed { property, .. } => {
                ExError::new(ExErrorKind::InvalidExpression)
                    .with_property_id(property.as_str())
                    .with_op("clone")
                    .with_message(message)
            }

            ModelError::UninitializedState { instance } => {
                ExError::new(ExErrorKind::Uninitialized)
                    .with_instance_id(instance.to_string())
                    .with_message(message)
            }

            ModelError::IntegrityViolation {
                instance, property, ..
            } => ExError::new(ExErrorKind::IntegrityViolation)
                .with_instance_id(instance.to_string())
                .with_property_id(property.as_str())
                .with_op("validate_graph")
                .with_message(message),

            ModelError::Config { .. } => ExError::new(ExErrorKind::Config).with_message(message),

            ModelError::Internal { .. } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

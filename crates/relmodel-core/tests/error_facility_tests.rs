use relmodel_core::errors::{ErrorCategory, ExError, ExErrorKind, ModelError};
use relmodel_core::{EntityId, InstanceId, PropertyId};

#[test]
fn test_unknown_entity_verifiable_by_kind() {
    let err = ModelError::UnknownEntity {
        entity: EntityId::new("Ghost"),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::NotFound);
    assert_eq!(ex_err.code(), "ERR_NOT_FOUND");
    assert_eq!(ex_err.entity_id(), Some("Ghost"));
    assert_eq!(ex_err.op(), Some("resolve"));
}

#[test]
fn test_deleted_distinct_from_not_found() {
    let instance = InstanceId::new();
    let err = ModelError::InstanceDeleted { instance };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::Deleted);
    assert_eq!(ex_err.code(), "ERR_DELETED");
    assert_ne!(ex_err.kind(), ExErrorKind::NotFound);
    assert_eq!(ex_err.instance_id(), Some(instance.to_string().as_str()));
}

#[test]
fn test_inheritance_conflict_structured_fields() {
    let err = ModelError::InheritanceConflict {
        entity: EntityId::new("Bottom"),
        property: PropertyId::new("name"),
        field: "cardinality",
        first: EntityId::new("Left"),
        second: EntityId::new("Right"),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::InheritanceConflict);
    assert_eq!(ex_err.code(), "ERR_INHERITANCE_CONFLICT");
    assert_eq!(ex_err.entity_id(), Some("Bottom"));
    assert_eq!(ex_err.property_id(), Some("name"));
    assert!(ex_err.message().contains("cardinality"));
}

#[test]
fn test_error_kind_code_mapping() {
    // Each kind has a stable, unique code
    let kinds = vec![
        (ExErrorKind::InvalidDefinition, "ERR_INVALID_DEFINITION"),
        (ExErrorKind::NotFound, "ERR_NOT_FOUND"),
        (ExErrorKind::AlreadyExists, "ERR_ALREADY_EXISTS"),
        (ExErrorKind::CycleDetected, "ERR_CYCLE_DETECTED"),
        (ExErrorKind::WrongCardinality, "ERR_WRONG_CARDINALITY"),
        (ExErrorKind::NotWritable, "ERR_NOT_WRITABLE"),
        (ExErrorKind::ReentrantClone, "ERR_REENTRANT_CLONE"),
        (ExErrorKind::Uninitialized, "ERR_UNINITIALIZED"),
        (ExErrorKind::Config, "ERR_CONFIG"),
    ];

    let mut codes = std::collections::HashSet::new();
    for (kind, expected_code) in kinds {
        assert_eq!(kind.code(), expected_code);
        assert!(codes.insert(kind.code()));
    }
}

#[test]
fn test_not_writable_carries_accessor_as_op() {
    let err = ModelError::NotWritable {
        entity: EntityId::new("Settings"),
        property: PropertyId::new("serial"),
        op: "set",
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::NotWritable);
    assert_eq!(ex_err.op(), Some("set"));
    assert_eq!(ex_err.property_id(), Some("serial"));
}

#[test]
fn test_clone_in_progress_conversion() {
    let err = ModelError::CloneInProgress {
        instance: InstanceId::new(),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::ReentrantClone);
    assert_eq!(ex_err.op(), Some("clone"));
}

#[test]
fn test_entity_mismatch_is_type_mismatch() {
    let err = ModelError::EntityMismatch {
        left: EntityId::new("Folder"),
        right: EntityId::new("Item"),
    };
    assert!(err.is_execution_error());

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::TypeMismatch);
    assert_eq!(ex_err.op(), Some("update_with"));
    assert_eq!(ex_err.entity_id(), Some("Folder"));
}

#[test]
fn test_categories() {
    let definition = ModelError::InheritanceCycle {
        entity: EntityId::new("A"),
    };
    let execution = ModelError::AbstractEntity {
        entity: EntityId::new("Shape"),
    };
    let lifecycle = ModelError::UninitializedState {
        instance: InstanceId::new(),
    };
    let config = ModelError::Config {
        message: "bad".to_string(),
    };

    assert_eq!(definition.category(), ErrorCategory::Definition);
    assert!(definition.is_definition_error());
    assert!(!definition.is_execution_error());
    assert_eq!(execution.category(), ErrorCategory::Execution);
    assert_eq!(lifecycle.category(), ErrorCategory::Uninitialized);
    assert_eq!(config.category(), ErrorCategory::Config);
}

#[test]
fn test_builder_pattern() {
    let err = ExError::new(ExErrorKind::OutOfBounds)
        .with_op("move")
        .with_entity_id("Folder")
        .with_property_id("items")
        .with_message("index 4 past end");

    assert_eq!(err.kind(), ExErrorKind::OutOfBounds);
    assert_eq!(err.op(), Some("move"));
    assert_eq!(err.entity_id(), Some("Folder"));
    assert_eq!(err.property_id(), Some("items"));
    assert_eq!(err.message(), "index 4 past end");
}

#[test]
fn test_display_format() {
    let err = ExError::new(ExErrorKind::NotFound)
        .with_op("read")
        .with_entity_id("Folder")
        .with_message("Unknown property");

    let display = format!("{}", err);

    assert!(display.contains("[ERR_NOT_FOUND]"));
    assert!(display.contains("in operation 'read'"));
    assert!(display.contains("Unknown property"));
    assert!(display.contains("entity_id: Folder"));
}

#[test]
fn test_error_source_chain() {
    let inner = ExError::new(ExErrorKind::Internal).with_message("lock poisoned");
    let outer = ExError::new(ExErrorKind::IntegrityViolation)
        .with_message("validation aborted")
        .with_source(inner);

    let source = outer.source_error().map(|e| e.kind());
    assert_eq!(source, Some(ExErrorKind::Internal));
    assert!(std::error::Error::source(&outer).is_some());
}

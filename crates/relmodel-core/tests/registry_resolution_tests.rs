#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use relmodel_core::errors::{ErrorCategory, ModelError};
use relmodel_core::meta::{
    Accessors, Cardinality, CloneStrategy, EmbeddingRule, EntityDecl, PropertyDecl, Registry,
    SchemaDocument,
};
use relmodel_core::{EntityId, PropertyId, Value, ValueType};
use std::sync::Arc;

use common::{diamond_decls, folder_item_registry, registry_from};

#[test]
fn test_resolution_is_reference_stable() {
    // GIVEN a registry with the folder/item schema
    let registry = folder_item_registry();

    // WHEN resolving the same entity twice
    let first = registry.resolve("Folder").unwrap();
    let second = registry.resolve("Folder").unwrap();

    // THEN both calls return the same cached descriptor
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_concurrent_resolution_returns_one_descriptor() {
    // GIVEN a registry shared across threads
    let registry = folder_item_registry();

    // WHEN several threads resolve the same entity at once
    let descriptors: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| registry.resolve("Item").unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // THEN every thread sees the identical descriptor
    for d in &descriptors[1..] {
        assert!(Arc::ptr_eq(&descriptors[0], d));
    }
}

#[test]
fn test_diamond_with_identical_declarations_merges() {
    // GIVEN Bottom extends Left and Right, which both redeclare `name`
    let registry = registry_from(diamond_decls()).unwrap();

    // WHEN resolving Bottom
    let bottom = registry.resolve("Bottom").unwrap();

    // THEN it carries each property once, inherited properties in parent order
    let ids: Vec<&str> = bottom.properties.keys().map(|p| p.as_str()).collect();
    assert_eq!(ids, vec!["name", "left_only", "right_only"]);
    assert!(bottom.is_a(&EntityId::from("Base")));
    assert!(bottom.is_a(&EntityId::from("Left")));
    assert!(bottom.is_a(&EntityId::from("Right")));
    assert_eq!(
        bottom.lineage,
        vec![
            EntityId::from("Base"),
            EntityId::from("Left"),
            EntityId::from("Right"),
            EntityId::from("Bottom"),
        ]
    );
}

#[test]
fn test_diamond_with_conflicting_cardinality_fails() {
    // GIVEN Left and Right disagree on the cardinality of `size`
    let decls = vec![
        EntityDecl::new("Base"),
        EntityDecl::new("Left")
            .extends("Base")
            .property(PropertyDecl::single("size", ValueType::Int)),
        EntityDecl::new("Right")
            .extends("Base")
            .property(PropertyDecl::list("size", ValueType::Int)),
        EntityDecl::new("Bottom").extends("Left").extends("Right"),
    ];
    let registry = registry_from(decls).unwrap();

    // WHEN resolving Bottom
    let err = registry.resolve("Bottom").unwrap_err();

    // THEN a definition error names the field and both ancestors
    assert_eq!(err.category(), ErrorCategory::Definition);
    match err {
        ModelError::InheritanceConflict {
            field,
            first,
            second,
            ..
        } => {
            assert_eq!(field, "cardinality");
            assert_eq!(first, EntityId::from("Left"));
            assert_eq!(second, EntityId::from("Right"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // AND the parents themselves still resolve
    assert!(registry.resolve("Left").is_ok());
}

#[test]
fn test_own_declaration_overrides_conflict() {
    // GIVEN the conflicting diamond, with Bottom settling the cardinality
    let decls = vec![
        EntityDecl::new("Left").property(PropertyDecl::single("size", ValueType::Int)),
        EntityDecl::new("Right").property(PropertyDecl::list("size", ValueType::Int)),
        EntityDecl::new("Bottom")
            .extends("Left")
            .extends("Right")
            .property(PropertyDecl::new("size").cardinality(Cardinality::List)),
    ];
    let registry = registry_from(decls).unwrap();

    // WHEN resolving Bottom
    let bottom = registry.resolve("Bottom").unwrap();

    // THEN the own declaration rules; the value type is inherited
    let size = bottom.property("size").unwrap();
    assert!(size.is_list());
    assert_eq!(size.value_type, ValueType::Int);
    assert_eq!(size.declared_by, EntityId::from("Left"));
}

#[test]
fn test_descendant_definition_overrides_ancestor() {
    // GIVEN Mid overrides Base's default and Bottom inherits from both
    let decls = vec![
        EntityDecl::new("Base")
            .property(PropertyDecl::single("count", ValueType::Int).default_text("1")),
        EntityDecl::new("Mid")
            .extends("Base")
            .property(PropertyDecl::new("count").default_text("2")),
        EntityDecl::new("Bottom").extends("Base").extends("Mid"),
    ];
    let registry = registry_from(decls).unwrap();

    // WHEN resolving Bottom
    let bottom = registry.resolve("Bottom").unwrap();

    // THEN the descendant's definition wins without a conflict
    assert_eq!(
        bottom.property("count").unwrap().default_value,
        Some(Value::Int(2))
    );
}

#[test]
fn test_inheritance_cycle_is_rejected() {
    // GIVEN A extends B and B extends A
    let registry = registry_from(vec![
        EntityDecl::new("A").extends("B"),
        EntityDecl::new("B").extends("A"),
    ])
    .unwrap();

    // WHEN / THEN resolution fails with a cycle, every time
    for _ in 0..2 {
        let err = registry.resolve("A").unwrap_err();
        assert!(matches!(err, ModelError::InheritanceCycle { .. }));
    }
}

#[test]
fn test_unknown_parent_fails_build() {
    let err = registry_from(vec![EntityDecl::new("A").extends("Missing")]).unwrap_err();
    assert!(matches!(err, ModelError::UnknownEntity { .. }));
}

#[test]
fn test_duplicate_entity_fails_build() {
    let err = registry_from(vec![EntityDecl::new("A"), EntityDecl::new("A")]).unwrap_err();
    assert!(matches!(err, ModelError::DuplicateEntity { .. }));
}

#[test]
fn test_unknown_entity_resolution() {
    let registry = folder_item_registry();
    let err = registry.resolve("Nope").unwrap_err();
    assert!(matches!(err, ModelError::UnknownEntity { .. }));
    assert!(err.is_definition_error());
}

#[test]
fn test_missing_value_type() {
    let registry =
        registry_from(vec![EntityDecl::new("A").property(PropertyDecl::new("x"))]).unwrap();
    let err = registry.resolve("A").unwrap_err();
    assert!(matches!(err, ModelError::MissingValueType { .. }));
}

#[test]
fn test_dangling_inverse() {
    let registry = registry_from(vec![
        EntityDecl::new("A")
            .property(PropertyDecl::single("b", ValueType::entity("B")).inverse("missing")),
        EntityDecl::new("B"),
    ])
    .unwrap();
    let err = registry.resolve("A").unwrap_err();
    assert!(matches!(err, ModelError::DanglingInverse { .. }));
}

#[test]
fn test_inverse_pointing_elsewhere_is_a_mismatch() {
    // GIVEN A.b names B.a as inverse, but B.a names A.other
    let registry = registry_from(vec![
        EntityDecl::new("A")
            .property(PropertyDecl::single("b", ValueType::entity("B")).inverse("a"))
            .property(PropertyDecl::single("other", ValueType::entity("B"))),
        EntityDecl::new("B")
            .property(PropertyDecl::single("a", ValueType::entity("A")).inverse("other")),
    ])
    .unwrap();

    let err = registry.resolve("A").unwrap_err();
    assert!(matches!(err, ModelError::InverseMismatch { .. }));
}

#[test]
fn test_implicit_inverse_is_adopted() {
    // GIVEN Folder.items names Item.parent as inverse; Item.parent names nothing
    let registry = registry_from(vec![
        EntityDecl::new("Folder").property(
            PropertyDecl::list("items", ValueType::entity("Item"))
                .inverse("parent")
                .embedded(),
        ),
        EntityDecl::new("Item")
            .property(PropertyDecl::single("parent", ValueType::entity("Folder"))),
    ])
    .unwrap();

    // WHEN resolving Item
    let item = registry.resolve("Item").unwrap();

    // THEN parent pairs with items and is a container
    let parent = item.property("parent").unwrap();
    assert_eq!(parent.inverse, Some(PropertyId::from("items")));
    assert!(parent.container);
    assert_eq!(parent.clone, CloneStrategy::Ignore);
    assert!(!parent.is_relevant());
}

#[test]
fn test_single_pair_derivation() {
    // GIVEN Person.desk <-> Desk.owner with no explicit derived flags
    let registry = common::person_registry();

    let person = registry.resolve("Person").unwrap();
    let desk = registry.resolve("Desk").unwrap();

    // THEN exactly one side is derived
    assert!(!person.property("desk").unwrap().derived);
    assert!(desk.property("owner").unwrap().derived);
    // AND the self-inverse spouse is never derived
    assert!(!person.property("spouse").unwrap().derived);
}

#[test]
fn test_both_sides_derived_is_ambiguous() {
    let registry = registry_from(vec![
        EntityDecl::new("A").property(
            PropertyDecl::single("b", ValueType::entity("B"))
                .inverse("a")
                .derived(true),
        ),
        EntityDecl::new("B").property(
            PropertyDecl::single("a", ValueType::entity("A"))
                .inverse("b")
                .derived(true),
        ),
    ])
    .unwrap();
    let err = registry.resolve("A").unwrap_err();
    assert!(matches!(err, ModelError::AmbiguousDerivation { .. }));
}

#[test]
fn test_duplicate_serialization_tag() {
    let registry = registry_from(vec![EntityDecl::new("A")
        .property(PropertyDecl::single("x", ValueType::Int).tag("t"))
        .property(PropertyDecl::single("y", ValueType::Int).tag("t"))])
    .unwrap();
    let err = registry.resolve("A").unwrap_err();
    assert!(matches!(err, ModelError::DuplicateSerializationTag { .. }));
}

#[test]
fn test_malformed_default() {
    let registry = registry_from(vec![EntityDecl::new("A")
        .property(PropertyDecl::single("n", ValueType::Int).default_text("abc"))])
    .unwrap();
    let err = registry.resolve("A").unwrap_err();
    assert!(matches!(err, ModelError::MalformedDefault { .. }));
}

#[test]
fn test_default_is_parsed_through_converter() {
    let registry = registry_from(vec![EntityDecl::new("A")
        .property(PropertyDecl::single("flag", ValueType::Bool).default_text("true"))])
    .unwrap();
    let a = registry.resolve("A").unwrap();
    assert_eq!(a.property("flag").unwrap().initial_value(), Value::Bool(true));
}

#[test]
fn test_list_without_add_accessor_is_rejected() {
    let no_add = Accessors {
        add: false,
        ..Accessors::default()
    };
    let registry = registry_from(vec![EntityDecl::new("A")
        .property(PropertyDecl::list("xs", ValueType::Int).accessors(no_add))])
    .unwrap();
    let err = registry.resolve("A").unwrap_err();
    assert!(matches!(
        err,
        ModelError::MissingAccessor {
            accessor: "add",
            ..
        }
    ));
}

#[test]
fn test_abstract_entity_skips_accessor_check() {
    let no_remove = Accessors {
        remove: false,
        ..Accessors::default()
    };
    let registry = registry_from(vec![EntityDecl::new("A")
        .abstract_entity()
        .property(PropertyDecl::list("xs", ValueType::Int).accessors(no_remove))])
    .unwrap();
    assert!(registry.resolve("A").is_ok());
}

#[test]
fn test_clone_after_orders_properties() {
    let registry = registry_from(vec![EntityDecl::new("A")
        .property(PropertyDecl::single("a", ValueType::Int).clone_after(["c"]))
        .property(PropertyDecl::single("b", ValueType::Int))
        .property(PropertyDecl::single("c", ValueType::Int))])
    .unwrap();
    let a = registry.resolve("A").unwrap();
    let order: Vec<&str> = a.clone_order.iter().map(|p| p.as_str()).collect();
    assert_eq!(order, vec!["c", "a", "b"]);
}

#[test]
fn test_clone_after_cycle() {
    let registry = registry_from(vec![EntityDecl::new("A")
        .property(PropertyDecl::single("a", ValueType::Int).clone_after(["b"]))
        .property(PropertyDecl::single("b", ValueType::Int).clone_after(["a"]))])
    .unwrap();
    let err = registry.resolve("A").unwrap_err();
    assert!(matches!(err, ModelError::CloneOrderCycle { .. }));
}

#[test]
fn test_unknown_companion_is_rejected() {
    let registry = registry_from(vec![
        EntityDecl::new("A").property(
            PropertyDecl::single("b", ValueType::entity("B"))
                .embed(EmbeddingRule::WhenResolved(vec![PropertyId::from("nope")])),
        ),
        EntityDecl::new("B"),
    ])
    .unwrap();
    let err = registry.resolve("A").unwrap_err();
    assert!(matches!(err, ModelError::UnknownPropertyReference { .. }));
}

#[test]
fn test_malformed_clone_expression() {
    let registry = registry_from(vec![EntityDecl::new("A").property(
        PropertyDecl::single("x", ValueType::Text)
            .clone_strategy(CloneStrategy::Custom("original.x +".to_string())),
    )])
    .unwrap();
    let err = registry.resolve("A").unwrap_err();
    assert!(matches!(err, ModelError::MalformedExpression { .. }));
}

#[test]
fn test_default_clone_strategies() {
    let registry = common::document_registry();
    let doc = registry.resolve("Document").unwrap();

    assert_eq!(doc.property("title").unwrap().clone, CloneStrategy::Clone);
    assert_eq!(doc.property("author").unwrap().clone, CloneStrategy::Reference);
    assert_eq!(doc.property("sections").unwrap().clone, CloneStrategy::Clone);
    assert!(doc.property("copy_title").unwrap().clone_expr.is_some());
}

#[test]
fn test_embedded_entities() {
    let registry = folder_item_registry();
    let reached = registry.embedded_entities("Folder").unwrap();
    assert!(reached.contains(&EntityId::from("Item")));
    assert!(registry.embedded_entities("Item").unwrap().is_empty());
}

#[test]
fn test_schema_document_from_toml() {
    // GIVEN a TOML schema document
    let text = r#"
        [[entities]]
        id = "Folder"

        [[entities.properties]]
        id = "items"
        cardinality = "list"
        value_type = { entity = "Item" }
        inverse = "parent"
        embed = "always"

        [[entities]]
        id = "Item"

        [[entities.properties]]
        id = "parent"
        cardinality = "single"
        value_type = { entity = "Folder" }
    "#;

    // WHEN building a registry from it
    let document = SchemaDocument::from_toml_str(text).unwrap();
    let registry = Registry::builder().schema(document).build().unwrap();

    // THEN the entities resolve with their relationships
    let folder = registry.resolve("Folder").unwrap();
    let items = folder.property("items").unwrap();
    assert!(items.is_list());
    assert_eq!(items.embed, EmbeddingRule::Always);
    assert_eq!(items.delete_embed, EmbeddingRule::Always);
    assert_eq!(
        registry.resolve("Item").unwrap().property("parent").unwrap().inverse,
        Some(PropertyId::from("items"))
    );
}

#[test]
fn test_schema_document_rejects_unknown_keys() {
    let err = SchemaDocument::from_toml_str("[[entities]]\nid = \"A\"\nbogus = 1\n").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Config);
}

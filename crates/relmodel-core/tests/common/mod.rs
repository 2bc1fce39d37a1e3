use relmodel_core::meta::{CloneStrategy, EntityDecl, PropertyDecl, Registry};
use relmodel_core::{Graph, InstanceId, ValueType};
use std::sync::Arc;

/// Folder/Item containment
///
/// `Folder.items` (LIST, embedded) is the inverse of `Item.parent` (SINGLE,
/// container).
#[allow(dead_code)]
pub fn folder_item_registry() -> Arc<Registry> {
    let registry = Registry::builder()
        .entity(
            EntityDecl::new("Folder")
                .property(PropertyDecl::single("name", ValueType::Text))
                .property(
                    PropertyDecl::list("items", ValueType::entity("Item"))
                        .inverse("parent")
                        .embedded(),
                ),
        )
        .entity(
            EntityDecl::new("Item")
                .property(PropertyDecl::single("name", ValueType::Text))
                .property(
                    PropertyDecl::single("parent", ValueType::entity("Folder")).inverse("items"),
                ),
        )
        .build()
        .expect("folder/item schema should build");
    Arc::new(registry)
}

/// Three-level embedding chain: `Node.child` embeds the next node
#[allow(dead_code)]
pub fn chain_registry() -> Arc<Registry> {
    let registry = Registry::builder()
        .entity(
            EntityDecl::new("Node")
                .property(PropertyDecl::single("label", ValueType::Text))
                .property(PropertyDecl::single("child", ValueType::entity("Node")).embedded()),
        )
        .build()
        .expect("chain schema should build");
    Arc::new(registry)
}

/// Self-inverse SINGLE/SINGLE pair plus an asymmetric SINGLE/SINGLE pair
#[allow(dead_code)]
pub fn person_registry() -> Arc<Registry> {
    let registry = Registry::builder()
        .entity(
            EntityDecl::new("Person")
                .property(PropertyDecl::single("name", ValueType::Text))
                .property(
                    PropertyDecl::single("spouse", ValueType::entity("Person")).inverse("spouse"),
                )
                .property(PropertyDecl::single("desk", ValueType::entity("Desk")).inverse("owner")),
        )
        .entity(
            EntityDecl::new("Desk")
                .property(PropertyDecl::single("code", ValueType::Text))
                .property(
                    PropertyDecl::single("owner", ValueType::entity("Person")).inverse("desk"),
                ),
        )
        .build()
        .expect("person schema should build");
    Arc::new(registry)
}

/// Diamond: Bottom extends Left and Right, both extend Base
///
/// Left and Right redeclare `name` identically.
#[allow(dead_code)]
pub fn diamond_decls() -> Vec<EntityDecl> {
    vec![
        EntityDecl::new("Base").property(PropertyDecl::single("name", ValueType::Text)),
        EntityDecl::new("Left")
            .extends("Base")
            .property(PropertyDecl::single("name", ValueType::Text))
            .property(PropertyDecl::single("left_only", ValueType::Int)),
        EntityDecl::new("Right")
            .extends("Base")
            .property(PropertyDecl::single("name", ValueType::Text))
            .property(PropertyDecl::single("right_only", ValueType::Bool)),
        EntityDecl::new("Bottom").extends("Left").extends("Right"),
    ]
}

#[allow(dead_code)]
pub fn registry_from(decls: Vec<EntityDecl>) -> relmodel_core::Result<Registry> {
    decls
        .into_iter()
        .fold(Registry::builder(), |builder, decl| builder.entity(decl))
        .build()
}

/// Documents with an owned-but-not-embedded attachment, a shared author
/// and a computed title
#[allow(dead_code)]
pub fn document_registry() -> Arc<Registry> {
    let registry = Registry::builder()
        .entity(
            EntityDecl::new("Document")
                .property(PropertyDecl::single("title", ValueType::Text))
                .property(
                    PropertyDecl::single("copy_title", ValueType::Text).clone_strategy(
                        CloneStrategy::Custom("original.title + ' (copy)'".to_string()),
                    ),
                )
                .property(
                    PropertyDecl::single("attachment", ValueType::entity("Note"))
                        .clone_strategy(CloneStrategy::Clone),
                )
                .property(PropertyDecl::single("author", ValueType::entity("Author")))
                .property(PropertyDecl::single("related", ValueType::entity("Document")))
                .property(
                    PropertyDecl::list("sections", ValueType::entity("Section"))
                        .inverse("document")
                        .embedded(),
                ),
        )
        .entity(EntityDecl::new("Note").property(PropertyDecl::single("text", ValueType::Text)))
        .entity(EntityDecl::new("Author").property(PropertyDecl::single("name", ValueType::Text)))
        .entity(
            EntityDecl::new("Section")
                .property(PropertyDecl::single("heading", ValueType::Text))
                .property(
                    PropertyDecl::single("document", ValueType::entity("Document"))
                        .inverse("sections"),
                )
                .property(PropertyDecl::single("next", ValueType::entity("Section"))),
        )
        .build()
        .expect("document schema should build");
    Arc::new(registry)
}

/// Create an instance and set its text properties
#[allow(dead_code)]
pub fn create_named(graph: &mut Graph, entity: &str, property: &str, value: &str) -> InstanceId {
    let id = relmodel_core::ops::create(graph, entity).expect("create should succeed");
    relmodel_core::ops::set(graph, id, property, value).expect("set should succeed");
    id
}

/// Folder with items named after `names`, in order
#[allow(dead_code)]
pub fn folder_with_items(
    graph: &mut Graph,
    name: &str,
    names: &[&str],
) -> (InstanceId, Vec<InstanceId>) {
    let folder = create_named(graph, "Folder", "name", name);
    let items = names
        .iter()
        .map(|n| {
            let item = create_named(graph, "Item", "name", n);
            relmodel_core::ops::add(graph, folder, "items", item).expect("add should succeed");
            item
        })
        .collect();
    (folder, items)
}

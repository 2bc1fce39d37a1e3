//! Walkthrough of the relational object model
//!
//! - Loading a schema from TOML
//! - Inverse synchronization between a folder and its items
//! - Cloning an embedded tree
//! - Merging one tree into another
//! - Cascading deletion and undeletion

use indexmap::IndexSet;
use relmodel_core::logging_facility::{init, Profile};
use relmodel_core::ops::{add, create, delete, read, read_refs, set, undelete};
use relmodel_core::rules::validate_graph;
use relmodel_core::{
    clone_instance, distance, structural_equals, update_with, Graph, InstanceId, Registry,
    SchemaDocument,
};
use std::sync::Arc;

const SCHEMA: &str = r#"
[[entities]]
id = "Folder"

[[entities.properties]]
id = "name"
cardinality = "single"
value_type = "text"

[[entities.properties]]
id = "items"
cardinality = "list"
value_type = { entity = "Item" }
inverse = "parent"
embed = "always"

[[entities]]
id = "Item"

[[entities.properties]]
id = "name"
cardinality = "single"
value_type = "text"

[[entities.properties]]
id = "parent"
cardinality = "single"
value_type = { entity = "Folder" }
inverse = "items"
"#;

fn folder(graph: &mut Graph, name: &str, items: &[&str]) -> relmodel_core::Result<InstanceId> {
    let folder = create(graph, "Folder")?;
    set(graph, folder, "name", name)?;
    for item_name in items {
        let item = create(graph, "Item")?;
        set(graph, item, "name", *item_name)?;
        add(graph, folder, "items", item)?;
    }
    Ok(folder)
}

fn describe(graph: &Graph, folder: InstanceId) -> relmodel_core::Result<String> {
    let mut names = Vec::new();
    for item in read_refs(graph, folder, "items")? {
        names.push(read(graph, item, "name")?.as_text().unwrap_or("?").to_string());
    }
    Ok(format!("{:?} {:?}", read(graph, folder, "name")?, names))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init(Profile::Development);

    let registry = Registry::builder()
        .schema(SchemaDocument::from_toml_str(SCHEMA)?)
        .build()?;
    let mut graph = Graph::new(Arc::new(registry));

    println!("== inverse synchronization");
    let drafts = folder(&mut graph, "drafts", &["intro", "usage", "faq"])?;
    let first = read_refs(&graph, drafts, "items")?[0];
    println!("{}", describe(&graph, drafts)?);
    println!("first item's parent: {:?}", read(&graph, first, "parent")?);

    println!("\n== clone");
    let copy = clone_instance(&mut graph, drafts, &IndexSet::new())?;
    println!("{}", describe(&graph, copy)?);
    println!("structurally equal: {}", structural_equals(&graph, drafts, copy)?);

    println!("\n== merge");
    let published = folder(&mut graph, "published", &["usage", "faq", "changelog"])?;
    println!("distance before: {:.3}", distance(&graph, copy, published)?);
    update_with(&mut graph, copy, published)?;
    println!("{}", describe(&graph, copy)?);
    println!("distance after: {:.3}", distance(&graph, copy, published)?);

    println!("\n== delete / undelete");
    delete(&mut graph, drafts)?;
    println!("live instances after delete: {}", graph.live_instance_ids().len());
    undelete(&mut graph, drafts, true)?;
    // undelete does not cascade; the restored list still names deleted items
    for item in read_refs(&graph, drafts, "items")? {
        undelete(&mut graph, item, false)?;
    }
    println!("drafts restored: {}", !graph.is_deleted(drafts)?);

    validate_graph(&graph)?;
    println!("\ngraph is consistent");
    Ok(())
}

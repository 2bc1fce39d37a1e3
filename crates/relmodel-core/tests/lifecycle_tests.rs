#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use indexmap::IndexSet;
use relmodel_core::errors::ModelError;
use relmodel_core::graph::RecordingEditLog;
use relmodel_core::logging_facility::test_capture::init_test_capture;
use relmodel_core::meta::{EmbeddingRule, EntityDecl, HookKind, PropertyDecl, Registry};
use relmodel_core::ops::{
    add, before_serialize, begin_deserialize, clear_modified, create, create_for_deserialize,
    delete, delete_in_context, end_deserialize, read, read_refs, set, undelete,
};
use relmodel_core::rules::validate_graph;
use relmodel_core::{ChangeKind, Graph, InstanceId, PropertyId, Value, ValueType};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use common::{chain_registry, folder_item_registry, folder_with_items};

#[test]
fn test_deletion_cascades_through_embedding_chain() {
    // GIVEN a → b → c, each embedding the next
    let mut graph = Graph::new(chain_registry());
    let a = create(&mut graph, "Node").unwrap();
    let b = create(&mut graph, "Node").unwrap();
    let c = create(&mut graph, "Node").unwrap();
    set(&mut graph, a, "child", b).unwrap();
    set(&mut graph, b, "child", c).unwrap();

    // WHEN deleting a
    delete(&mut graph, a).unwrap();

    // THEN all three are deleted
    assert!(graph.is_deleted(a).unwrap());
    assert!(graph.is_deleted(b).unwrap());
    assert!(graph.is_deleted(c).unwrap());
    assert!(graph.live_instance_ids().is_empty());
}

#[test]
fn test_deleting_container_deletes_contents() {
    // GIVEN a folder with two items
    let mut graph = Graph::new(folder_item_registry());
    let (folder, items) = folder_with_items(&mut graph, "f", &["a", "b"]);

    // WHEN deleting the folder
    delete(&mut graph, folder).unwrap();

    // THEN the items are deleted too and no live reference dangles
    for item in &items {
        assert!(graph.is_deleted(*item).unwrap());
    }
    validate_graph(&graph).unwrap();
}

#[test]
fn test_deleting_contained_item_leaves_container() {
    // GIVEN a folder with two items
    let mut graph = Graph::new(folder_item_registry());
    let (folder, items) = folder_with_items(&mut graph, "f", &["a", "b"]);

    // WHEN deleting the first item
    delete(&mut graph, items[0]).unwrap();

    // THEN the folder survives and lists only the second item
    assert!(!graph.is_deleted(folder).unwrap());
    assert_eq!(read_refs(&graph, folder, "items").unwrap(), vec![items[1]]);
    validate_graph(&graph).unwrap();
}

#[test]
fn test_delete_undelete_round_trip() {
    // GIVEN an item inside a folder
    let mut graph = Graph::new(folder_item_registry());
    let (folder, items) = folder_with_items(&mut graph, "f", &["a"]);
    let item = items[0];

    // WHEN deleting and undeleting with property restoration
    delete(&mut graph, item).unwrap();
    assert_eq!(read(&graph, item, "parent").unwrap(), Value::Null);
    undelete(&mut graph, item, true).unwrap();

    // THEN the parent and the inverse membership are back
    assert!(!graph.is_deleted(item).unwrap());
    assert_eq!(read(&graph, item, "parent").unwrap(), Value::Ref(folder));
    assert_eq!(read_refs(&graph, folder, "items").unwrap(), vec![item]);
    assert_eq!(read(&graph, item, "name").unwrap(), Value::from("a"));
}

#[test]
fn test_undelete_without_restore_leaves_references_cleared() {
    let mut graph = Graph::new(folder_item_registry());
    let (folder, items) = folder_with_items(&mut graph, "f", &["a"]);

    delete(&mut graph, items[0]).unwrap();
    undelete(&mut graph, items[0], false).unwrap();

    assert!(!graph.is_deleted(items[0]).unwrap());
    assert_eq!(read(&graph, items[0], "parent").unwrap(), Value::Null);
    assert!(read_refs(&graph, folder, "items").unwrap().is_empty());
}

#[test]
fn test_delete_is_idempotent_and_undelete_of_live_is_noop() {
    let mut graph = Graph::new(folder_item_registry());
    let folder = create(&mut graph, "Folder").unwrap();

    undelete(&mut graph, folder, true).unwrap();
    delete(&mut graph, folder).unwrap();
    delete(&mut graph, folder).unwrap();

    assert!(graph.is_deleted(folder).unwrap());
}

#[test]
fn test_deleted_instances_reject_user_writes() {
    // GIVEN a deleted item and a live folder
    let mut graph = Graph::new(folder_item_registry());
    let folder = create(&mut graph, "Folder").unwrap();
    let item = create(&mut graph, "Item").unwrap();
    delete(&mut graph, item).unwrap();

    // WHEN / THEN writing to it or referencing it fails
    assert!(matches!(
        set(&mut graph, item, "name", "x").unwrap_err(),
        ModelError::InstanceDeleted { .. }
    ));
    assert!(matches!(
        add(&mut graph, folder, "items", item).unwrap_err(),
        ModelError::InstanceDeleted { .. }
    ));
    // AND reading still works
    assert_eq!(read(&graph, item, "name").unwrap(), Value::Null);
}

#[test]
fn test_delete_in_context_leaves_context_members() {
    // GIVEN a → b embedded, with b already being handled by the caller
    let mut graph = Graph::new(chain_registry());
    let a = create(&mut graph, "Node").unwrap();
    let b = create(&mut graph, "Node").unwrap();
    set(&mut graph, a, "child", b).unwrap();

    // WHEN deleting a with b in the context
    let context: IndexSet<InstanceId> = [b].into_iter().collect();
    delete_in_context(&mut graph, a, &context).unwrap();

    // THEN a is deleted, the reference is cleared and b is left to the caller
    assert!(graph.is_deleted(a).unwrap());
    assert!(!graph.is_deleted(b).unwrap());
}

#[test]
fn test_closure_member_skipped_by_cascade_is_still_deleted() {
    // GIVEN a → b → c, with b in the caller's context
    let capture = init_test_capture();
    let mut graph = Graph::new(chain_registry());
    let a = create(&mut graph, "Node").unwrap();
    let b = create(&mut graph, "Node").unwrap();
    let c = create(&mut graph, "Node").unwrap();
    set(&mut graph, a, "child", b).unwrap();
    set(&mut graph, b, "child", c).unwrap();

    // WHEN deleting a in that context
    let context: IndexSet<InstanceId> = [b].into_iter().collect();
    delete_in_context(&mut graph, a, &context).unwrap();

    // THEN c, reachable only through b, is deleted anyway and b is left alone
    assert!(graph.is_deleted(a).unwrap());
    assert!(!graph.is_deleted(b).unwrap());
    assert!(graph.is_deleted(c).unwrap());

    // AND the direct deletion of c was reported as a warning
    let c_text = c.to_string();
    let warnings = capture.count_events(|e| {
        e.level == tracing::Level::WARN && e.fields.get("instance_id") == Some(&c_text)
    });
    assert_eq!(warnings, 1);
}

/// Project whose tasks are deleted with it only when their owner is too
fn project_registry(team_first: bool) -> Arc<Registry> {
    let team = PropertyDecl::list("team", ValueType::entity("Member")).embedded();
    let tasks = PropertyDecl::list("tasks", ValueType::entity("Task"))
        .delete_embed(EmbeddingRule::WhenResolved(vec![PropertyId::from("owner")]));
    let project = if team_first {
        EntityDecl::new("Project").property(team).property(tasks)
    } else {
        EntityDecl::new("Project").property(tasks).property(team)
    };
    let registry = Registry::builder()
        .entity(project)
        .entity(
            EntityDecl::new("Task")
                .property(PropertyDecl::single("owner", ValueType::entity("Member"))),
        )
        .entity(EntityDecl::new("Member").property(PropertyDecl::single("name", ValueType::Text)))
        .build()
        .unwrap();
    Arc::new(registry)
}

/// Project with one team member and one task owned by `owner`
fn project_with_task(
    graph: &mut Graph,
    owner: Option<InstanceId>,
) -> (InstanceId, InstanceId, InstanceId) {
    let project = create(graph, "Project").unwrap();
    let member = create(graph, "Member").unwrap();
    let task = create(graph, "Task").unwrap();
    add(graph, project, "team", member).unwrap();
    add(graph, project, "tasks", task).unwrap();
    set(graph, task, "owner", owner.unwrap_or(member)).unwrap();
    (project, member, task)
}

#[test]
fn test_conditional_deletion_follows_resolved_companion() {
    // GIVEN a task owned by a member of the project's team
    let mut graph = Graph::new(project_registry(true));
    let (project, member, task) = project_with_task(&mut graph, None);

    // WHEN deleting the project
    delete(&mut graph, project).unwrap();

    // THEN the owner is in the closure, so the task goes too
    assert!(graph.is_deleted(member).unwrap());
    assert!(graph.is_deleted(task).unwrap());
}

#[test]
fn test_conditional_deletion_keeps_task_with_outside_owner() {
    // GIVEN a task owned by someone outside the project
    let mut graph = Graph::new(project_registry(true));
    let outsider = create(&mut graph, "Member").unwrap();
    let (project, member, task) = project_with_task(&mut graph, Some(outsider));

    // WHEN deleting the project
    delete(&mut graph, project).unwrap();

    // THEN the task and its owner survive and the project no longer lists it
    assert!(graph.is_deleted(member).unwrap());
    assert!(!graph.is_deleted(task).unwrap());
    assert!(!graph.is_deleted(outsider).unwrap());
    assert_eq!(read(&graph, task, "owner").unwrap(), Value::Ref(outsider));
    assert!(read_refs(&graph, project, "tasks").unwrap().is_empty());
}

#[test]
fn test_conditional_deletion_is_single_pass() {
    // GIVEN tasks declared before the team that resolves their owner
    let mut graph = Graph::new(project_registry(false));
    let (project, member, task) = project_with_task(&mut graph, None);

    // WHEN deleting the project
    delete(&mut graph, project).unwrap();

    // THEN the task was examined before its owner joined the closure and is kept
    assert!(graph.is_deleted(member).unwrap());
    assert!(!graph.is_deleted(task).unwrap());
}

#[test]
fn test_deletion_notifies_then_releases_subscribers() {
    let mut graph = Graph::new(folder_item_registry());
    let item = create(&mut graph, "Item").unwrap();
    let seen: Rc<RefCell<Vec<ChangeKind>>> = Rc::default();
    let sink = seen.clone();
    graph.subscribe(item, move |event| sink.borrow_mut().push(event.kind.clone()));

    delete(&mut graph, item).unwrap();
    undelete(&mut graph, item, false).unwrap();

    assert_eq!(seen.borrow().as_slice(), &[ChangeKind::Deleted]);
}

#[test]
fn test_deserialization_is_silent() {
    // GIVEN an edit log and a subscriber-free graph
    let mut graph = Graph::new(folder_item_registry());
    let log = RecordingEditLog::new();
    graph.set_edit_log(log.clone());
    let id = InstanceId::new();

    // WHEN a codec rebuilds an instance with a known id
    create_for_deserialize(&mut graph, "Folder", id).unwrap();
    set(&mut graph, id, "name", "restored").unwrap();
    end_deserialize(&mut graph, id).unwrap();

    // THEN nothing was recorded and the instance is clean
    assert!(log.records().is_empty());
    assert!(!graph.is_modified(id).unwrap());
    assert_eq!(read(&graph, id, "name").unwrap(), Value::from("restored"));

    // AND the same id cannot be allocated twice
    assert!(matches!(
        create_for_deserialize(&mut graph, "Folder", id).unwrap_err(),
        ModelError::Internal { .. }
    ));
}

#[test]
fn test_serialization_hooks() {
    // GIVEN hooks around serialization
    let registry = Registry::builder()
        .entity(EntityDecl::new("Doc").property(PropertyDecl::list("trail", ValueType::Text)))
        .hook("Doc", HookKind::BeforeSerialize, |g, id| add(g, id, "trail", "saving"))
        .hook("Doc", HookKind::AfterDeserialize, |g, id| add(g, id, "trail", "loaded"))
        .build()
        .unwrap();
    let mut graph = Graph::new(Arc::new(registry));
    let doc = create(&mut graph, "Doc").unwrap();

    // WHEN serializing, then re-reading in place
    before_serialize(&mut graph, doc).unwrap();
    clear_modified(&mut graph, doc).unwrap();
    begin_deserialize(&mut graph, doc).unwrap();
    end_deserialize(&mut graph, doc).unwrap();

    // THEN both hooks ran and the instance is not modified
    assert_eq!(
        read(&graph, doc, "trail").unwrap(),
        Value::List(vec![Value::from("saving"), Value::from("loaded")])
    );
    assert!(!graph.is_modified(doc).unwrap());
}

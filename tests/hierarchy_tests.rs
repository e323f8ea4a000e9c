//! Integration tests for the closure-table hierarchy engine.
//!
//! These tests run against an in-memory SQLite database and check the
//! closure rows directly after every mutation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tasknest::db::Database;
use tasknest::error::{ErrorCode, TaskError};
use tasknest::notify::{ChangeKind, MemorySink};
use tasknest::types::{HierarchyEdge, NewTask, TaskId};

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

const USER: i64 = 1;

fn add(db: &Database, name: &str, parent: Option<TaskId>) -> TaskId {
    let input = match parent {
        Some(p) => NewTask::named(name).under(p),
        None => NewTask::named(name),
    };
    db.add_task(USER, input).expect("Failed to add task").task.id
}

fn edge(ancestor: TaskId, descendant: TaskId, depth: i64) -> HierarchyEdge {
    HierarchyEdge {
        ancestor,
        descendant,
        depth,
    }
}

fn edges(db: &Database) -> BTreeSet<HierarchyEdge> {
    db.get_hierarchy_edges(USER)
        .expect("Failed to read closure rows")
        .into_iter()
        .collect()
}

/// Closure rows implied by walking parent pointers.
fn edges_from_parents(db: &Database) -> BTreeSet<HierarchyEdge> {
    let tasks: Vec<_> = db
        .get_forest(USER)
        .unwrap()
        .into_iter()
        .flat_map(|tree| {
            let mut all = Vec::new();
            let mut stack = vec![tree];
            while let Some(mut node) = stack.pop() {
                stack.append(&mut node.subtasks);
                all.push(node.task);
            }
            all
        })
        .collect();
    let parents: HashMap<TaskId, Option<TaskId>> =
        tasks.iter().map(|t| (t.id, t.parent_id)).collect();

    let mut expected = BTreeSet::new();
    for task in &tasks {
        expected.insert(edge(task.id, task.id, 0));
        let mut depth = 1;
        let mut current = task.parent_id;
        while let Some(ancestor) = current {
            expected.insert(edge(ancestor, task.id, depth));
            depth += 1;
            current = parents[&ancestor];
        }
    }
    expected
}

mod insert_tests {
    use super::*;

    #[test]
    fn root_task_has_only_self_row() {
        let db = setup_db();
        let root = add(&db, "Root", None);

        assert_eq!(edges(&db), BTreeSet::from([edge(root, root, 0)]));
    }

    #[test]
    fn subtask_copies_parent_chain() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let a = add(&db, "A", Some(r));
        let b = add(&db, "B", Some(a));

        let expected = BTreeSet::from([
            edge(r, r, 0),
            edge(a, a, 0),
            edge(r, a, 1),
            edge(b, b, 0),
            edge(a, b, 1),
            edge(r, b, 2),
        ]);
        assert_eq!(edges(&db), expected);
    }

    #[test]
    fn add_under_missing_parent_is_not_found() {
        let db = setup_db();
        let err = db
            .add_task(USER, NewTask::named("Orphan").under(404))
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(edges(&db).is_empty());
    }

    #[test]
    fn add_under_another_users_task_is_not_found() {
        let db = setup_db();
        let theirs = add(&db, "Theirs", None);

        let err = db
            .add_task(2, NewTask::named("Mine").under(theirs))
            .unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
    }

    #[test]
    fn add_with_negative_parent_is_invalid() {
        let db = setup_db();
        let err = db
            .add_task(USER, NewTask::named("Bad").under(-3))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn returned_tree_reports_parent_and_depth() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let tree = db.add_task(USER, NewTask::named("Child").under(r)).unwrap();

        assert_eq!(tree.task.parent_id, Some(r));
        assert_eq!(tree.depth, 0);
        assert!(tree.subtasks.is_empty());
        assert_eq!(tree.task.canvas_shape.as_deref(), Some("rounded"));
    }
}

mod query_tests {
    use super::*;

    #[test]
    fn ancestors_run_from_self_to_root() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let a = add(&db, "A", Some(r));
        let b = add(&db, "B", Some(a));

        let ancestors: Vec<_> = db
            .get_ancestors(USER, b)
            .unwrap()
            .into_iter()
            .map(|e| e.ancestor)
            .collect();
        assert_eq!(ancestors, vec![b, a, r]);
        assert_eq!(db.get_root_of(USER, b).unwrap(), r);
        assert_eq!(db.get_root_of(USER, r).unwrap(), r);
    }

    #[test]
    fn descendants_are_ordered_by_depth() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let a = add(&db, "A", Some(r));
        let b = add(&db, "B", Some(r));
        let c = add(&db, "C", Some(a));

        let descendants: Vec<_> = db
            .get_descendants(USER, r)
            .unwrap()
            .into_iter()
            .map(|e| (e.descendant, e.depth))
            .collect();
        assert_eq!(descendants, vec![(r, 0), (a, 1), (b, 1), (c, 2)]);
    }

    #[test]
    fn tree_nests_subtasks_in_id_order() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let a = add(&db, "A", Some(r));
        let b = add(&db, "B", Some(r));
        let c = add(&db, "C", Some(a));

        let tree = db.get_task_with_subtasks(USER, r).unwrap().unwrap();
        let children: Vec<_> = tree.subtasks.iter().map(|t| t.task.id).collect();
        assert_eq!(children, vec![a, b]);
        assert_eq!(tree.subtasks[0].subtasks[0].task.id, c);
        assert_eq!(tree.subtasks[0].subtasks[0].depth, 2);
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn subtree_of_inner_node_starts_at_that_node() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let a = add(&db, "A", Some(r));
        let c = add(&db, "C", Some(a));

        let tree = db.get_task_with_subtasks(USER, a).unwrap().unwrap();
        assert_eq!(tree.task.id, a);
        assert_eq!(tree.depth, 0);
        assert!(tree.find(c).is_some());
        assert!(tree.find(r).is_none());
    }

    #[test]
    fn other_users_cannot_read_the_tree() {
        let db = setup_db();
        let r = add(&db, "R", None);

        assert!(db.get_task_with_subtasks(2, r).unwrap().is_none());
        assert!(db.get_ancestors(2, r).is_err());
    }
}

mod move_tests {
    use super::*;

    #[test]
    fn move_subtree_to_new_parent() {
        let db = setup_db();
        let r1 = add(&db, "R1", None);
        let a = add(&db, "A", Some(r1));
        let b = add(&db, "B", Some(a));
        let r2 = add(&db, "R2", None);
        let x = add(&db, "X", Some(r2));

        assert!(db.move_subtask(USER, a, Some(x)));

        let task = db.get_task(USER, a).unwrap().unwrap();
        assert_eq!(task.parent_id, Some(x));

        let rows = edges(&db);
        assert!(!rows.iter().any(|e| e.ancestor == r1 && e.descendant != r1));
        assert!(rows.contains(&edge(x, a, 1)));
        assert!(rows.contains(&edge(r2, a, 2)));
        assert!(rows.contains(&edge(x, b, 2)));
        assert!(rows.contains(&edge(r2, b, 3)));
        assert!(rows.contains(&edge(a, b, 1)));
        assert_eq!(rows, edges_from_parents(&db));
    }

    #[test]
    fn move_to_root_detaches_subtree() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let a = add(&db, "A", Some(r));
        let b = add(&db, "B", Some(a));

        let tree = db.try_move_subtask(USER, a, None).unwrap();
        assert!(tree.task.is_root());
        assert_eq!(tree.subtasks[0].task.id, b);

        let rows = edges(&db);
        assert!(!rows.contains(&edge(r, a, 1)));
        assert!(!rows.contains(&edge(r, b, 2)));
        assert!(rows.contains(&edge(a, b, 1)));
    }

    #[test]
    fn move_within_same_tree_recomputes_depths() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let a = add(&db, "A", Some(r));
        let b = add(&db, "B", Some(a));
        let c = add(&db, "C", Some(b));
        let d = add(&db, "D", Some(c));

        // Lift C (with D) directly under R
        assert!(db.move_subtask(USER, c, Some(r)));

        let rows = edges(&db);
        assert!(rows.contains(&edge(r, c, 1)));
        assert!(rows.contains(&edge(r, d, 2)));
        assert!(!rows.iter().any(|e| e.ancestor == a && e.descendant == c));
        assert!(!rows.iter().any(|e| e.ancestor == b && e.descendant == d));
        assert_eq!(rows, edges_from_parents(&db));
    }

    #[test]
    fn move_under_own_descendant_is_rejected_without_changes() {
        for depth in 1..=5 {
            let db = setup_db();
            let top = add(&db, "Top", None);
            let mut chain = vec![top];
            for i in 0..depth {
                let parent = *chain.last().unwrap();
                chain.push(add(&db, &format!("level {}", i), Some(parent)));
            }
            let deepest = *chain.last().unwrap();
            let before = edges(&db);

            assert!(!db.move_subtask(USER, top, Some(deepest)));
            let err = db.try_move_subtask(USER, top, Some(deepest)).unwrap_err();
            assert_eq!(err.code(), ErrorCode::Cycle);

            assert_eq!(edges(&db), before, "depth {}", depth);
            assert!(db.get_task(USER, top).unwrap().unwrap().parent_id.is_none());
        }
    }

    #[test]
    fn move_under_self_is_invalid() {
        let db = setup_db();
        let r = add(&db, "R", None);

        let err = db.try_move_subtask(USER, r, Some(r)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn move_to_missing_parent_is_not_found() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let a = add(&db, "A", Some(r));
        let before = edges(&db);

        let err = db.try_move_subtask(USER, a, Some(999)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(!db.move_subtask(USER, 999, Some(r)));
        assert_eq!(edges(&db), before);
    }

    #[test]
    fn move_across_users_is_rejected() {
        let db = setup_db();
        let mine = add(&db, "Mine", None);
        let theirs = db.add_task(2, NewTask::named("Theirs")).unwrap().task.id;

        assert!(!db.move_subtask(USER, mine, Some(theirs)));
        assert!(!db.move_subtask(2, theirs, Some(mine)));
    }

    #[test]
    fn repeated_moves_keep_closure_consistent() {
        let db = setup_db();
        let mut ids = Vec::new();
        for i in 0..24 {
            // Deterministic shape: every task hangs under an earlier one, some roots
            let parent = if i % 5 == 0 { None } else { Some(ids[(i * 7) % i]) };
            ids.push(add(&db, &format!("t{}", i), parent));
        }

        let moves = [(3, Some(0)), (7, Some(12)), (12, None), (15, Some(3)), (1, Some(20))];
        for (task, parent) in moves {
            db.move_subtask(USER, ids[task], parent.map(|p: usize| ids[p]));
        }

        assert_eq!(edges(&db), edges_from_parents(&db));
        assert!(db.check_hierarchy(USER).unwrap().is_consistent());
    }
}

mod delete_tests {
    use super::*;

    #[test]
    fn delete_removes_subtree_and_its_rows() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let a = add(&db, "A", Some(r));
        let b = add(&db, "B", Some(a));
        let other = add(&db, "Other", None);

        assert!(db.delete_task(USER, a));

        assert!(db.get_task(USER, a).unwrap().is_none());
        assert!(db.get_task(USER, b).unwrap().is_none());
        assert!(db.get_task(USER, r).unwrap().is_some());

        let rows = edges(&db);
        assert!(!rows.iter().any(|e| [a, b].contains(&e.ancestor) || [a, b].contains(&e.descendant)));
        assert_eq!(rows, BTreeSet::from([edge(r, r, 0), edge(other, other, 0)]));
    }

    #[test]
    fn delete_missing_task_returns_false() {
        let db = setup_db();
        add(&db, "R", None);
        let before = edges(&db);

        assert!(!db.delete_task(USER, 12345));
        assert!(!db.try_delete_task(USER, 12345).unwrap());
        assert_eq!(edges(&db), before);
    }

    #[test]
    fn delete_of_other_users_task_returns_false() {
        let db = setup_db();
        let r = add(&db, "R", None);

        assert!(!db.delete_task(2, r));
        assert!(db.get_task(USER, r).unwrap().is_some());
    }

    #[test]
    fn failed_delete_rolls_back_and_returns_false() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let c = add(&db, "C", Some(r));

        // Without the (R, C) row the delete misses C and R's removal
        // trips the parent_id foreign key mid-transaction
        db.transaction(|tx| {
            tx.execute(
                "DELETE FROM task_hierarchy WHERE ancestor = ?1 AND descendant = ?2",
                [r, c],
            )?;
            Ok(())
        })
        .unwrap();
        let before = edges(&db);

        assert!(!db.delete_task(USER, r));

        assert!(db.get_task(USER, r).unwrap().is_some());
        assert!(db.get_task(USER, c).unwrap().is_some());
        assert_eq!(before, BTreeSet::from([edge(r, r, 0), edge(c, c, 0)]));
        assert_eq!(edges(&db), before);

        let err = db.try_delete_task(USER, r).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TransactionFailure);
    }

    #[test]
    fn delete_removes_dependency_edges_of_subtree() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let child = add(&db, "Child", Some(r));
        let outside = add(&db, "Outside", None);
        let later = add(&db, "Later", None);
        db.add_dependency(USER, child, outside).unwrap();
        let kept = db.add_dependency(USER, outside, later).unwrap();

        assert!(db.delete_task(USER, r));

        assert_eq!(db.get_user_dependencies(USER).unwrap(), vec![kept]);
    }
}

mod maintenance_tests {
    use super::*;

    #[test]
    fn fresh_store_is_consistent() {
        let db = setup_db();
        let r = add(&db, "R", None);
        add(&db, "A", Some(r));

        let report = db.check_hierarchy(USER).unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.tasks_checked, 2);
    }

    #[test]
    fn check_reports_damage_and_rebuild_repairs_it() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let a = add(&db, "A", Some(r));
        let b = add(&db, "B", Some(a));

        db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM task_hierarchy WHERE ancestor = ?1 AND descendant = ?2",
                [r, b],
            )?;
            conn.execute(
                "UPDATE task_hierarchy SET depth = 5 WHERE ancestor = ?1 AND descendant = ?2",
                [a, b],
            )?;
            conn.execute(
                "INSERT INTO task_hierarchy (ancestor, descendant, depth) VALUES (?1, ?2, 1)",
                [b, r],
            )?;
            Ok(())
        })
        .unwrap();

        let report = db.check_hierarchy(USER).unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.missing, vec![edge(r, b, 2)]);
        assert_eq!(report.wrong_depth, vec![edge(a, b, 1)]);
        assert_eq!(report.stale, vec![edge(b, r, 1)]);

        let rows = db.rebuild_hierarchy(USER).unwrap();
        assert_eq!(rows, 6);
        assert!(db.check_hierarchy(USER).unwrap().is_consistent());
        assert_eq!(edges(&db), edges_from_parents(&db));
    }
}

mod scenario_tests {
    use super::*;

    #[test]
    fn create_move_delete_round() {
        let db = setup_db();
        let r = add(&db, "R", None);
        let s1 = add(&db, "S1", Some(r));
        let s2 = add(&db, "S2", Some(s1));

        let rows = edges(&db);
        assert!(rows.contains(&edge(r, s2, 2)));
        assert!(rows.contains(&edge(s1, s2, 1)));
        assert!(rows.contains(&edge(s2, s2, 0)));

        assert!(db.move_subtask(USER, s1, None));
        let rows = edges(&db);
        assert!(!rows.iter().any(|e| e.ancestor == r && e.descendant == s1));
        assert!(!rows.iter().any(|e| e.ancestor == r && e.descendant == s2));
        assert!(rows.contains(&edge(s1, s2, 1)));

        assert!(db.delete_task(USER, r));
        assert!(db.get_task(USER, r).unwrap().is_none());
        assert!(db.get_task(USER, s1).unwrap().is_some());
        assert!(db.get_task(USER, s2).unwrap().is_some());
        assert_eq!(
            edges(&db),
            BTreeSet::from([edge(s1, s1, 0), edge(s2, s2, 0), edge(s1, s2, 1)])
        );
    }

    #[test]
    fn mutations_publish_change_notices() {
        let sink = Arc::new(MemorySink::new());
        let db = setup_db().with_sink(sink.clone());

        let r = add(&db, "R", None);
        let a = add(&db, "A", Some(r));
        db.toggle_task_completion(USER, a).unwrap();
        assert!(!db.move_subtask(USER, r, Some(a)));
        assert!(db.move_subtask(USER, a, None));
        assert!(db.delete_task(USER, r));

        let kinds: Vec<_> = sink.drain().into_iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::TaskCreated,
                ChangeKind::TaskCreated,
                ChangeKind::TaskCompleted,
                ChangeKind::TaskUpdated,
                ChangeKind::TaskDeleted,
            ]
        );
    }

    #[test]
    fn created_notice_carries_snapshot_and_date() {
        let sink = Arc::new(MemorySink::new());
        let db = setup_db().with_sink(sink.clone());
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();

        let tree = db
            .add_task(USER, NewTask::named("Dated").created_on(day))
            .unwrap();

        let notices = sink.drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].task_id, Some(tree.task.id));
        assert_eq!(notices[0].date.as_deref(), Some("2024-03-04"));
        assert_eq!(notices[0].snapshot.as_ref(), Some(&tree));
        assert_eq!(notices[0].room(), "user_1");
    }
}

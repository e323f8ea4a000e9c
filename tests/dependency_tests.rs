//! Integration tests for the dependency graph.

use std::sync::Arc;
use tasknest::db::Database;
use tasknest::error::{ErrorCode, TaskError};
use tasknest::notify::{ChangeKind, MemorySink};
use tasknest::types::{NewTask, TaskId};

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

const USER: i64 = 1;

fn add(db: &Database, name: &str) -> TaskId {
    db.add_task(USER, NewTask::named(name))
        .expect("Failed to add task")
        .task
        .id
}

mod edge_tests {
    use super::*;

    #[test]
    fn add_and_list_dependency() {
        let db = setup_db();
        let a = add(&db, "A");
        let b = add(&db, "B");

        let dep = db.add_dependency(USER, a, b).unwrap();
        assert_eq!(dep.source_task_id, a);
        assert_eq!(dep.target_task_id, b);

        let a_deps = db.get_task_dependencies(USER, a).unwrap();
        assert_eq!(a_deps.outgoing, vec![dep]);
        assert!(a_deps.incoming.is_empty());

        let b_deps = db.get_task_dependencies(USER, b).unwrap();
        assert_eq!(b_deps.incoming, vec![dep]);
        assert_eq!(db.get_user_dependencies(USER).unwrap(), vec![dep]);
    }

    #[test]
    fn self_dependency_is_invalid() {
        let db = setup_db();
        let a = add(&db, "A");

        let err = db.add_dependency(USER, a, a).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn duplicate_dependency_conflicts() {
        let db = setup_db();
        let a = add(&db, "A");
        let b = add(&db, "B");
        db.add_dependency(USER, a, b).unwrap();

        let err = db.add_dependency(USER, a, b).unwrap_err();
        assert!(matches!(err, TaskError::Conflict(_)));
        assert_eq!(db.get_user_dependencies(USER).unwrap().len(), 1);
    }

    #[test]
    fn missing_endpoint_is_not_found() {
        let db = setup_db();
        let a = add(&db, "A");

        let err = db.add_dependency(USER, a, 777).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        let err = db.add_dependency(USER, 777, a).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn negative_ids_are_invalid() {
        let db = setup_db();
        let a = add(&db, "A");

        let err = db.add_dependency(USER, -1, a).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn other_users_tasks_are_not_found() {
        let db = setup_db();
        let a = add(&db, "A");
        let b = add(&db, "B");

        let err = db.add_dependency(2, a, b).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn remove_dependency_by_id() {
        let db = setup_db();
        let a = add(&db, "A");
        let b = add(&db, "B");
        let dep = db.add_dependency(USER, a, b).unwrap();

        db.remove_dependency(USER, dep.id).unwrap();
        assert!(db.get_user_dependencies(USER).unwrap().is_empty());

        let err = db.remove_dependency(USER, dep.id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn edges_publish_notices() {
        let sink = Arc::new(MemorySink::new());
        let db = setup_db().with_sink(sink.clone());
        let a = add(&db, "A");
        let b = add(&db, "B");
        sink.drain();

        let dep = db.add_dependency(USER, a, b).unwrap();
        db.remove_dependency(USER, dep.id).unwrap();
        let _ = db.add_dependency(USER, a, a);

        let notices = sink.drain();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].kind, ChangeKind::DependencyAdded);
        assert_eq!(notices[0].dependency, Some(dep));
        assert_eq!(notices[1].kind, ChangeKind::DependencyRemoved);
    }
}

mod cycle_tests {
    use super::*;

    #[test]
    fn closing_edge_of_chain_is_rejected() {
        for len in 2..=8 {
            let db = setup_db();
            let ids: Vec<_> = (0..len).map(|i| add(&db, &format!("t{}", i))).collect();
            for pair in ids.windows(2) {
                db.add_dependency(USER, pair[0], pair[1]).unwrap();
            }

            let err = db
                .add_dependency(USER, ids[len - 1], ids[0])
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::Cycle, "chain of {}", len);
            assert_eq!(db.get_user_dependencies(USER).unwrap().len(), len - 1);
        }
    }

    #[test]
    fn back_edge_into_middle_of_chain_is_rejected() {
        let db = setup_db();
        let a = add(&db, "A");
        let b = add(&db, "B");
        let c = add(&db, "C");
        let d = add(&db, "D");
        db.add_dependency(USER, a, b).unwrap();
        db.add_dependency(USER, b, c).unwrap();
        db.add_dependency(USER, c, d).unwrap();

        let err = db.add_dependency(USER, d, b).unwrap_err();
        assert!(matches!(err, TaskError::Cycle(_)));
    }

    #[test]
    fn diamond_is_accepted() {
        let db = setup_db();
        let a = add(&db, "A");
        let b = add(&db, "B");
        let c = add(&db, "C");
        let d = add(&db, "D");

        db.add_dependency(USER, a, b).unwrap();
        db.add_dependency(USER, a, c).unwrap();
        db.add_dependency(USER, b, d).unwrap();
        db.add_dependency(USER, c, d).unwrap();
        // A transitive shortcut is still acyclic
        db.add_dependency(USER, a, d).unwrap();

        assert_eq!(db.get_user_dependencies(USER).unwrap().len(), 5);
    }

    #[test]
    fn edges_of_other_users_do_not_form_cycles() {
        let db = setup_db();
        let a = add(&db, "A");
        let b = add(&db, "B");
        db.add_dependency(USER, a, b).unwrap();

        let x = db.add_task(2, NewTask::named("X")).unwrap().task.id;
        let y = db.add_task(2, NewTask::named("Y")).unwrap().task.id;
        db.add_dependency(2, x, y).unwrap();
        db.add_dependency(2, y, x).unwrap_err();

        assert_eq!(db.get_user_dependencies(2).unwrap().len(), 1);
        assert_eq!(db.get_user_dependencies(USER).unwrap().len(), 1);
    }
}

mod blocked_tests {
    use super::*;

    #[test]
    fn target_is_blocked_until_source_completes() {
        let db = setup_db();
        let a = add(&db, "A");
        let b = add(&db, "B");
        let c = add(&db, "C");
        db.add_dependency(USER, a, b).unwrap();
        db.add_dependency(USER, a, c).unwrap();

        let blocked: Vec<_> = db
            .get_blocked_tasks(USER)
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(blocked, vec![b, c]);

        db.toggle_task_completion(USER, a).unwrap();
        assert!(db.get_blocked_tasks(USER).unwrap().is_empty());
    }

    #[test]
    fn completed_target_is_not_blocked() {
        let db = setup_db();
        let a = add(&db, "A");
        let b = add(&db, "B");
        db.add_dependency(USER, a, b).unwrap();
        db.toggle_task_completion(USER, b).unwrap();

        assert!(db.get_blocked_tasks(USER).unwrap().is_empty());
    }
}

//! Integration tests for the engine services.
//!
//! These run against an in-memory SQLite database with a pinned clock, so
//! every scheduling assertion is deterministic.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use task_engine::db::tasks::{NewTask, TaskUpdate};
use task_engine::db::templates::{NewTemplate, TemplateUpdate};
use task_engine::types::{
    Priority, RecurrenceConfig, RecurrencePattern, Task, TaskStatus,
};
use task_engine::{
    Database, DependencyGraphService, EngineError, FixedClock, LifecycleCoordinator,
    RecurrenceScheduler, SystemClock,
};

fn setup_db() -> Database {
    Database::open_in_memory().expect("failed to create in-memory database")
}

fn graph(db: &Database) -> DependencyGraphService {
    DependencyGraphService::new(db.clone(), Arc::new(SystemClock))
}

fn lifecycle(db: &Database) -> LifecycleCoordinator {
    LifecycleCoordinator::new(db.clone(), Arc::new(SystemClock))
}

fn scheduler_at(db: &Database, instant: DateTime<Utc>) -> RecurrenceScheduler {
    RecurrenceScheduler::new(db.clone(), Arc::new(FixedClock(instant)))
}

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn make_task(lc: &LifecycleCoordinator, title: &str) -> Task {
    lc.create_task(&NewTask {
        title: title.to_string(),
        ..Default::default()
    })
    .expect("failed to create task")
}

fn template_input(project_id: &str, pattern: RecurrencePattern) -> NewTemplate {
    NewTemplate {
        id: None,
        title: "Weekly report".to_string(),
        description: Some("Write the report".to_string()),
        priority: Priority::High,
        estimated_hours: Some(2.0),
        project_id: project_id.to_string(),
        pattern,
        config: RecurrenceConfig::default(),
    }
}

mod dependency_graph_tests {
    use super::*;

    #[test]
    fn self_dependency_is_invalid() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);
        let a = make_task(&lc, "A");

        let err = svc.add_dependency(&a.id, &a.id).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn unknown_tasks_are_not_found() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);
        let a = make_task(&lc, "A");

        let err = svc.add_dependency(&a.id, "missing").unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));

        let err = svc.add_dependency("missing", &a.id).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn duplicate_edge_already_exists() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);
        let a = make_task(&lc, "A");
        let b = make_task(&lc, "B");

        svc.add_dependency(&a.id, &b.id).unwrap();
        let err = svc.add_dependency(&a.id, &b.id).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists { .. }));
    }

    #[test]
    fn reverse_edge_would_create_cycle() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);
        let a = make_task(&lc, "A");
        let b = make_task(&lc, "B");

        svc.add_dependency(&a.id, &b.id).unwrap();
        let err = svc.add_dependency(&b.id, &a.id).unwrap_err();
        assert!(matches!(err, EngineError::WouldCreateCycle { .. }));
    }

    #[test]
    fn transitive_cycle_is_rejected() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);
        let a = make_task(&lc, "A");
        let b = make_task(&lc, "B");
        let c = make_task(&lc, "C");

        svc.add_dependency(&a.id, &b.id).unwrap();
        svc.add_dependency(&b.id, &c.id).unwrap();

        // C -> A would close A -> B -> C -> A.
        let err = svc.add_dependency(&c.id, &a.id).unwrap_err();
        assert!(matches!(err, EngineError::WouldCreateCycle { .. }));
    }

    #[test]
    fn diamond_shape_is_not_a_cycle() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);
        let a = make_task(&lc, "A");
        let b = make_task(&lc, "B");
        let c = make_task(&lc, "C");
        let d = make_task(&lc, "D");

        svc.add_dependency(&a.id, &b.id).unwrap();
        svc.add_dependency(&a.id, &c.id).unwrap();
        svc.add_dependency(&b.id, &d.id).unwrap();
        svc.add_dependency(&c.id, &d.id).unwrap();

        let err = svc.add_dependency(&d.id, &a.id).unwrap_err();
        assert!(matches!(err, EngineError::WouldCreateCycle { .. }));
    }

    /// Random DAG-preserving insertions are all accepted, adversarial
    /// reversals are all rejected, and the final edge set topologically
    /// sorts (i.e. contains no directed cycle).
    #[test]
    fn random_insertions_preserve_acyclicity() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);

        let tasks: Vec<Task> = (0..12).map(|i| make_task(&lc, &format!("T{}", i))).collect();

        let mut seed: u64 = 0x5eed_1234_dead_beef;
        let mut next = move || {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (seed >> 33) as usize
        };

        // Only insert edges from a lower index to a higher one, which keeps
        // the graph a DAG by construction; every such insert must succeed.
        let mut inserted: Vec<(usize, usize)> = Vec::new();
        for _ in 0..60 {
            let i = next() % tasks.len();
            let j = next() % tasks.len();
            if i == j {
                continue;
            }
            let (lo, hi) = if i < j { (i, j) } else { (j, i) };
            match svc.add_dependency(&tasks[lo].id, &tasks[hi].id) {
                Ok(()) => inserted.push((lo, hi)),
                Err(EngineError::AlreadyExists { .. }) => {}
                Err(other) => panic!("DAG-preserving insert rejected: {}", other),
            }
        }
        assert!(!inserted.is_empty());

        // Every reversal of an accepted edge must be rejected as a cycle.
        for (lo, hi) in &inserted {
            let err = svc.add_dependency(&tasks[*hi].id, &tasks[*lo].id).unwrap_err();
            assert!(matches!(err, EngineError::WouldCreateCycle { .. }));
        }

        // Kahn's algorithm consumes every node iff the edge set is acyclic.
        let edges = db.get_all_dependencies().unwrap();
        let mut indegree: HashMap<String, usize> =
            tasks.iter().map(|t| (t.id.clone(), 0)).collect();
        let mut outgoing: HashMap<String, Vec<String>> = HashMap::new();
        for edge in &edges {
            *indegree.get_mut(&edge.prerequisite_task_id).unwrap() += 1;
            outgoing
                .entry(edge.dependent_task_id.clone())
                .or_default()
                .push(edge.prerequisite_task_id.clone());
        }
        let mut queue: VecDeque<String> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| id.clone())
            .collect();
        let mut seen = 0;
        while let Some(id) = queue.pop_front() {
            seen += 1;
            for target in outgoing.get(&id).cloned().unwrap_or_default() {
                let d = indegree.get_mut(&target).unwrap();
                *d -= 1;
                if *d == 0 {
                    queue.push_back(target);
                }
            }
        }
        assert_eq!(seen, tasks.len(), "edge set contains a directed cycle");
    }

    #[test]
    fn remove_dependency_unblocks_and_is_not_idempotent() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);
        let a = make_task(&lc, "A");
        let b = make_task(&lc, "B");

        svc.add_dependency(&a.id, &b.id).unwrap();
        assert!(svc.is_blocked(&a.id).unwrap());

        svc.remove_dependency(&a.id, &b.id).unwrap();
        assert!(!svc.is_blocked(&a.id).unwrap());

        let err = svc.remove_dependency(&a.id, &b.id).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn is_blocked_flips_when_prerequisite_completes() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);
        let a = make_task(&lc, "A");
        let b = make_task(&lc, "B");

        svc.add_dependency(&a.id, &b.id).unwrap();
        assert!(svc.is_blocked(&a.id).unwrap());

        lc.request_status_change(&b.id, TaskStatus::Done).unwrap();
        assert!(!svc.is_blocked(&a.id).unwrap());
    }

    #[test]
    fn is_blocked_unknown_task_not_found() {
        let db = setup_db();
        let svc = graph(&db);
        let err = svc.is_blocked("missing").unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn list_blocked_reports_unresolved_prerequisites() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);
        let a = make_task(&lc, "A");
        let b = make_task(&lc, "B");
        let c = make_task(&lc, "C");

        svc.add_dependency(&a.id, &b.id).unwrap();
        svc.add_dependency(&a.id, &c.id).unwrap();
        lc.request_status_change(&b.id, TaskStatus::Done).unwrap();

        let blocked = svc.list_blocked().unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].task.id, a.id);
        assert_eq!(blocked[0].unresolved.len(), 1);
        assert_eq!(blocked[0].unresolved[0].id, c.id);
    }

    #[test]
    fn dependency_chain_walks_prerequisites_and_dependents() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);
        let a = make_task(&lc, "A");
        let b = make_task(&lc, "B");
        let c = make_task(&lc, "C");

        svc.add_dependency(&a.id, &b.id).unwrap();
        svc.add_dependency(&b.id, &c.id).unwrap();

        let chain = svc.dependency_chain(&a.id).unwrap();
        assert_eq!(chain.prerequisites.len(), 1);
        assert_eq!(chain.prerequisites[0].id, b.id);
        assert_eq!(chain.prerequisites[0].prerequisites.len(), 1);
        assert_eq!(chain.prerequisites[0].prerequisites[0].id, c.id);
        assert!(chain.dependents.is_empty());

        let chain = svc.dependency_chain(&c.id).unwrap();
        assert!(chain.prerequisites.is_empty());
        let dependent_ids: HashSet<&str> =
            chain.dependents.iter().map(|d| d.id.as_str()).collect();
        assert!(dependent_ids.contains(a.id.as_str()));
        assert!(dependent_ids.contains(b.id.as_str()));
    }
}

mod lifecycle_tests {
    use super::*;

    #[test]
    fn blocked_transition_names_the_prerequisite_then_succeeds() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);
        let a = make_task(&lc, "Ship release");
        let b = make_task(&lc, "Run test suite");

        svc.add_dependency(&a.id, &b.id).unwrap();

        let err = lc.request_status_change(&a.id, TaskStatus::Done).unwrap_err();
        match &err {
            EngineError::Blocked { task_id, blocking } => {
                assert_eq!(task_id, &a.id);
                assert_eq!(blocking.len(), 1);
                assert_eq!(blocking[0].id, b.id);
                assert_eq!(blocking[0].title, "Run test suite");
            }
            other => panic!("expected Blocked, got {}", other),
        }
        assert!(err.to_string().contains("Run test suite"));

        lc.request_status_change(&b.id, TaskStatus::Done).unwrap();
        let a = lc.request_status_change(&a.id, TaskStatus::Done).unwrap();
        assert_eq!(a.status, TaskStatus::Done);
    }

    #[test]
    fn in_progress_is_gated_too() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);
        let a = make_task(&lc, "A");
        let b = make_task(&lc, "B");

        svc.add_dependency(&a.id, &b.id).unwrap();
        let err = lc
            .request_status_change(&a.id, TaskStatus::InProgress)
            .unwrap_err();
        assert!(matches!(err, EngineError::Blocked { .. }));
    }

    #[test]
    fn ungated_transitions_are_free_while_blocked() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let svc = graph(&db);
        let a = make_task(&lc, "A");
        let b = make_task(&lc, "B");

        svc.add_dependency(&a.id, &b.id).unwrap();

        let a = lc.request_status_change(&a.id, TaskStatus::Review).unwrap();
        assert_eq!(a.status, TaskStatus::Review);
        let a = lc.request_status_change(&a.id, TaskStatus::Todo).unwrap();
        assert_eq!(a.status, TaskStatus::Todo);
    }

    #[test]
    fn done_tasks_may_be_reopened() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let a = make_task(&lc, "A");

        lc.request_status_change(&a.id, TaskStatus::Done).unwrap();
        let a = lc.request_status_change(&a.id, TaskStatus::Todo).unwrap();
        assert_eq!(a.status, TaskStatus::Todo);
    }

    #[test]
    fn update_details_mutates_and_clears_fields() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let a = lc
            .create_task(&NewTask {
                title: "A".to_string(),
                description: Some("old".to_string()),
                ..Default::default()
            })
            .unwrap();

        let updated = lc
            .update_details(
                &a.id,
                &TaskUpdate {
                    title: Some("A2".to_string()),
                    description: Some(None),
                    priority: Some(Priority::High),
                    estimated_hours: Some(Some(4.5)),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.title, "A2");
        assert_eq!(updated.description, None);
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.estimated_hours, Some(4.5));
    }

    #[test]
    fn set_parent_rejects_self_and_ancestry_cycles() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let a = make_task(&lc, "A");
        let b = lc
            .create_task(&NewTask {
                title: "B".to_string(),
                parent_task_id: Some(a.id.clone()),
                ..Default::default()
            })
            .unwrap();

        let err = lc.set_parent(&a.id, Some(&a.id)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));

        // A is B's parent; making B the parent of A would make A its own
        // ancestor.
        let err = lc.set_parent(&a.id, Some(&b.id)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));

        // Detaching is always fine.
        let b = lc.set_parent(&b.id, None).unwrap();
        assert_eq!(b.parent_task_id, None);
    }

    #[test]
    fn create_task_with_unknown_parent_fails() {
        let db = setup_db();
        let lc = lifecycle(&db);

        let err = lc
            .create_task(&NewTask {
                title: "orphan".to_string(),
                parent_task_id: Some("missing".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn archiving_is_a_soft_delete() {
        let db = setup_db();
        let lc = lifecycle(&db);
        let a = make_task(&lc, "A");

        let archived = lc.set_archived(&a.id, true).unwrap();
        assert!(archived.archived);

        // The row survives; nothing in this subsystem hard-deletes tasks.
        let fetched = lc.get_task(&a.id).unwrap();
        assert!(fetched.archived);

        let restored = lc.set_archived(&a.id, false).unwrap();
        assert!(!restored.archived);
    }
}

mod scheduler_tests {
    use super::*;

    fn setup_with_project() -> Database {
        let db = setup_db();
        db.create_project("p1", "Project One", 0).unwrap();
        db
    }

    #[test]
    fn create_template_derives_next_generation_from_creation_instant() {
        let db = setup_with_project();
        let t0 = at(2024, 3, 1, 9, 0);
        let sched = scheduler_at(&db, t0);

        let template = sched
            .create_template(&template_input("p1", RecurrencePattern::Daily))
            .unwrap();

        assert!(template.active);
        assert_eq!(template.last_generated_at, None);
        assert_eq!(
            template.next_generation_at,
            at(2024, 3, 2, 9, 0).timestamp_millis()
        );
    }

    #[test]
    fn create_template_rejects_malformed_config() {
        let db = setup_with_project();
        let sched = scheduler_at(&db, at(2024, 3, 1, 9, 0));

        let mut input = template_input("p1", RecurrencePattern::Weekly);
        input.config.day_of_week = Some(9);
        let err = sched.create_template(&input).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn due_template_generates_a_stamped_instance() {
        let db = setup_with_project();
        let t0 = at(2024, 3, 1, 9, 0);
        let template = scheduler_at(&db, t0)
            .create_template(&template_input("p1", RecurrencePattern::Daily))
            .unwrap();

        let t1 = at(2024, 3, 2, 9, 0);
        let report = scheduler_at(&db, t1).generate_due_templates().unwrap();

        assert_eq!(report.generated_count(), 1);
        assert!(report.failures.is_empty());

        let instance = &report.generated[0];
        assert_eq!(instance.title, "Weekly report");
        assert_eq!(instance.status, TaskStatus::Todo);
        assert_eq!(instance.priority, Priority::High);
        assert_eq!(instance.project_id.as_deref(), Some("p1"));
        assert_eq!(instance.estimated_hours, Some(2.0));
        assert!(instance.is_recurring);
        assert!(instance.needs_acknowledgment);
        assert_eq!(instance.recurring_template_id.as_deref(), Some(template.id.as_str()));

        let template = db.get_template(&template.id).unwrap().unwrap();
        assert_eq!(template.last_generated_at, Some(t1.timestamp_millis()));
        // Advanced from the previous scheduled time, not from now.
        assert_eq!(
            template.next_generation_at,
            at(2024, 3, 3, 9, 0).timestamp_millis()
        );
    }

    #[test]
    fn late_driver_does_not_compress_the_cadence() {
        let db = setup_with_project();
        let t0 = at(2024, 3, 1, 9, 0);
        let template = scheduler_at(&db, t0)
            .create_template(&template_input("p1", RecurrencePattern::Daily))
            .unwrap();

        // The driver was offline for three days past the scheduled time.
        let late = at(2024, 3, 5, 14, 30);
        let report = scheduler_at(&db, late).generate_due_templates().unwrap();
        assert_eq!(report.generated_count(), 1);

        // Next run derives from the missed 03-02 slot, so the template is
        // still due and the backlog drains one cycle per driver invocation.
        let refreshed = db.get_template(&template.id).unwrap().unwrap();
        assert_eq!(
            refreshed.next_generation_at,
            at(2024, 3, 3, 9, 0).timestamp_millis()
        );

        let report = scheduler_at(&db, late).generate_due_templates().unwrap();
        assert_eq!(report.generated_count(), 1);
        let refreshed = db.get_template(&template.id).unwrap().unwrap();
        assert_eq!(
            refreshed.next_generation_at,
            at(2024, 3, 4, 9, 0).timestamp_millis()
        );
    }

    #[test]
    fn two_runs_for_one_due_cycle_produce_one_instance() {
        let db = setup_with_project();
        let t0 = at(2024, 3, 1, 9, 0);
        scheduler_at(&db, t0)
            .create_template(&template_input("p1", RecurrencePattern::Daily))
            .unwrap();

        let t1 = at(2024, 3, 2, 9, 0);
        let first = scheduler_at(&db, t1).generate_due_templates().unwrap();
        let second = scheduler_at(&db, t1).generate_due_templates().unwrap();

        assert_eq!(first.generated_count(), 1);
        assert_eq!(second.generated_count(), 0);
        assert!(second.failures.is_empty());
    }

    #[test]
    fn inactive_template_is_never_selected() {
        let db = setup_with_project();
        let t0 = at(2024, 3, 1, 9, 0);
        let sched = scheduler_at(&db, t0);
        let template = sched
            .create_template(&template_input("p1", RecurrencePattern::Daily))
            .unwrap();
        sched.set_template_active(&template.id, false).unwrap();

        // A year overdue, still skipped.
        let report = scheduler_at(&db, at(2025, 3, 1, 9, 0))
            .generate_due_templates()
            .unwrap();
        assert_eq!(report.generated_count(), 0);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn one_failing_template_does_not_abort_the_batch() {
        let db = setup_with_project();
        db.create_project("p2", "Doomed", 0).unwrap();

        let t0 = at(2024, 3, 1, 9, 0);
        let sched = scheduler_at(&db, t0);
        let healthy = sched
            .create_template(&template_input("p1", RecurrencePattern::Daily))
            .unwrap();
        let doomed = sched
            .create_template(&template_input("p2", RecurrencePattern::Daily))
            .unwrap();
        let doomed_next = doomed.next_generation_at;

        db.delete_project("p2").unwrap();

        let report = scheduler_at(&db, at(2024, 3, 2, 9, 0))
            .generate_due_templates()
            .unwrap();

        assert_eq!(report.generated_count(), 1);
        assert_eq!(
            report.generated[0].recurring_template_id.as_deref(),
            Some(healthy.id.as_str())
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].template_id, doomed.id);

        // The failed template keeps its scheduled time for a later retry.
        let refreshed = db.get_template(&doomed.id).unwrap().unwrap();
        assert_eq!(refreshed.next_generation_at, doomed_next);
        assert_eq!(refreshed.last_generated_at, None);
    }

    #[test]
    fn manual_trigger_ignores_due_time() {
        let db = setup_with_project();
        let t0 = at(2024, 3, 1, 9, 0);
        let sched = scheduler_at(&db, t0);
        let template = sched
            .create_template(&template_input("p1", RecurrencePattern::Daily))
            .unwrap();

        // next_generation_at is tomorrow, but a manual trigger fires now.
        let instance = sched.trigger_template(&template.id).unwrap();
        assert!(instance.needs_acknowledgment);

        let refreshed = db.get_template(&template.id).unwrap().unwrap();
        assert_eq!(
            refreshed.next_generation_at,
            at(2024, 3, 3, 9, 0).timestamp_millis()
        );
    }

    #[test]
    fn manual_trigger_of_inactive_template_is_invalid() {
        let db = setup_with_project();
        let sched = scheduler_at(&db, at(2024, 3, 1, 9, 0));
        let template = sched
            .create_template(&template_input("p1", RecurrencePattern::Daily))
            .unwrap();
        sched.set_template_active(&template.id, false).unwrap();

        let err = sched.trigger_template(&template.id).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn pattern_change_recomputes_next_generation() {
        let db = setup_with_project();
        // 2024-03-01 is a Friday.
        let t0 = at(2024, 3, 1, 9, 0);
        let sched = scheduler_at(&db, t0);
        let template = sched
            .create_template(&template_input("p1", RecurrencePattern::Daily))
            .unwrap();

        let updated = sched
            .update_template(
                &template.id,
                &TemplateUpdate {
                    pattern: Some(RecurrencePattern::Weekly),
                    config: Some(RecurrenceConfig {
                        day_of_week: Some(1),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .unwrap();

        // Recomputed from the creation instant: next Monday is 03-04.
        assert_eq!(
            updated.next_generation_at,
            at(2024, 3, 4, 9, 0).timestamp_millis()
        );
    }

    #[test]
    fn cosmetic_update_leaves_next_generation_alone() {
        let db = setup_with_project();
        let sched = scheduler_at(&db, at(2024, 3, 1, 9, 0));
        let template = sched
            .create_template(&template_input("p1", RecurrencePattern::Daily))
            .unwrap();

        let updated = sched
            .update_template(
                &template.id,
                &TemplateUpdate {
                    title: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.next_generation_at, template.next_generation_at);
    }

    #[test]
    fn acknowledgment_queue_drains_oldest_first() {
        let db = setup_with_project();
        let t0 = at(2024, 3, 1, 9, 0);
        scheduler_at(&db, t0)
            .create_template(&template_input("p1", RecurrencePattern::Daily))
            .unwrap();

        // Two catch-up runs at different instants give two instances with
        // distinct creation times.
        let late = at(2024, 3, 4, 9, 0);
        let first = scheduler_at(&db, late).generate_due_templates().unwrap();
        let later = at(2024, 3, 4, 10, 0);
        let second = scheduler_at(&db, later).generate_due_templates().unwrap();
        assert_eq!(first.generated_count(), 1);
        assert_eq!(second.generated_count(), 1);

        let sched = scheduler_at(&db, later);
        let pending = sched.list_pending_acknowledgments().unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].created_at <= pending[1].created_at);
        assert_eq!(pending[0].id, first.generated[0].id);

        let acked = sched.acknowledge_instance(&pending[0].id).unwrap();
        assert!(!acked.needs_acknowledgment);

        let pending = sched.list_pending_acknowledgments().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.generated[0].id);
    }

    #[test]
    fn acknowledge_unknown_task_not_found() {
        let db = setup_with_project();
        let sched = scheduler_at(&db, at(2024, 3, 1, 9, 0));
        let err = sched.acknowledge_instance("missing").unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn deleting_a_template_detaches_its_instances() {
        let db = setup_with_project();
        let t0 = at(2024, 3, 1, 9, 0);
        let sched = scheduler_at(&db, t0);
        let template = sched
            .create_template(&template_input("p1", RecurrencePattern::Daily))
            .unwrap();
        let instance = sched.trigger_template(&template.id).unwrap();

        sched.delete_template(&template.id).unwrap();
        assert!(matches!(
            sched.get_template(&template.id).unwrap_err(),
            EngineError::NotFound { .. }
        ));

        // The instance survives with its template reference cleared.
        let lc = lifecycle(&db);
        let instance = lc.get_task(&instance.id).unwrap();
        assert_eq!(instance.recurring_template_id, None);
        assert!(instance.is_recurring);
    }
}

mod persistence_tests {
    use super::*;

    #[test]
    fn file_backed_database_survives_reopen() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("engine.db");

        let task_id = {
            let db = Database::open(&path).expect("failed to open database");
            let lc = lifecycle(&db);
            make_task(&lc, "persisted").id
        };

        let db = Database::open(&path).expect("failed to reopen database");
        let lc = lifecycle(&db);
        let task = lc.get_task(&task_id).unwrap();
        assert_eq!(task.title, "persisted");
    }
}

//! End-to-end tests of anonymization runs against the in-memory store

use shroud::adapters::MemoryStore;
use shroud::anonymization::{
    CustomAnonymizer, Generator, GeneratorContext, LifecycleListener, PropertyDecision,
    PropertyEvent,
};
use shroud::core::{
    CommitFailurePolicy, EntityStats, EntityStatus, ErrorKind, Orchestrator, Report, RunOptions,
};
use shroud::domain::{EntitySpec, Fields, PropertySpec, Record, RuleConfig, ShroudError, Value};
use shroud::record;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

fn users_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new("memory").with_table(
        "users",
        (1..=10).map(|id| {
            record! {
                "id" => id,
                "email" => format!("user{id}@corp.example"),
                "status" => "active",
            }
        }),
    ))
}

fn users_spec() -> EntitySpec {
    EntitySpec::new("users")
        .exclude(RuleConfig::new().field("id", "<=5"))
        .property(PropertySpec::new("email", "email").weight(1))
}

fn row(store: &MemoryStore, table: &str, id: i64) -> Fields {
    store
        .rows(table)
        .into_iter()
        .find(|r| r.get("id") == Some(&Value::Int(id)))
        .unwrap()
}

async fn run(store: Arc<MemoryStore>, specs: &[EntitySpec], options: &RunOptions) -> Report {
    Orchestrator::new()
        .with_store("default", store)
        .run_all(specs, options)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_end_to_end_exclusion() {
    let store = users_store();
    let report = run(store.clone(), &[users_spec()], &RunOptions::default().seed(1)).await;

    let users = report.entity("default", "users").unwrap();
    assert_eq!(users.processed, 10);
    assert_eq!(users.updated, 5);
    assert_eq!(users.per_property["email"], 5);
    assert_eq!(users.status, EntityStatus::Completed);
    assert!(report.is_successful());

    for id in 1..=5 {
        let email = format!("user{id}@corp.example");
        assert_eq!(row(&store, "users", id)["email"], Value::Text(email));
    }
    for id in 6..=10 {
        let fields = row(&store, "users", id);
        assert_ne!(fields["email"], Value::Text(format!("user{id}@corp.example")));
        assert_eq!(fields["status"], Value::Text("active".to_string()));
    }
}

#[tokio::test]
async fn test_dry_run_never_writes() {
    let store = users_store();
    let before = store.rows("users");
    let options = RunOptions::default().dry_run(true).batch_size(10);

    let report = run(store.clone(), &[users_spec()], &options).await;

    assert!(report.dry_run);
    assert_eq!(report.totals.updated, 5);
    assert_eq!(store.apply_calls(), 0);
    assert_eq!(store.rows("users"), before);
}

#[tokio::test]
async fn test_second_run_with_marker_updates_nothing() {
    let store = users_store();
    let spec = users_spec().marker("anonymized");

    let first = run(store.clone(), &[spec.clone()], &RunOptions::default()).await;
    assert_eq!(first.totals.updated, 5);
    assert_eq!(row(&store, "users", 6)["anonymized"], Value::Bool(true));
    assert!(row(&store, "users", 1).get("anonymized").is_none());

    let after_first = store.rows("users");
    let second = run(store.clone(), &[spec], &RunOptions::default()).await;
    assert_eq!(second.totals.processed, 10);
    assert_eq!(second.totals.updated, 0);
    assert_eq!(store.rows("users"), after_first);
}

#[tokio::test]
async fn test_paging_commits_one_page_at_a_time() {
    let store = users_store();
    let spec = EntitySpec::new("users")
        .property(PropertySpec::new("status", "constant").option("value", "gone"));

    let report = run(store.clone(), &[spec], &RunOptions::default().batch_size(3)).await;

    assert_eq!(report.totals.updated, 10);
    assert_eq!(store.apply_calls(), 4);
    assert!(store
        .rows("users")
        .iter()
        .all(|r| r["status"] == Value::Text("gone".to_string())));
}

/// Records every property the pipeline is about to write
#[derive(Default)]
struct PropertyLog {
    seen: Mutex<Vec<String>>,
}

impl LifecycleListener for PropertyLog {
    fn before_property(&self, event: &PropertyEvent<'_>) -> PropertyDecision {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(event.property.to_string());
        }
        PropertyDecision::Keep
    }
}

#[tokio::test]
async fn test_weight_ordering() {
    let store = Arc::new(MemoryStore::new("memory").with_table(
        "things",
        vec![record! { "id" => 1, "a" => "o", "b" => "o", "c" => "o", "z" => "o" }],
    ));
    let constant = |name: &str| PropertySpec::new(name, "constant").option("value", "x");
    let spec = EntitySpec::new("things")
        .property(constant("c").weight(3))
        .property(constant("a").weight(1))
        .property(constant("z"))
        .property(constant("b").weight(2));

    let log = Arc::new(PropertyLog::default());
    Orchestrator::new()
        .with_store("default", store)
        .with_listener(log.clone())
        .run_all(&[spec], &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(*log.seen.lock().unwrap(), vec!["a", "b", "c", "z"]);
}

#[tokio::test]
async fn test_bypass_entity_exclusion() {
    let store = Arc::new(MemoryStore::new("memory").with_table(
        "users",
        vec![
            record! { "id" => 1, "name" => "Root", "email" => "root@corp.example" },
            record! { "id" => 2, "name" => "Jane", "email" => "jane@corp.example" },
        ],
    ));
    let spec = EntitySpec::new("users")
        .exclude(RuleConfig::new().field("id", "1"))
        .property(PropertySpec::new("name", "constant").option("value", "Anon"))
        .property(
            PropertySpec::new("email", "constant")
                .option("value", "hidden@example.com")
                .option("bypass_entity_exclusion", true),
        );

    run(store.clone(), &[spec], &RunOptions::default()).await;

    let root = row(&store, "users", 1);
    assert_eq!(root["name"], Value::Text("Root".to_string()));
    assert_eq!(root["email"], Value::Text("hidden@example.com".to_string()));
    let jane = row(&store, "users", 2);
    assert_eq!(jane["name"], Value::Text("Anon".to_string()));
}

#[tokio::test]
async fn test_preserve_null_and_masking() {
    let store = Arc::new(MemoryStore::new("memory").with_table(
        "cards",
        vec![
            record! { "id" => 1, "number" => "4532015112830366", "phone" => Value::Null },
            record! { "id" => 2, "number" => Value::Null, "phone" => "555-0100" },
        ],
    ));
    let spec = EntitySpec::new("cards")
        .property(
            PropertySpec::new("number", "masking")
                .option("preserve_start", 4)
                .option("preserve_end", 4)
                .option("mask_char", "*")
                .option("preserve_null", true),
        )
        .property(PropertySpec::new("phone", "phone").option("preserve_null", true));

    run(store.clone(), &[spec], &RunOptions::default().seed(3)).await;

    let first = row(&store, "cards", 1);
    assert_eq!(first["number"], Value::Text("4532********0366".to_string()));
    assert_eq!(first["phone"], Value::Null);
    let second = row(&store, "cards", 2);
    assert_eq!(second["number"], Value::Null);
    assert_ne!(second["phone"], Value::Text("555-0100".to_string()));
}

#[tokio::test]
async fn test_truncation_runs_first_in_order() {
    let store = Arc::new(
        MemoryStore::new("memory")
            .with_table("sessions", vec![record! { "id" => 1 }, record! { "id" => 2 }])
            .with_table("carts", vec![record! { "id" => 1 }])
            .with_table(
                "people",
                vec![
                    record! { "id" => 1, "dtype" => "lead" },
                    record! { "id" => 2, "dtype" => "customer" },
                ],
            ),
    );
    let specs = vec![
        EntitySpec::new("sessions").truncated(Some(2)),
        EntitySpec::new("carts").truncated(Some(1)),
        EntitySpec {
            table: Some("people".to_string()),
            ..EntitySpec::new("leads").discriminated("dtype", "lead").truncated(None)
        },
    ];

    let report = run(store.clone(), &specs, &RunOptions::default()).await;

    assert_eq!(store.truncations(), vec!["carts", "sessions", "people[lead]"]);
    assert!(store.rows("sessions").is_empty());
    assert!(store.rows("carts").is_empty());
    assert_eq!(store.rows("people").len(), 1);
    assert_eq!(report.entity("default", "sessions").unwrap().truncated, Some(2));
    assert_eq!(report.entity("default", "leads").unwrap().truncated, Some(1));
    assert_eq!(report.totals.truncated, Some(4));
}

#[tokio::test]
async fn test_dry_run_skips_truncation() {
    let store = Arc::new(
        MemoryStore::new("memory").with_table("sessions", vec![record! { "id" => 1 }]),
    );
    let spec = EntitySpec::new("sessions").truncated(None);

    run(store.clone(), &[spec], &RunOptions::default().dry_run(true)).await;

    assert!(store.truncations().is_empty());
    assert_eq!(store.rows("sessions").len(), 1);
}

#[tokio::test]
async fn test_failed_truncation_skips_connection() {
    let store = users_store();
    store.fail_truncate("users");
    let spec = users_spec().truncated(None);

    let report = run(store.clone(), &[spec], &RunOptions::default()).await;

    let users = report.entity("default", "users").unwrap();
    assert_eq!(users.status, EntityStatus::Skipped);
    assert_eq!(users.errors[0].kind, ErrorKind::Truncation);
    assert_eq!(store.apply_calls(), 0);
    assert!(!report.is_successful());
}

fn two_entities() -> (Arc<MemoryStore>, Vec<EntitySpec>) {
    let store = Arc::new(
        MemoryStore::new("memory")
            .with_table(
                "users",
                (1..=6).map(|id| record! { "id" => id, "name" => format!("User {id}") }),
            )
            .with_table(
                "orders",
                (1..=2).map(|id| record! { "id" => id, "note" => "call me" }),
            ),
    );
    let specs = vec![
        EntitySpec::new("users")
            .property(PropertySpec::new("name", "constant").option("value", "Anon")),
        EntitySpec::new("orders")
            .property(PropertySpec::new("note", "constant").option("value", "-")),
    ];
    (store, specs)
}

#[tokio::test]
async fn test_commit_failure_aborts_entity_by_default() {
    let (store, specs) = two_entities();
    store.fail_commit("users", 2);

    let report = run(store.clone(), &specs, &RunOptions::default().batch_size(2)).await;

    let users = report.entity("default", "users").unwrap();
    assert_eq!(users.status, EntityStatus::Failed);
    assert_eq!(users.updated, 2);
    assert_eq!(users.errors[0].kind, ErrorKind::Store);
    assert_eq!(row(&store, "users", 1)["name"], Value::Text("Anon".to_string()));
    assert_eq!(row(&store, "users", 3)["name"], Value::Text("User 3".to_string()));
    assert_eq!(row(&store, "users", 5)["name"], Value::Text("User 5".to_string()));

    let orders = report.entity("default", "orders").unwrap();
    assert_eq!(orders.status, EntityStatus::Completed);
    assert_eq!(orders.updated, 2);
}

#[tokio::test]
async fn test_commit_failure_continue_policy() {
    let (store, specs) = two_entities();
    store.fail_commit("users", 2);
    let options = RunOptions {
        on_commit_failure: CommitFailurePolicy::Continue,
        ..RunOptions::default().batch_size(2)
    };

    let report = run(store.clone(), &specs, &options).await;

    let users = report.entity("default", "users").unwrap();
    assert_eq!(users.status, EntityStatus::Completed);
    assert_eq!(users.processed, 6);
    assert_eq!(users.updated, 4);
    assert_eq!(users.errors.len(), 1);
    assert_eq!(row(&store, "users", 3)["name"], Value::Text("User 3".to_string()));
    assert_eq!(row(&store, "users", 5)["name"], Value::Text("Anon".to_string()));
}

#[tokio::test]
async fn test_commit_failure_abort_run_policy() {
    let (store, specs) = two_entities();
    store.fail_commit("users", 1);
    let options = RunOptions {
        on_commit_failure: CommitFailurePolicy::AbortRun,
        ..RunOptions::default()
    };

    let report = run(store.clone(), &specs, &options).await;

    assert_eq!(
        report.entity("default", "users").unwrap().status,
        EntityStatus::Failed
    );
    assert_eq!(
        report.entity("default", "orders").unwrap().status,
        EntityStatus::Skipped
    );
    assert_eq!(row(&store, "orders", 1)["note"], Value::Text("call me".to_string()));
}

#[tokio::test]
async fn test_cancellation_between_pages() {
    let store = users_store();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    let report = Orchestrator::new()
        .with_store("default", store.clone())
        .with_shutdown(shutdown_rx)
        .run_all(&[users_spec()], &RunOptions::default())
        .await
        .unwrap();

    let users = report.entity("default", "users").unwrap();
    assert_eq!(users.status, EntityStatus::Cancelled);
    assert_eq!(users.processed, 0);
    assert!(report.was_cancelled());
    assert_eq!(store.apply_calls(), 0);
}

/// Replaces notes page by page, counting how many pages it saw
#[derive(Default)]
struct NotesScrubber {
    batches: AtomicUsize,
}

impl CustomAnonymizer for NotesScrubber {
    fn anonymize(&self, _record: &Record) -> anyhow::Result<Fields> {
        anyhow::bail!("only batch mode is used")
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn anonymize_batch(&self, records: &[Record]) -> anyhow::Result<HashMap<usize, Fields>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(records
            .iter()
            .enumerate()
            .filter(|(_, record)| !record.value("notes").is_null())
            .map(|(index, _)| {
                let mut fields = Fields::new();
                fields.insert("notes".to_string(), Value::Text("[scrubbed]".to_string()));
                (index, fields)
            })
            .collect())
    }
}

#[tokio::test]
async fn test_batch_custom_anonymizer() {
    let store = Arc::new(MemoryStore::new("memory").with_table(
        "tickets",
        (1..=7).map(|id| {
            let notes = if id % 2 == 0 {
                Value::Null
            } else {
                Value::Text(format!("note {id}"))
            };
            record! { "id" => id, "notes" => notes }
        }),
    ));
    let scrubber = Arc::new(NotesScrubber::default());
    let spec = EntitySpec::new("tickets").anonymizer("notes_scrubber");

    let report = Orchestrator::new()
        .with_store("default", store.clone())
        .with_anonymizer("notes_scrubber", scrubber.clone())
        .run_all(&[spec], &RunOptions::default().batch_size(3))
        .await
        .unwrap();

    assert_eq!(scrubber.batches.load(Ordering::SeqCst), 3);
    let tickets = report.entity("default", "tickets").unwrap();
    assert_eq!(tickets.processed, 7);
    assert_eq!(tickets.updated, 4);
    assert_eq!(tickets.per_property["notes"], 4);
    assert_eq!(row(&store, "tickets", 3)["notes"], Value::Text("[scrubbed]".to_string()));
    assert_eq!(row(&store, "tickets", 4)["notes"], Value::Null);
}

struct FailingAnonymizer;

impl CustomAnonymizer for FailingAnonymizer {
    fn anonymize(&self, record: &Record) -> anyhow::Result<Fields> {
        anyhow::bail!("upstream refused record {}", record.key())
    }
}

#[tokio::test]
async fn test_custom_anonymizer_failures_are_recorded() {
    let (store, _) = two_entities();
    let spec = EntitySpec::new("orders").anonymizer("failing");
    let orchestrator = Orchestrator::new()
        .with_store("default", store.clone())
        .with_anonymizer("failing", Arc::new(FailingAnonymizer));

    let report = orchestrator
        .run_all(&[spec.clone()], &RunOptions::default())
        .await
        .unwrap();
    let orders = report.entity("default", "orders").unwrap();
    assert_eq!(orders.processed, 2);
    assert_eq!(orders.errored, 2);
    assert_eq!(orders.updated, 0);
    assert!(orders
        .errors
        .iter()
        .all(|e| e.kind == ErrorKind::CustomService));

    let options = RunOptions {
        fail_fast: true,
        ..RunOptions::default()
    };
    let result = orchestrator.run_all(&[spec], &options).await;
    assert!(matches!(result, Err(ShroudError::CustomService(_))));
}

/// Keeps test accounts and pins display names, counting entity callbacks
#[derive(Default)]
struct Policy {
    entities_started: AtomicUsize,
    entities_finished: AtomicUsize,
    runs_finished: AtomicUsize,
}

impl LifecycleListener for Policy {
    fn before_entity(&self, _connection: &str, _entity: &EntitySpec) {
        self.entities_started.fetch_add(1, Ordering::SeqCst);
    }

    fn after_entity(&self, _connection: &str, _entity: &EntitySpec, _stats: &EntityStats) {
        self.entities_finished.fetch_add(1, Ordering::SeqCst);
    }

    fn after_run(&self, _report: &Report) {
        self.runs_finished.fetch_add(1, Ordering::SeqCst);
    }

    fn before_property(&self, event: &PropertyEvent<'_>) -> PropertyDecision {
        match event.property {
            "email" if event
                .original
                .as_str()
                .map_or(false, |email| email.ends_with("@keep.example")) =>
            {
                PropertyDecision::Skip
            }
            "name" => PropertyDecision::Override(Value::Text("Redacted".to_string())),
            _ => PropertyDecision::Keep,
        }
    }
}

#[tokio::test]
async fn test_lifecycle_hooks() {
    let store = Arc::new(MemoryStore::new("memory").with_table(
        "users",
        vec![
            record! { "id" => 1, "name" => "Qa", "email" => "qa@keep.example" },
            record! { "id" => 2, "name" => "Jane", "email" => "jane@corp.example" },
        ],
    ));
    let spec = EntitySpec::new("users")
        .property(PropertySpec::new("name", "first_name"))
        .property(PropertySpec::new("email", "email"));
    let policy = Arc::new(Policy::default());

    Orchestrator::new()
        .with_store("default", store.clone())
        .with_listener(policy.clone())
        .run_all(&[spec], &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(policy.entities_started.load(Ordering::SeqCst), 1);
    assert_eq!(policy.entities_finished.load(Ordering::SeqCst), 1);
    assert_eq!(policy.runs_finished.load(Ordering::SeqCst), 1);

    let qa = row(&store, "users", 1);
    assert_eq!(qa["email"], Value::Text("qa@keep.example".to_string()));
    assert_eq!(qa["name"], Value::Text("Redacted".to_string()));
    let jane = row(&store, "users", 2);
    assert_ne!(jane["email"], Value::Text("jane@corp.example".to_string()));
    assert_eq!(jane["name"], Value::Text("Redacted".to_string()));
}

/// Issues tokens from a fixed prefix
struct TokenService;

impl Generator for TokenService {
    fn generate(&self, ctx: &mut GeneratorContext<'_>) -> anyhow::Result<Value> {
        let prefix = ctx.options.str("prefix").unwrap_or("tok");
        Ok(Value::Text(format!("{prefix}-{}", ctx.record.key())))
    }
}

#[tokio::test]
async fn test_service_generator() {
    let store = users_store();
    let spec = EntitySpec::new("users").property(
        PropertySpec::new("email", "service")
            .service("tokens")
            .option("prefix", "user"),
    );

    Orchestrator::new()
        .with_store("default", store.clone())
        .with_service("tokens", Arc::new(TokenService))
        .run_all(&[spec], &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(row(&store, "users", 7)["email"], Value::Text("user-7".to_string()));
}

#[tokio::test]
async fn test_missing_service_is_a_config_error() {
    let store = users_store();
    let spec =
        EntitySpec::new("users").property(PropertySpec::new("email", "service").service("vault"));

    let result = Orchestrator::new()
        .with_store("default", store.clone())
        .run_all(&[spec], &RunOptions::default())
        .await;

    assert!(matches!(result, Err(ShroudError::Configuration(_))));
    assert_eq!(store.apply_calls(), 0);
}

#[tokio::test]
async fn test_connection_selection() {
    let primary = users_store();
    let replica = users_store();
    let options = RunOptions {
        connections: vec!["replica".to_string()],
        ..RunOptions::default()
    };

    let report = Orchestrator::new()
        .with_store("primary", primary.clone())
        .with_store("replica", replica.clone())
        .run_all(&[users_spec()], &options)
        .await
        .unwrap();

    assert!(report.entity("primary", "users").is_none());
    assert_eq!(report.entity("replica", "users").unwrap().updated, 5);
    assert_eq!(primary.apply_calls(), 0);
    assert!(replica.apply_calls() > 0);
}

#[tokio::test]
async fn test_seed_makes_runs_reproducible() {
    let first = users_store();
    let second = users_store();
    let spec = EntitySpec::new("users")
        .property(PropertySpec::new("email", "email"))
        .property(PropertySpec::new("status", "uuid"));

    run(first.clone(), &[spec.clone()], &RunOptions::default().seed(99)).await;
    run(second.clone(), &[spec], &RunOptions::default().seed(99)).await;

    assert_eq!(first.rows("users"), second.rows("users"));
}

#[tokio::test]
async fn test_primary_key_property_is_a_config_error() {
    let store = users_store();
    let spec = EntitySpec::new("users").property(PropertySpec::new("id", "numeric"));

    let result = run_all_with(store.clone(), &[spec]).await;

    assert!(matches!(result, Err(ShroudError::Configuration(_))));
    assert_eq!(store.rows("users")[0]["id"], Value::Int(1));
}

async fn run_all_with(store: Arc<MemoryStore>, specs: &[EntitySpec]) -> shroud::Result<Report> {
    Orchestrator::new()
        .with_store("default", store)
        .run_all(specs, &RunOptions::default())
        .await
}

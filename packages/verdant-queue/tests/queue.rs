use std::sync::{
	Arc,
	atomic::{AtomicU32, Ordering},
};

use verdant_queue::{Outcome, Queue, TaskMessage};

fn message() -> TaskMessage {
	TaskMessage {
		object_key: "ACME/2024_BRSR.pdf".to_string(),
		company_id: 42,
		report_year: 2024,
	}
}

async fn queue_on(test_db: &verdant_testkit::TestDatabase) -> (verdant_storage::db::Db, Queue) {
	let cfg =
		verdant_config::Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = verdant_storage::db::Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(3).await.expect("Failed to ensure schema.");

	let gate = verdant_config::Gate { delay_seconds: 0, max_delayed_attempts: 2 };
	let queue = Queue::new(db.pool.clone(), verdant_config::Queue::default(), gate);

	(db, queue)
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set VERDANT_PG_DSN to run."]
async fn successful_delivery_is_acknowledged_once() {
	let Some(base_dsn) = verdant_testkit::env_dsn() else {
		eprintln!("Skipping successful_delivery_is_acknowledged_once; set VERDANT_PG_DSN to run this test.");
		return;
	};
	let test_db = verdant_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let (_db, queue) = queue_on(&test_db).await;

	queue.publish("embedding", &message()).await.expect("Failed to publish.");

	let calls = Arc::new(AtomicU32::new(0));
	let handler_calls = calls.clone();
	let processed = queue
		.run_once("embedding", &|delivery| {
			let calls = handler_calls.clone();
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				assert_eq!(delivery.message.object_key, "ACME/2024_BRSR.pdf");
				assert_eq!(delivery.attempt, 0);
				Outcome::Success
			}
		})
		.await
		.expect("Failed to run once.");

	assert!(processed);
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert!(queue.pending("embedding").await.expect("Failed to list pending.").is_empty());
	assert!(queue.dead_letters("embedding").await.expect("Failed to list DLQ.").is_empty());

	let processed = queue
		.run_once("embedding", &|_| async { Outcome::Success })
		.await
		.expect("Failed to run once.");

	assert!(!processed);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set VERDANT_PG_DSN to run."]
async fn transient_failures_dead_letter_after_the_retry_budget() {
	let Some(base_dsn) = verdant_testkit::env_dsn() else {
		eprintln!(
			"Skipping transient_failures_dead_letter_after_the_retry_budget; set VERDANT_PG_DSN to run this test."
		);
		return;
	};
	let test_db = verdant_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let (_db, queue) = queue_on(&test_db).await;

	queue.publish("embedding", &message()).await.expect("Failed to publish.");

	let calls = Arc::new(AtomicU32::new(0));

	// Initial delivery plus three retries, all failing transiently.
	for expected_attempt in 0..4 {
		let handler_calls = calls.clone();
		let processed = queue
			.run_once("embedding", &|delivery| {
				let calls = handler_calls.clone();
				async move {
					calls.fetch_add(1, Ordering::SeqCst);
					assert_eq!(delivery.attempt, expected_attempt);
					Outcome::Transient("embedding provider timeout".to_string())
				}
			})
			.await
			.expect("Failed to run once.");

		assert!(processed);
	}

	assert_eq!(calls.load(Ordering::SeqCst), 4);
	assert!(queue.pending("embedding").await.expect("Failed to list pending.").is_empty());

	let dead = queue.dead_letters("embedding").await.expect("Failed to list DLQ.");

	assert_eq!(dead.len(), 1);
	assert_eq!(dead[0].attempt, 3);
	assert_eq!(
		dead[0].reason.as_deref(),
		Some("retries exhausted: embedding provider timeout")
	);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set VERDANT_PG_DSN to run."]
async fn permanent_failures_skip_retries_entirely() {
	let Some(base_dsn) = verdant_testkit::env_dsn() else {
		eprintln!("Skipping permanent_failures_skip_retries_entirely; set VERDANT_PG_DSN to run this test.");
		return;
	};
	let test_db = verdant_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let (_db, queue) = queue_on(&test_db).await;

	queue.publish("embedding", &message()).await.expect("Failed to publish.");
	queue
		.run_once("embedding", &|_| async { Outcome::Permanent("unreadable pdf".to_string()) })
		.await
		.expect("Failed to run once.");

	let dead = queue.dead_letters("embedding").await.expect("Failed to list DLQ.");

	assert_eq!(dead.len(), 1);
	assert_eq!(dead[0].attempt, 0);
	assert_eq!(dead[0].reason.as_deref(), Some("permanent: unreadable pdf"));
	assert!(queue.pending("embedding").await.expect("Failed to list pending.").is_empty());
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set VERDANT_PG_DSN to run."]
async fn unparsable_payloads_are_rejected_to_the_dlq() {
	let Some(base_dsn) = verdant_testkit::env_dsn() else {
		eprintln!("Skipping unparsable_payloads_are_rejected_to_the_dlq; set VERDANT_PG_DSN to run this test.");
		return;
	};
	let test_db = verdant_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let (db, queue) = queue_on(&test_db).await;

	// A bare string instead of the structured payload the workers expect.
	sqlx::query(
		"INSERT INTO task_queue (task_id, queue, payload) VALUES ($1, 'embedding', $2)",
	)
	.bind(uuid::Uuid::new_v4())
	.bind(serde_json::Value::String("ACME/2024_BRSR.pdf".to_string()))
	.execute(&db.pool)
	.await
	.expect("Failed to insert malformed task.");

	let calls = Arc::new(AtomicU32::new(0));
	let handler_calls = calls.clone();
	let processed = queue
		.run_once("embedding", &|_| {
			let calls = handler_calls.clone();
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Outcome::Success
			}
		})
		.await
		.expect("Failed to run once.");

	assert!(processed);
	// The handler never sees a payload that fails schema validation.
	assert_eq!(calls.load(Ordering::SeqCst), 0);

	let dead = queue.dead_letters("embedding").await.expect("Failed to list DLQ.");

	assert_eq!(dead.len(), 1);
	assert!(dead[0].reason.as_deref().is_some_and(|r| r.starts_with("malformed payload:")));
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set VERDANT_PG_DSN to run."]
async fn not_ready_requeues_on_its_own_counter_then_dead_letters() {
	let Some(base_dsn) = verdant_testkit::env_dsn() else {
		eprintln!(
			"Skipping not_ready_requeues_on_its_own_counter_then_dead_letters; set VERDANT_PG_DSN to run this test."
		);
		return;
	};
	let test_db = verdant_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let (_db, queue) = queue_on(&test_db).await;

	queue.publish("extraction", &message()).await.expect("Failed to publish.");

	// max_delayed_attempts is 2 in this fixture; the third delivery exhausts it.
	for expected_delayed in 0..2 {
		let processed = queue
			.run_once("extraction", &|delivery| async move {
				assert_eq!(delivery.delayed_attempts, expected_delayed);
				assert_eq!(delivery.attempt, 0);
				Outcome::NotReady("no embedded chunks".to_string())
			})
			.await
			.expect("Failed to run once.");

		assert!(processed);
	}

	queue
		.run_once("extraction", &|_| async {
			Outcome::NotReady("no embedded chunks".to_string())
		})
		.await
		.expect("Failed to run once.");

	let dead = queue.dead_letters("extraction").await.expect("Failed to list DLQ.");

	assert_eq!(dead.len(), 1);
	assert_eq!(dead[0].delayed_attempts, 2);
	assert_eq!(dead[0].reason.as_deref(), Some("embeddings not ready: no embedded chunks"));
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set VERDANT_PG_DSN to run."]
async fn expired_lease_settles_exactly_once() {
	let Some(base_dsn) = verdant_testkit::env_dsn() else {
		eprintln!("Skipping expired_lease_settles_exactly_once; set VERDANT_PG_DSN to run this test.");
		return;
	};
	let test_db = verdant_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let cfg = verdant_config::Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 4 };
	let db = verdant_storage::db::Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(3).await.expect("Failed to ensure schema.");

	let queue_cfg = verdant_config::Queue { lease_seconds: 1, ..Default::default() };
	let gate = verdant_config::Gate::default();
	let slow_worker = Queue::new(db.pool.clone(), queue_cfg.clone(), gate.clone());
	let fast_worker = Queue::new(db.pool.clone(), queue_cfg, gate);

	slow_worker.publish("embedding", &message()).await.expect("Failed to publish.");

	// The first worker's handler outlives its lease; a second worker reclaims
	// the task mid-handler and settles first. The stale settle must be
	// discarded, not fork the message into a second row.
	let slow = slow_worker.run_once("embedding", &|_| async {
		tokio::time::sleep(std::time::Duration::from_secs(3)).await;
		Outcome::Transient("slow worker".to_string())
	});
	let fast = async {
		tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
		fast_worker
			.run_once("embedding", &|_| async { Outcome::Transient("fast worker".to_string()) })
			.await
	};
	let (slow, fast) = tokio::join!(slow, fast);

	assert!(slow.expect("Failed to run slow worker."));
	assert!(fast.expect("Failed to run fast worker."));

	let pending = slow_worker.pending("embedding").await.expect("Failed to list pending.");

	assert_eq!(pending.len(), 1, "lease expiry must not duplicate the task");
	assert_eq!(pending[0].attempt, 1);
	assert!(slow_worker.dead_letters("embedding").await.expect("Failed to list DLQ.").is_empty());
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set VERDANT_PG_DSN to run."]
async fn delayed_tasks_stay_invisible_until_due() {
	let Some(base_dsn) = verdant_testkit::env_dsn() else {
		eprintln!("Skipping delayed_tasks_stay_invisible_until_due; set VERDANT_PG_DSN to run this test.");
		return;
	};
	let test_db = verdant_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let (_db, queue) = queue_on(&test_db).await;

	queue
		.publish_with("extraction", &message(), 0, 0, Some(time::Duration::seconds(3_600)))
		.await
		.expect("Failed to publish.");

	let processed = queue
		.run_once("extraction", &|_| async { Outcome::Success })
		.await
		.expect("Failed to run once.");

	assert!(!processed);

	let pending = queue.pending("extraction").await.expect("Failed to list pending.");

	assert_eq!(pending.len(), 1);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

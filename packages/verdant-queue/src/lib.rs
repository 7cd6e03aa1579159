pub mod retry;

mod error;

pub use error::{Error, Result};

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use time::{Duration, OffsetDateTime};
use tokio::sync::watch;
use uuid::Uuid;

use retry::Decision;

pub const EMBEDDING_QUEUE: &str = "embedding";
pub const EXTRACTION_QUEUE: &str = "extraction";

pub fn dlq_queue(queue: &str) -> String {
	format!("{queue}.dlq")
}

/// The single wire schema for task payloads, validated on both publish
/// (typed serialization) and consume (typed deserialization).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskMessage {
	pub object_key: String,
	pub company_id: i64,
	pub report_year: i32,
}

/// One claimed message handed to a stage handler.
#[derive(Clone, Debug)]
pub struct Delivery {
	pub task_id: Uuid,
	pub message: TaskMessage,
	pub attempt: i32,
	pub delayed_attempts: i32,
}

/// Handler verdict for a delivery; the retry controller turns it into a
/// settle decision.
#[derive(Clone, Debug)]
pub enum Outcome {
	Success,
	Transient(String),
	NotReady(String),
	Permanent(String),
}

/// A dead-lettered task, kept durable for operator inspection.
#[derive(Debug, sqlx::FromRow)]
pub struct DeadLetter {
	pub task_id: Uuid,
	pub payload: Value,
	pub attempt: i32,
	pub delayed_attempts: i32,
	pub reason: Option<String>,
}

/// A not-yet-claimed task, visible to tests and operational tooling.
#[derive(Debug, sqlx::FromRow)]
pub struct PendingTask {
	pub task_id: Uuid,
	pub attempt: i32,
	pub delayed_attempts: i32,
	pub available_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
struct ClaimedTask {
	task_id: Uuid,
	queue: String,
	payload: Value,
	attempt: i32,
	delayed_attempts: i32,
}

/// Durable Postgres-backed task queue with manual acknowledgment, bounded
/// retry, delay-requeue, and per-queue dead-letter routing.
pub struct Queue {
	pool: PgPool,
	queue_cfg: verdant_config::Queue,
	gate_cfg: verdant_config::Gate,
}
impl Queue {
	pub fn new(
		pool: PgPool,
		queue_cfg: verdant_config::Queue,
		gate_cfg: verdant_config::Gate,
	) -> Self {
		Self { pool, queue_cfg, gate_cfg }
	}

	pub async fn publish(&self, queue: &str, message: &TaskMessage) -> Result<Uuid> {
		self.publish_with(queue, message, 0, 0, None).await
	}

	pub async fn publish_with(
		&self,
		queue: &str,
		message: &TaskMessage,
		attempt: i32,
		delayed_attempts: i32,
		delay: Option<Duration>,
	) -> Result<Uuid> {
		let payload = serde_json::to_value(message)?;
		let available_at = OffsetDateTime::now_utc() + delay.unwrap_or(Duration::ZERO);

		insert_task(&self.pool, queue, &payload, attempt, delayed_attempts, None, available_at)
			.await
	}

	/// Publish within a caller-owned transaction, so intake metadata and its
	/// stage tasks commit atomically.
	pub async fn publish_tx(
		tx: &mut Transaction<'_, Postgres>,
		queue: &str,
		message: &TaskMessage,
		delay: Option<Duration>,
	) -> Result<Uuid> {
		let payload = serde_json::to_value(message)?;
		let available_at = OffsetDateTime::now_utc() + delay.unwrap_or(Duration::ZERO);

		insert_task(&mut **tx, queue, &payload, 0, 0, None, available_at).await
	}

	/// Claims and settles at most one task. Returns whether a task was
	/// processed, so callers can poll-sleep on an empty queue.
	pub async fn run_once<F, Fut>(&self, queue: &str, handler: &F) -> Result<bool>
	where
		F: Fn(Delivery) -> Fut,
		Fut: Future<Output = Outcome>,
	{
		let now = OffsetDateTime::now_utc();
		let Some(task) = self.claim_next(queue, now).await? else {
			return Ok(false);
		};
		let message: TaskMessage = match serde_json::from_value(task.payload.clone()) {
			Ok(message) => message,
			Err(err) => {
				// Reject instead of crash-looping on a payload the workers
				// cannot ever parse.
				let reason = format!("malformed payload: {err}");

				tracing::warn!(task_id = %task.task_id, queue, %reason, "Dead-lettered task.");
				self.settle(&task, Decision::DeadLetter { reason }).await?;

				return Ok(true);
			},
		};
		let delivery = Delivery {
			task_id: task.task_id,
			message,
			attempt: task.attempt,
			delayed_attempts: task.delayed_attempts,
		};
		let object_key = delivery.message.object_key.clone();
		let outcome = handler(delivery).await;
		let decision = retry::decide(
			&outcome,
			task.attempt,
			task.delayed_attempts,
			&self.queue_cfg,
			&self.gate_cfg,
		);

		match &decision {
			Decision::Ack => {
				tracing::info!(task_id = %task.task_id, queue, %object_key, "Task acknowledged.");
			},
			Decision::Retry { attempt } => {
				tracing::warn!(
					task_id = %task.task_id,
					queue,
					%object_key,
					attempt,
					outcome = ?outcome,
					"Republishing task for retry."
				);
			},
			Decision::Delay { delayed_attempts, delay_seconds } => {
				tracing::info!(
					task_id = %task.task_id,
					queue,
					%object_key,
					delayed_attempts,
					delay_seconds,
					"Delaying task until prerequisites exist."
				);
			},
			Decision::DeadLetter { reason } => {
				tracing::warn!(task_id = %task.task_id, queue, %object_key, %reason, "Dead-lettered task.");
			},
		}

		self.settle(&task, decision).await?;

		Ok(true)
	}

	/// Blocking consume loop: one claimed task at a time, fully settled
	/// before the next claim. Storage failures back off exponentially; a
	/// shutdown signal lets the in-flight task finish before exiting.
	pub async fn consume<F, Fut>(
		&self,
		queue: &str,
		mut shutdown: watch::Receiver<bool>,
		handler: F,
	) -> Result<()>
	where
		F: Fn(Delivery) -> Fut,
		Fut: Future<Output = Outcome>,
	{
		let base_backoff = self.queue_cfg.connect_backoff_base_ms;
		let mut backoff_ms = base_backoff;

		while !*shutdown.borrow() {
			match self.run_once(queue, &handler).await {
				Ok(true) => {
					backoff_ms = base_backoff;
				},
				Ok(false) => {
					backoff_ms = base_backoff;

					tokio::select! {
						_ = shutdown.changed() => {},
						_ = tokio::time::sleep(std::time::Duration::from_millis(
							self.queue_cfg.poll_interval_ms,
						)) => {},
					}
				},
				Err(err) => {
					tracing::error!(error = %err, queue, backoff_ms, "Queue poll failed. Backing off.");

					tokio::select! {
						_ = shutdown.changed() => {},
						_ = tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)) => {},
					}

					backoff_ms =
						retry::next_backoff_ms(backoff_ms, self.queue_cfg.connect_backoff_max_ms);
				},
			}
		}

		tracing::info!(queue, "Consumer stopped.");

		Ok(())
	}

	pub async fn pending(&self, queue: &str) -> Result<Vec<PendingTask>> {
		let tasks = sqlx::query_as::<_, PendingTask>(
			"\
SELECT task_id, attempt, delayed_attempts, available_at
FROM task_queue
WHERE queue = $1
ORDER BY available_at ASC",
		)
		.bind(queue)
		.fetch_all(&self.pool)
		.await?;

		Ok(tasks)
	}

	pub async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>> {
		let tasks = sqlx::query_as::<_, DeadLetter>(
			"\
SELECT task_id, payload, attempt, delayed_attempts, reason
FROM task_queue
WHERE queue = $1
ORDER BY created_at ASC",
		)
		.bind(dlq_queue(queue).as_str())
		.fetch_all(&self.pool)
		.await?;

		Ok(tasks)
	}

	/// Claims the oldest available task and pushes its availability forward by
	/// the lease. One unacknowledged task per worker; an expired lease is the
	/// crash-redelivery path.
	async fn claim_next(&self, queue: &str, now: OffsetDateTime) -> Result<Option<ClaimedTask>> {
		let mut tx = self.pool.begin().await?;
		let row = sqlx::query_as::<_, ClaimedTask>(
			"\
SELECT task_id, queue, payload, attempt, delayed_attempts
FROM task_queue
WHERE queue = $1 AND available_at <= $2
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
		)
		.bind(queue)
		.bind(now)
		.fetch_optional(&mut *tx)
		.await?;
		let task = if let Some(task) = row {
			let lease_until = now + Duration::seconds(self.queue_cfg.lease_seconds);

			sqlx::query("UPDATE task_queue SET available_at = $1, updated_at = $2 WHERE task_id = $3")
				.bind(lease_until)
				.bind(now)
				.bind(task.task_id)
				.execute(&mut *tx)
				.await?;

			Some(task)
		} else {
			None
		};

		tx.commit().await?;

		Ok(task)
	}

	/// Every settle path is one transaction: the original delivery is removed
	/// and the replacement row (if any) inserted atomically, so no decision
	/// can lose or fork the message. The delete doubles as the ownership
	/// check: if the lease expired mid-handler and another worker reclaimed
	/// and settled the task, the row is gone, zero rows are affected, and
	/// this worker's decision is discarded instead of inserting a duplicate.
	async fn settle(&self, task: &ClaimedTask, decision: Decision) -> Result<()> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.pool.begin().await?;
		let deleted = sqlx::query("DELETE FROM task_queue WHERE task_id = $1")
			.bind(task.task_id)
			.execute(&mut *tx)
			.await?
			.rows_affected();

		if deleted == 0 {
			tx.commit().await?;
			tracing::warn!(
				task_id = %task.task_id,
				queue = %task.queue,
				"Claim lost before settle; another worker owns the task."
			);

			return Ok(());
		}

		match decision {
			Decision::Ack => {},
			Decision::Retry { attempt } => {
				insert_task(
					&mut *tx,
					&task.queue,
					&task.payload,
					attempt,
					task.delayed_attempts,
					None,
					now,
				)
				.await?;
			},
			Decision::Delay { delayed_attempts, delay_seconds } => {
				insert_task(
					&mut *tx,
					&task.queue,
					&task.payload,
					task.attempt,
					delayed_attempts,
					None,
					now + Duration::seconds(delay_seconds),
				)
				.await?;
			},
			Decision::DeadLetter { reason } => {
				insert_task(
					&mut *tx,
					dlq_queue(&task.queue).as_str(),
					&task.payload,
					task.attempt,
					task.delayed_attempts,
					Some(reason.as_str()),
					now,
				)
				.await?;
			},
		}

		tx.commit().await?;

		Ok(())
	}
}

async fn insert_task<'e, E>(
	executor: E,
	queue: &str,
	payload: &Value,
	attempt: i32,
	delayed_attempts: i32,
	reason: Option<&str>,
	available_at: OffsetDateTime,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let task_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO task_queue (task_id, queue, payload, attempt, delayed_attempts, reason, available_at)
VALUES ($1, $2, $3, $4, $5, $6, $7)",
	)
	.bind(task_id)
	.bind(queue)
	.bind(payload)
	.bind(attempt)
	.bind(delayed_attempts)
	.bind(reason)
	.bind(available_at)
	.execute(executor)
	.await?;

	Ok(task_id)
}

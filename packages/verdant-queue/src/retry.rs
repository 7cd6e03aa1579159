use crate::Outcome;

/// What to do with a delivery after its handler returned.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
	/// Remove the task; processing finished.
	Ack,
	/// Republish the same payload with the incremented attempt counter, then
	/// ack the original. Never a native requeue: the counter must be mutated
	/// on the new message or the retry budget is never consumed.
	Retry { attempt: i32 },
	/// Readiness delay-requeue with its own bounded counter.
	Delay { delayed_attempts: i32, delay_seconds: i64 },
	/// Route to `<queue>.dlq` with an operator-readable reason.
	DeadLetter { reason: String },
}

pub fn decide(
	outcome: &Outcome,
	attempt: i32,
	delayed_attempts: i32,
	queue_cfg: &verdant_config::Queue,
	gate_cfg: &verdant_config::Gate,
) -> Decision {
	match outcome {
		Outcome::Success => Decision::Ack,
		Outcome::Transient(reason) =>
			if attempt < queue_cfg.max_retries {
				Decision::Retry { attempt: attempt + 1 }
			} else {
				Decision::DeadLetter { reason: format!("retries exhausted: {reason}") }
			},
		Outcome::NotReady(reason) =>
			if delayed_attempts < gate_cfg.max_delayed_attempts {
				Decision::Delay {
					delayed_attempts: delayed_attempts + 1,
					delay_seconds: gate_cfg.delay_seconds,
				}
			} else {
				Decision::DeadLetter { reason: format!("embeddings not ready: {reason}") }
			},
		Outcome::Permanent(reason) =>
			Decision::DeadLetter { reason: format!("permanent: {reason}") },
	}
}

/// Doubling backoff for storage connectivity failures, capped at `max_ms`.
pub fn next_backoff_ms(current_ms: u64, max_ms: u64) -> u64 {
	current_ms.saturating_mul(2).min(max_ms)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn queue_cfg() -> verdant_config::Queue {
		verdant_config::Queue::default()
	}

	fn gate_cfg() -> verdant_config::Gate {
		verdant_config::Gate::default()
	}

	#[test]
	fn success_acks() {
		let decision = decide(&Outcome::Success, 2, 0, &queue_cfg(), &gate_cfg());

		assert_eq!(decision, Decision::Ack);
	}

	#[test]
	fn transient_failures_retry_until_the_budget_is_spent() {
		for attempt in 0..3 {
			let decision = decide(
				&Outcome::Transient("timeout".to_string()),
				attempt,
				0,
				&queue_cfg(),
				&gate_cfg(),
			);

			assert_eq!(decision, Decision::Retry { attempt: attempt + 1 });
		}

		let decision =
			decide(&Outcome::Transient("timeout".to_string()), 3, 0, &queue_cfg(), &gate_cfg());

		assert_eq!(
			decision,
			Decision::DeadLetter { reason: "retries exhausted: timeout".to_string() }
		);
	}

	#[test]
	fn permanent_failures_skip_the_retry_budget() {
		let decision =
			decide(&Outcome::Permanent("unreadable pdf".to_string()), 0, 0, &queue_cfg(), &gate_cfg());

		assert_eq!(
			decision,
			Decision::DeadLetter { reason: "permanent: unreadable pdf".to_string() }
		);
	}

	#[test]
	fn not_ready_delays_on_a_separate_counter() {
		let decision =
			decide(&Outcome::NotReady("no chunks".to_string()), 3, 0, &queue_cfg(), &gate_cfg());

		// The extraction retry counter is irrelevant here.
		assert_eq!(decision, Decision::Delay { delayed_attempts: 1, delay_seconds: 300 });

		let decision =
			decide(&Outcome::NotReady("no chunks".to_string()), 0, 10, &queue_cfg(), &gate_cfg());

		assert_eq!(
			decision,
			Decision::DeadLetter { reason: "embeddings not ready: no chunks".to_string() }
		);
	}

	#[test]
	fn backoff_doubles_to_the_cap() {
		assert_eq!(next_backoff_ms(1_000, 60_000), 2_000);
		assert_eq!(next_backoff_ms(40_000, 60_000), 60_000);
		assert_eq!(next_backoff_ms(60_000, 60_000), 60_000);
	}
}

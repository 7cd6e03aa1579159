use httpmock::prelude::*;
use lopdf::{
	Document, Object, Stream,
	content::{Content, Operation},
	dictionary,
};
use serde_json::Map;
use verdant_pipeline::{PipelineState, embed, extract, ingest};
use verdant_queue::{EMBEDDING_QUEUE, EXTRACTION_QUEUE};
use verdant_storage::{models::status, queries};

fn single_page_pdf(text: &str) -> Vec<u8> {
	let mut doc = Document::with_version("1.5");
	let pages_id = doc.new_object_id();
	let font_id = doc.add_object(dictionary! {
		"Type" => "Font",
		"Subtype" => "Type1",
		"BaseFont" => "Courier",
	});
	let resources_id = doc.add_object(dictionary! {
		"Font" => dictionary! { "F1" => font_id },
	});
	let content = Content {
		operations: vec![
			Operation::new("BT", vec![]),
			Operation::new("Tf", vec!["F1".into(), 12.into()]),
			Operation::new("Td", vec![50.into(), 700.into()]),
			Operation::new("Tj", vec![Object::string_literal(text)]),
			Operation::new("ET", vec![]),
		],
	};
	let content_id = doc.add_object(Stream::new(
		dictionary! {},
		content.encode().expect("Failed to encode content."),
	));
	let page_id = doc.add_object(dictionary! {
		"Type" => "Page",
		"Parent" => pages_id,
		"Contents" => content_id,
	});
	let pages = dictionary! {
		"Type" => "Pages",
		"Kids" => vec![page_id.into()],
		"Count" => 1,
		"Resources" => resources_id,
		"MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
	};

	doc.objects.insert(pages_id, Object::Dictionary(pages));

	let catalog_id = doc.add_object(dictionary! {
		"Type" => "Catalog",
		"Pages" => pages_id,
	});

	doc.trailer.set("Root", catalog_id);

	let mut bytes = Vec::new();

	doc.save_to(&mut bytes).expect("Failed to save PDF.");

	bytes
}

fn config(dsn: &str, qdrant_url: &str, collection: &str, mock_base: &str) -> verdant_config::Config {
	verdant_config::Config {
		service: verdant_config::Service { log_level: "info".to_string() },
		storage: verdant_config::Storage {
			postgres: verdant_config::Postgres { dsn: dsn.to_string(), pool_max_conns: 2 },
			qdrant: verdant_config::Qdrant {
				url: qdrant_url.to_string(),
				collection: collection.to_string(),
				vector_dim: 3,
			},
		},
		providers: verdant_config::Providers {
			embedding: verdant_config::EmbeddingProviderConfig {
				api_base: mock_base.to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "text-embedding-3-small".to_string(),
				dimensions: 3,
				timeout_ms: 5_000,
				default_headers: Map::new(),
			},
			inference: verdant_config::InferenceProviderConfig {
				api_base: mock_base.to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/chat/completions".to_string(),
				model: "gpt-4o-mini".to_string(),
				temperature: 0.0,
				timeout_ms: 5_000,
				default_headers: Map::new(),
			},
			documents: verdant_config::DocumentStoreConfig {
				api_base: format!("{mock_base}/reports"),
				bearer_token: None,
				timeout_ms: 5_000,
			},
		},
		chunking: verdant_config::Chunking { max_words: 120, overlap_words: 20 },
		queue: verdant_config::Queue::default(),
		gate: verdant_config::Gate { delay_seconds: 0, max_delayed_attempts: 2 },
		retrieval: verdant_config::Retrieval { top_k: 3 },
		scoring: verdant_config::Scoring::default(),
	}
}

async fn insert_definition(state: &PipelineState) {
	sqlx::query(
		"\
INSERT INTO indicator_definitions (indicator_id, code, pillar, attribute, description, unit, scale_max, weight)
VALUES ($1, 'E1', 'E', 'Scope 1 emissions', 'Total direct greenhouse gas emissions.', 'tCO2e', 25000, 1.0)",
	)
	.bind(uuid::Uuid::new_v4())
	.execute(&state.db.pool)
	.await
	.expect("Failed to insert indicator definition.");
}

async fn state_for(test_db: &verdant_testkit::TestDatabase, mock_base: &str) -> PipelineState {
	let qdrant_url =
		verdant_testkit::env_qdrant_url().expect("Set VERDANT_QDRANT_URL to run this test.");
	let collection = test_db.collection_name("verdant");
	let cfg = config(test_db.dsn(), &qdrant_url, &collection, mock_base);
	// Create the schema and catalog before the definitions are loaded.
	let bootstrap = PipelineState::init(cfg.clone()).await.expect("Failed to init pipeline.");

	insert_definition(&bootstrap).await;

	PipelineState::init(cfg).await.expect("Failed to init pipeline.")
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set VERDANT_PG_DSN and VERDANT_QDRANT_URL to run."]
async fn extraction_waits_for_embeddings_then_dead_letters() {
	let Some(base_dsn) = verdant_testkit::env_dsn() else {
		eprintln!(
			"Skipping extraction_waits_for_embeddings_then_dead_letters; set VERDANT_PG_DSN to run this test."
		);
		return;
	};
	let test_db = verdant_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let server = MockServer::start_async().await;
	let state = state_for(&test_db, &server.base_url()).await;

	ingest::ingest_document(&state.db, &state.cfg.gate, "ACME/2024_BRSR.pdf", 42, 2024)
		.await
		.expect("Failed to ingest document.");

	// The embedding stage never runs, so every extraction delivery hits the
	// readiness gate. max_delayed_attempts is 2 in this fixture.
	for expected_delayed in 1..=2 {
		let processed = state
			.queue
			.run_once(EXTRACTION_QUEUE, &|delivery| extract::handle(&state, delivery))
			.await
			.expect("Failed to run extraction.");

		assert!(processed);

		let pending =
			state.queue.pending(EXTRACTION_QUEUE).await.expect("Failed to list pending.");

		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].delayed_attempts, expected_delayed);
	}

	state
		.queue
		.run_once(EXTRACTION_QUEUE, &|delivery| extract::handle(&state, delivery))
		.await
		.expect("Failed to run extraction.");

	let dead = state.queue.dead_letters(EXTRACTION_QUEUE).await.expect("Failed to list DLQ.");

	assert_eq!(dead.len(), 1);
	assert!(dead[0].reason.as_deref().is_some_and(|r| r.starts_with("embeddings not ready:")));
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set VERDANT_PG_DSN and VERDANT_QDRANT_URL to run."]
async fn full_pipeline_produces_a_score() {
	let Some(base_dsn) = verdant_testkit::env_dsn() else {
		eprintln!("Skipping full_pipeline_produces_a_score; set VERDANT_PG_DSN to run this test.");
		return;
	};
	let test_db = verdant_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let server = MockServer::start_async().await;
	let pdf = single_page_pdf("Scope 1 emissions were 12500 tCO2e in FY2024.");
	let _documents = server
		.mock_async(|when, then| {
			when.method(GET).path("/reports/ACME/2024_BRSR.pdf");
			then.status(200).body(pdf.clone());
		})
		.await;
	let _embeddings = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/embeddings");
			then.status(200).json_body(serde_json::json!({
				"data": [{ "index": 0, "embedding": [0.1, 0.2, 0.3] }]
			}));
		})
		.await;
	let _inference = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/chat/completions");
			then.status(200).json_body(serde_json::json!({
				"choices": [{
					"message": {
						"content": "{\"value_numeric\": 12500.0, \"value_text\": \"12,500 tCO2e\", \
							\"confidence\": 0.9, \"citations\": [{\"page_no\": 1, \
							\"quote\": \"Scope 1 emissions were 12500 tCO2e\"}]}"
					}
				}]
			}));
		})
		.await;
	let state = state_for(&test_db, &server.base_url()).await;

	ingest::ingest_document(&state.db, &state.cfg.gate, "ACME/2024_BRSR.pdf", 42, 2024)
		.await
		.expect("Failed to ingest document.");

	let processed = state
		.queue
		.run_once(EMBEDDING_QUEUE, &|delivery| embed::handle(&state, delivery))
		.await
		.expect("Failed to run embedding.");

	assert!(processed);
	assert_eq!(
		queries::count_chunks(&state.db.pool, "ACME/2024_BRSR.pdf")
			.await
			.expect("Failed to count chunks."),
		1
	);

	let processed = state
		.queue
		.run_once(EXTRACTION_QUEUE, &|delivery| extract::handle(&state, delivery))
		.await
		.expect("Failed to run extraction.");

	assert!(processed);

	let document = queries::fetch_document(&state.db.pool, "ACME/2024_BRSR.pdf")
		.await
		.expect("Failed to fetch document.")
		.expect("Document row missing.");

	assert_eq!(document.status, status::SCORED);

	let score = queries::fetch_score(&state.db.pool, 42, 2024)
		.await
		.expect("Failed to fetch score.")
		.expect("Score row missing.");

	// One E indicator at 12500 of 25000 normalizes to 50.
	assert!((score.overall - 50.0).abs() < 1e-9);
	assert_eq!(score.environmental, Some(50.0));
	assert_eq!(score.social, None);
	assert!(score.breakdown.get("contributions").is_some());

	// The delayed intake task is still queued; re-running extraction skips the
	// existing rows and re-finalizes without duplicating anything.
	let processed = state
		.queue
		.run_once(EXTRACTION_QUEUE, &|delivery| extract::handle(&state, delivery))
		.await
		.expect("Failed to run extraction.");

	assert!(processed);
	assert!(
		state
			.queue
			.pending(EXTRACTION_QUEUE)
			.await
			.expect("Failed to list pending.")
			.is_empty()
	);
	assert!(
		queries::fetch_score(&state.db.pool, 42, 2024)
			.await
			.expect("Failed to fetch score.")
			.is_some()
	);
	assert!(
		state
			.queue
			.dead_letters(EMBEDDING_QUEUE)
			.await
			.expect("Failed to list DLQ.")
			.is_empty()
	);
	assert!(
		state
			.queue
			.dead_letters(EXTRACTION_QUEUE)
			.await
			.expect("Failed to list DLQ.")
			.is_empty()
	);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

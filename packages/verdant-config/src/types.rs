use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub chunking: Chunking,
	#[serde(default)]
	pub queue: Queue,
	#[serde(default)]
	pub gate: Gate,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub scoring: Scoring,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub inference: InferenceProviderConfig,
	pub documents: DocumentStoreConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct InferenceProviderConfig {
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DocumentStoreConfig {
	pub api_base: String,
	pub bearer_token: Option<String>,
	pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chunking {
	pub max_words: u32,
	pub overlap_words: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Queue {
	pub max_retries: i32,
	pub poll_interval_ms: u64,
	pub lease_seconds: i64,
	pub connect_backoff_base_ms: u64,
	pub connect_backoff_max_ms: u64,
}
impl Default for Queue {
	fn default() -> Self {
		Self {
			max_retries: 3,
			poll_interval_ms: 500,
			// Must exceed the slowest handler: extraction loops over the whole
			// indicator catalog with a 60s inference timeout per call.
			lease_seconds: 600,
			connect_backoff_base_ms: 1_000,
			connect_backoff_max_ms: 60_000,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Gate {
	pub delay_seconds: i64,
	pub max_delayed_attempts: i32,
}
impl Default for Gate {
	fn default() -> Self {
		Self { delay_seconds: 300, max_delayed_attempts: 10 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub top_k: u32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self { top_k: 5 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Scoring {
	pub environmental_weight: f64,
	pub social_weight: f64,
	pub governance_weight: f64,
}
impl Default for Scoring {
	fn default() -> Self {
		Self { environmental_weight: 1.0, social_weight: 1.0, governance_weight: 1.0 }
	}
}

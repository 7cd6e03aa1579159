mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Chunking, Config, DocumentStoreConfig, EmbeddingProviderConfig, Gate, InferenceProviderConfig,
	Postgres, Providers, Qdrant, Queue, Retrieval, Scoring, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation { message: "service.log_level must be non-empty.".to_string() });
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.vector_dim must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("inference", &cfg.providers.inference.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}
	if cfg.providers.documents.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.documents.api_base must be non-empty.".to_string(),
		});
	}
	if cfg.chunking.max_words == 0 {
		return Err(Error::Validation {
			message: "chunking.max_words must be greater than zero.".to_string(),
		});
	}
	if cfg.chunking.overlap_words >= cfg.chunking.max_words {
		return Err(Error::Validation {
			message: "chunking.overlap_words must be less than chunking.max_words.".to_string(),
		});
	}
	if cfg.queue.max_retries < 0 {
		return Err(Error::Validation {
			message: "queue.max_retries must be zero or greater.".to_string(),
		});
	}
	if cfg.queue.lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "queue.lease_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.queue.connect_backoff_base_ms == 0
		|| cfg.queue.connect_backoff_max_ms < cfg.queue.connect_backoff_base_ms
	{
		return Err(Error::Validation {
			message: "queue.connect_backoff_max_ms must be at least connect_backoff_base_ms."
				.to_string(),
		});
	}
	if cfg.gate.delay_seconds <= 0 {
		return Err(Error::Validation {
			message: "gate.delay_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.gate.max_delayed_attempts <= 0 {
		return Err(Error::Validation {
			message: "gate.max_delayed_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.top_k must be greater than zero.".to_string(),
		});
	}

	let weights = [
		("scoring.environmental_weight", cfg.scoring.environmental_weight),
		("scoring.social_weight", cfg.scoring.social_weight),
		("scoring.governance_weight", cfg.scoring.governance_weight),
	];

	for (label, weight) in weights {
		if !weight.is_finite() || weight < 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number, zero or greater."),
			});
		}
	}
	if weights.iter().map(|(_, weight)| weight).sum::<f64>() <= 0.0 {
		return Err(Error::Validation {
			message: "Scoring pillar weights must not all be zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg
		.providers
		.documents
		.bearer_token
		.as_deref()
		.map(|token| token.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.providers.documents.bearer_token = None;
	}
}

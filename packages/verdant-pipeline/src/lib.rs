pub mod embed;
pub mod extract;
pub mod ingest;
pub mod pdf;
pub mod score;

mod error;

pub use error::{Error, Result};

use verdant_queue::Queue;
use verdant_storage::{db::Db, models::IndicatorDefinition, qdrant::QdrantStore, queries};

/// Shared state for all pipeline stages: storage handles, the task queue, and
/// the indicator catalog loaded once at startup.
pub struct PipelineState {
	pub cfg: verdant_config::Config,
	pub db: Db,
	pub qdrant: QdrantStore,
	pub queue: Queue,
	pub definitions: Vec<IndicatorDefinition>,
}
impl PipelineState {
	pub async fn init(cfg: verdant_config::Config) -> Result<Self> {
		let db = Db::connect(&cfg.storage.postgres).await?;

		db.ensure_schema(cfg.storage.qdrant.vector_dim).await?;

		let qdrant = QdrantStore::new(&cfg.storage.qdrant)?;

		qdrant.ensure_collection().await?;

		let queue = Queue::new(db.pool.clone(), cfg.queue.clone(), cfg.gate.clone());
		let definitions = queries::load_indicator_definitions(&db.pool).await?;

		tracing::info!(definitions = definitions.len(), "Pipeline state initialized.");

		Ok(Self { cfg, db, qdrant, queue, definitions })
	}
}

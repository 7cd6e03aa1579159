pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Message(String),
	#[error(transparent)]
	Pdf(#[from] lopdf::Error),
	#[error(transparent)]
	Provider(#[from] verdant_providers::Error),
	#[error(transparent)]
	Queue(#[from] verdant_queue::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	Storage(#[from] verdant_storage::Error),
}

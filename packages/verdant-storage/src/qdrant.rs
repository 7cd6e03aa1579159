use std::collections::HashMap;

use qdrant_client::{
	Qdrant,
	client::Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, CreateFieldIndexCollection, DeletePointsBuilder,
		Distance, FieldType, Filter, PointStruct, Query, QueryPointsBuilder, ScoredPoint,
		UpsertPointsBuilder, Value, VectorParamsBuilder, value::Kind,
	},
};
use uuid::Uuid;

use crate::Result;

const FILTER_INDEXES: [(&str, FieldType); 4] = [
	("company_id", FieldType::Integer),
	("report_year", FieldType::Integer),
	("chunk_index", FieldType::Integer),
	("object_key", FieldType::Keyword),
];

pub struct QdrantStore {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}

/// A chunk to mirror into Qdrant alongside its Postgres row.
pub struct ChunkPoint {
	pub chunk_index: i32,
	pub page_no: i32,
	pub text: String,
}

/// A retrieval hit, ordered by descending cosine similarity.
#[derive(Clone, Debug)]
pub struct RetrievedChunk {
	pub object_key: String,
	pub chunk_index: i32,
	pub page_no: i32,
	pub text: String,
	pub score: f32,
}

impl QdrantStore {
	pub fn new(cfg: &verdant_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	pub async fn ensure_collection(&self) -> Result<()> {
		if !self.client.collection_exists(&self.collection).await? {
			self.client
				.create_collection(
					CreateCollectionBuilder::new(self.collection.clone()).vectors_config(
						VectorParamsBuilder::new(self.vector_dim as u64, Distance::Cosine),
					),
				)
				.await?;
		}

		for (field_name, field_type) in FILTER_INDEXES {
			self.client
				.create_field_index(CreateFieldIndexCollection {
					collection_name: self.collection.clone(),
					wait: Some(true),
					field_name: field_name.to_string(),
					field_type: Some(field_type as i32),
					field_index_params: None,
					ordering: None,
				})
				.await?;
		}

		Ok(())
	}

	pub async fn delete_document_points(&self, object_key: &str) -> Result<()> {
		let filter = Filter::must([Condition::matches("object_key", object_key.to_string())]);
		let delete =
			DeletePointsBuilder::new(self.collection.clone()).points(filter).wait(true);

		self.client.delete_points(delete).await?;

		Ok(())
	}

	pub async fn upsert_chunk_points(
		&self,
		object_key: &str,
		company_id: i64,
		report_year: i32,
		chunks: &[ChunkPoint],
		vectors: &[Vec<f32>],
	) -> Result<()> {
		let mut points = Vec::with_capacity(chunks.len());

		for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
			let mut payload_map = HashMap::new();

			payload_map.insert("object_key".to_string(), Value::from(object_key.to_string()));
			payload_map.insert("chunk_index".to_string(), Value::from(chunk.chunk_index as i64));
			payload_map.insert("page_no".to_string(), Value::from(chunk.page_no as i64));
			payload_map.insert("company_id".to_string(), Value::from(company_id));
			payload_map.insert("report_year".to_string(), Value::from(report_year as i64));
			payload_map.insert("text".to_string(), Value::from(chunk.text.clone()));

			let point = PointStruct::new(
				chunk_point_id(object_key, chunk.chunk_index).to_string(),
				vector.clone(),
				Payload::from(payload_map),
			);

			points.push(point);
		}

		let upsert = UpsertPointsBuilder::new(self.collection.clone(), points).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	/// Filter-then-rank retrieval: restrict candidates to one company/year
	/// partition, then take the top-K by cosine similarity.
	pub async fn retrieve(
		&self,
		company_id: i64,
		report_year: i32,
		vector: Vec<f32>,
		top_k: u32,
	) -> Result<Vec<RetrievedChunk>> {
		let filter = Filter::must([
			Condition::matches("company_id", company_id),
			Condition::matches("report_year", report_year as i64),
		]);
		let query = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.filter(filter)
			.limit(top_k as u64)
			.with_payload(true);
		let response = self.client.query(query).await?;
		let mut chunks: Vec<RetrievedChunk> =
			response.result.iter().filter_map(to_retrieved_chunk).collect();

		order_candidates(&mut chunks);

		Ok(chunks)
	}
}

/// Deterministic point id so re-embedding a document overwrites its points.
pub fn chunk_point_id(object_key: &str, chunk_index: i32) -> Uuid {
	let name = format!("{object_key}:{chunk_index}");

	Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// Descending similarity, with ascending chunk_index as the stable tie-break.
pub fn order_candidates(chunks: &mut [RetrievedChunk]) {
	chunks.sort_by(|a, b| {
		b.score
			.partial_cmp(&a.score)
			.unwrap_or(std::cmp::Ordering::Equal)
			.then(a.chunk_index.cmp(&b.chunk_index))
	});
}

fn to_retrieved_chunk(point: &ScoredPoint) -> Option<RetrievedChunk> {
	Some(RetrievedChunk {
		object_key: payload_str(&point.payload, "object_key")?,
		chunk_index: payload_i64(&point.payload, "chunk_index")? as i32,
		page_no: payload_i64(&point.payload, "page_no")? as i32,
		text: payload_str(&point.payload, "text")?,
		score: point.score,
	})
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	match payload.get(key)?.kind.as_ref()? {
		Kind::StringValue(value) => Some(value.clone()),
		_ => None,
	}
}

fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
	match payload.get(key)?.kind.as_ref()? {
		Kind::IntegerValue(value) => Some(*value),
		_ => None,
	}
}

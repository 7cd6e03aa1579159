use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use verdant_storage::db::Db;

/// Registers a report for processing and enqueues its pipeline tasks.
#[derive(Debug, Parser)]
#[command(
	version = verdant_cli::VERSION,
	rename_all = "kebab",
	styles = verdant_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Object-store key of the report PDF.
	#[arg(long, value_name = "KEY")]
	pub object_key: String,
	#[arg(long)]
	pub company_id: i64,
	#[arg(long)]
	pub report_year: i32,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = verdant_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema(config.storage.qdrant.vector_dim).await?;
	verdant_pipeline::ingest::ingest_document(
		&db,
		&config.gate,
		&args.object_key,
		args.company_id,
		args.report_year,
	)
	.await?;

	Ok(())
}

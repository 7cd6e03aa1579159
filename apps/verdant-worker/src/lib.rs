use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use verdant_pipeline::{PipelineState, embed, extract};
use verdant_queue::{EMBEDDING_QUEUE, EXTRACTION_QUEUE};

#[derive(Debug, Parser)]
#[command(
	version = verdant_cli::VERSION,
	rename_all = "kebab",
	styles = verdant_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Pipeline stage this worker consumes.
	#[arg(long, value_enum)]
	pub stage: Stage,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Stage {
	Embedding,
	Extraction,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = verdant_config::load(&args.config)?;
	init_tracing(&config)?;

	let state = PipelineState::init(config).await?;
	let (shutdown_tx, shutdown_rx) = watch::channel(false);

	tokio::spawn(async move {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %err, "Failed to listen for the shutdown signal.");
		}

		tracing::info!("Shutdown requested; finishing the in-flight task.");

		let _ = shutdown_tx.send(true);
	});
	tracing::info!(stage = ?args.stage, "Worker started.");

	match args.stage {
		Stage::Embedding =>
			state
				.queue
				.consume(EMBEDDING_QUEUE, shutdown_rx, |delivery| embed::handle(&state, delivery))
				.await?,
		Stage::Extraction =>
			state
				.queue
				.consume(EXTRACTION_QUEUE, shutdown_rx, |delivery| {
					extract::handle(&state, delivery)
				})
				.await?,
	}

	Ok(())
}

fn init_tracing(config: &verdant_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).init();
	Ok(())
}

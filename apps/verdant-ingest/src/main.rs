use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = verdant_ingest::Args::parse();
	verdant_ingest::run(args).await
}

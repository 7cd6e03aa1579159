use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = verdant_worker::Args::parse();
	verdant_worker::run(args).await
}

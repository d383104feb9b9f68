use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = framecast::RenderConfig::parse();
    if let Err(err) = framecast::run(&cfg).await {
        error!("{err}");
        std::process::exit(1);
    }
}

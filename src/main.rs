use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("archie=info,tower_http=info")),
        )
        .init();

    let config = archie::Config::from_env()?;
    tracing::info!(
        dev_mode = config.dev_mode,
        working_dir = %config.working_dir.display(),
        "Starting archie {}",
        env!("CARGO_PKG_VERSION")
    );

    archie::api::serve(config).await
}

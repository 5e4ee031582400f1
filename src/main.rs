use script_shorts::generator::run_generation;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));

    let code = match run_generation(&config_path).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            1
        }
    };
    std::process::exit(code);
}

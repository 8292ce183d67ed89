use std::sync::Arc;

use crate::cli::{Cli, Commands};
use sitehound::{Config, ScanEngine};

pub async fn run_from_cli(cli: Cli) -> anyhow::Result<()> {
    // Configure logging based on global flags. Keep external crates
    // (reqwest/hyper) at INFO so scan-level debug output stays readable.
    use tracing_subscriber::EnvFilter;
    let crate_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter_str = format!(
        "sitehound={crate_level},reqwest=info,hyper=info,h2=info,hickory_resolver=info,rustls=info"
    );
    let env_filter = EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new(crate_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(true)
        .with_target(false)
        .init();

    let config = Config::from_env();
    let engine = Arc::new(ScanEngine::new(config));

    match cli.command {
        Commands::Scan { url, pretty } => match engine.run(&url).await {
            Ok(report) => {
                let rendered = if pretty {
                    serde_json::to_string_pretty(&report)?
                } else {
                    serde_json::to_string(&report)?
                };
                println!("{rendered}");
            }
            Err(rejection) => {
                eprintln!("scan rejected ({}): {rejection}", rejection.kind());
                std::process::exit(1);
            }
        },
        Commands::Serve { host, port } => {
            let app = sitehound::api::router(engine);
            let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
            tracing::info!(%host, port, "analysis API listening");
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}

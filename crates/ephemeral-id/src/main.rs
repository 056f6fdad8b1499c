//! ephemeral-id: issue requests that carry, adopt, and persist an `x-ephemeral-id`.

use std::sync::Arc;

use ephemeral_id::config::AppConfig;
use ephemeral_id::{
    CookieStore, EphemeralClient, EphemeralIdPipeline, FileCookieStore, HttpPipeline,
    MemoryCookieStore,
};
use http::Method;

fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("EPHEMERAL_ID_CONFIG").ok())
        .unwrap_or_else(|| "ephemeral-id.toml".to_string());

    let method = args
        .iter()
        .position(|a| a == "--method")
        .and_then(|i| args.get(i + 1))
        .map(|m| Method::from_bytes(m.to_uppercase().as_bytes()))
        .transpose()?
        .unwrap_or(Method::GET);

    let mut paths: Vec<String> = args
        .iter()
        .enumerate()
        .filter(|(_, a)| *a == "--path")
        .filter_map(|(i, _)| args.get(i + 1).cloned())
        .collect();
    if paths.is_empty() {
        paths.push("/".to_string());
    }

    let config = AppConfig::load(&config_path)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // OTLP export is optional; without an endpoint this is stderr logging only
        let _tracing_guard = ephemeral_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            base_url = %config.client.base_url,
            jar_path = ?config.cookies.jar_path,
            requests = paths.len(),
            "Starting ephemeral-id"
        );

        run(config, method, paths).await
    })
}

async fn run(config: AppConfig, method: Method, paths: Vec<String>) -> anyhow::Result<()> {
    let cookies: Arc<dyn CookieStore> = match &config.cookies.jar_path {
        Some(path) => Arc::new(FileCookieStore::open(path)?),
        None => Arc::new(MemoryCookieStore::new()),
    };

    let base = HttpPipeline::new(config.client.header_map()?);
    let pipeline = EphemeralIdPipeline::new(base, cookies);
    let mut client = EphemeralClient::from_config(&config.client, pipeline)?;

    for path in &paths {
        match client.request(method.clone(), path, None).await {
            Ok(response) => {
                println!("{} {}", response.status, path);
                println!("{}", response.text());
            }
            Err(e) => {
                tracing::error!(error = %e, path = %path, "Request failed");
                return Err(e.into());
            }
        }
    }

    tracing::info!(
        ephemeral_id_known = client.pipeline().ephemeral_id().is_some(),
        "Done"
    );
    Ok(())
}

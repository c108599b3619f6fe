use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use pagecount_core::config::{CacheBackend, Config};
use pagecount_server::state::AppState;

/// `pagecount health`: liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$PAGECOUNT_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("PAGECOUNT_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

/// `pagecount create-post <title>`: insert a post into the configured
/// database and print it as JSON. Run while the server is stopped; DuckDB
/// holds an exclusive lock on the file.
async fn run_create_post(title: &str) -> Result<()> {
    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    std::fs::create_dir_all(&cfg.data_dir)?;
    let db = pagecount_duckdb::DuckDbBackend::open(&db_path(&cfg), &cfg.duckdb_memory_limit)?;
    let post = db.create_post(title).await?;
    println!("{}", serde_json::to_string(&post)?);
    Ok(())
}

fn db_path(cfg: &Config) -> String {
    format!("{}/pagecount.db", cfg.data_dir)
}

async fn build_state(db: pagecount_duckdb::DuckDbBackend, cfg: Config) -> Result<AppState> {
    match &cfg.cache_backend {
        CacheBackend::Memory => {
            info!("Using in-process dedup cache");
            Ok(AppState::new(db, cfg))
        }
        #[cfg(feature = "redis")]
        CacheBackend::Redis(url) => {
            let cache = pagecount_server::redis_cache::RedisDedupCache::connect(url).await?;
            Ok(AppState::with_cache(db, cfg, Arc::new(cache)))
        }
        #[cfg(not(feature = "redis"))]
        CacheBackend::Redis(_) => anyhow::bail!(
            "PAGECOUNT_CACHE=redis requires a binary built with `--features redis`"
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("health") => run_health_check(),
        Some("create-post") => {
            let title = args[2..].join(" ");
            if title.trim().is_empty() {
                anyhow::bail!("usage: pagecount create-post <title>");
            }
            return run_create_post(title.trim()).await;
        }
        _ => {}
    }
    // Structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pagecount=info".parse()?),
        )
        .json()
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db = pagecount_duckdb::DuckDbBackend::open(&db_path(&cfg), &cfg.duckdb_memory_limit)?;

    info!(
        pv_window_secs = cfg.pv_window_secs,
        uv_window_secs = cfg.uv_window_secs,
        count_timeout_ms = cfg.count_timeout_ms,
        "Visit counting configured"
    );

    let state = Arc::new(build_state(db, cfg.clone()).await?);
    state.seed_configured_posts().await?;

    // Spawn background sweep of expired in-memory dedup marks.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            state.run_cache_sweep_loop().await;
        });
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = pagecount_server::app::build_app(Arc::clone(&state));

    info!(port = cfg.port, "pagecount listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}

mod admission;
mod config;
mod db;
mod llm;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use admission::AdmissionGate;
use admission::store::PgAdmissionStore;
use admission::tier::TierLimitTable;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")))
        .init();

    let config = config::ServerConfig::from_env().expect("invalid configuration");

    let pool = db::init_pool(&config.database_url)
        .await
        .expect("database init failed");

    let started_at = OffsetDateTime::now_utc();
    let tiers = TierLimitTable::from_env();
    let store = Arc::new(PgAdmissionStore::new(pool.clone()));
    let gate = AdmissionGate::new(store, tiers, config.admission_store_timeout);

    // Missing provider keys are not fatal: requests for that provider fail.
    let router = llm::LlmRouter::from_env().expect("LLM client build failed");
    let providers = router.configured();
    if providers.is_empty() {
        tracing::warn!("no LLM provider configured; inference requests will fail");
    } else {
        tracing::info!(?providers, "LLM providers configured");
    }

    // Jobs from a previous run died with it; free the slots their rows hold.
    match services::reaper::recover_interrupted_requests(&gate, started_at).await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(released = n, "failed requests interrupted by restart"),
        Err(e) => tracing::error!(error = %e, "restart recovery failed; stale sweep will retry"),
    }

    let reaper_settings = services::reaper::ReaperSettings {
        interval: config.bucket_reap_interval,
        bucket_grace: config.bucket_reap_grace,
        stale_after: config.stale_request_after,
    };
    let _reaper = services::reaper::spawn_reaper(pool.clone(), gate.clone(), reaper_settings);

    let state = state::AppState::new(pool, gate, Arc::new(router), config.dispatch_max_in_flight);

    let app = routes::app(state);
    let port = config.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "tollgate listening");
    axum::serve(listener, app).await.expect("server failed");
}

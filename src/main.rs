//! citycast HTTP server entry point.

use std::sync::Arc;

use anyhow::Context;
use citycast::{
    CitycastConfig, ResponseCache, SessionStore, UserStore, VERSION,
    cities::CityDirectory,
    db,
    forecast::ForecastClient,
    web::{self, AppState},
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CitycastConfig::load().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("citycast={},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("citycast v{VERSION} starting");

    let pool = Arc::new(db::create_pool(&config.database).context("Failed to open database")?);
    let cache =
        ResponseCache::open(&config.cache.location).context("Failed to open forecast cache")?;
    let cities = CityDirectory::new(&config.cities.dataset_path);
    let forecast = ForecastClient::new(&config.weather, cities.clone(), cache)
        .context("Failed to build forecast client")?;
    let users = UserStore::new(pool).context("Failed to build user store")?;
    let sessions = SessionStore::new(config.session.ttl_minutes);
    let templates = Arc::new(web::build_templates().context("Failed to compile templates")?);

    let state = AppState {
        users,
        sessions,
        cities,
        forecast: Arc::new(forecast),
        templates,
    };

    web::run(&config.server, state).await
}

use std::{env, sync::Arc};

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reflect_ws::{
    config::Config,
    db,
    lms::{Lms, PgLms},
    routes::{self, AppState},
    settings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "reflect_ws=info,axum=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let pool = db::connect(&config.database_url, config.db_max_connections).await?;
    if config.run_migrations {
        // migrations create the LMS tables with the default prefix
        sqlx::migrate!("./migrations").run(&pool).await?;
    }

    let lms: Arc<dyn Lms> = Arc::new(PgLms::new(pool, config.db_prefix.clone()));
    settings::install_defaults(lms.as_ref()).await?;

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::router(AppState {
            lms,
            site_course_id: config.site_course_id,
        }))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)),
        );

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

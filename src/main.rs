use std::sync::Arc;

use axum::Router;
use http::HeaderValue;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use pawhaven_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db = Arc::new(api::db::establish_connection(&cfg).await?);
    if cfg.auto_migrate {
        api::db::run_migrations(&db).await?;
    }

    // Domain event pipeline (best-effort logging consumer)
    let (event_sender, event_rx) = api::events::EventSender::channel(1024);
    tokio::spawn(api::events::process_events(event_rx));

    // Payment provider client
    let gateway = Arc::new(api::payments::StripeGateway::new(
        cfg.stripe.secret_key.clone(),
        cfg.stripe.api_base.clone(),
    ));

    let services = api::handlers::AppServices::new(db.clone(), event_sender.clone(), gateway, &cfg);

    let app_state = api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        services,
    };

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        info!("no CORS origins configured, using permissive CORS");
        CorsLayer::permissive()
    };

    let app = Router::<api::AppState>::new()
        .route("/", axum::routing::get(|| async { "pawhaven-api up" }))
        .nest("/api/v1", api::api_v1_routes())
        .merge(api::openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(app_state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    info!("pawhaven-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

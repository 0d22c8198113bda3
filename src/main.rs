mod config;
mod error;
mod handlers;
mod lookup;
mod respond;
mod token;
mod validate;

use std::{collections::HashSet, net::SocketAddr, sync::Arc};

use axum::http::{HeaderValue, Method};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::{AntiForgeryMode, DomainMatch, ServiceConfig},
    error::ApiError,
    handlers::AppState,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "savefrom=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let config = ServiceConfig::from_env();

    if config.domain_match == DomainMatch::Substring {
        warn!(
            "DOMAIN_MATCH=substring: hosts that merely contain an allow-listed domain are accepted. Set DOMAIN_MATCH=suffix to require the domain or a subdomain of it."
        );
    }
    if config.anti_forgery == AntiForgeryMode::Placeholder {
        warn!(
            "ANTI_FORGERY=placeholder: any non-empty token is accepted. Set ANTI_FORGERY=issued to require tokens from /api/token."
        );
    } else {
        info!(
            "Anti-forgery tokens are issued per client and expire after {}s.",
            config.token_ttl_seconds
        );
    }

    let cors = build_cors_layer(&config)?;
    let addr = config.bind_addr.clone();
    let app = handlers::router(AppState::new(config))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|error| ApiError::internal(format!("Could not bind {addr}: {error}")))?;

    info!("Backend ready on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}

/// CORS for script-driven submissions. Only normalized origins from the
/// configuration are allowed, and only for the methods the routes accept.
fn build_cors_layer(config: &ServiceConfig) -> Result<CorsLayer, ApiError> {
    let (origins, dev_fallback) = config.cors_origins();
    if dev_fallback {
        warn!("ALLOWED_ORIGINS is not set. Falling back to development origins.");
    }

    let normalized_origins = origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                ApiError::internal(format!(
                    "Invalid origin in ALLOWED_ORIGINS: {origin}. Use values like https://example.com"
                ))
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    let allowed_origins = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate({
        let allowed_origins = Arc::clone(&allowed_origins);
        move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let allowed = normalized
                .as_ref()
                .is_some_and(|value| allowed_origins.contains(value));
            debug!(
                "CORS origin check raw={:?} normalized={:?} allowed={}",
                origin, normalized, allowed
            );
            allowed
        }
    });
    info!(
        "CORS allow-list loaded with {} origin(s): {:?}",
        allowed_origins.len(),
        allowed_origins.iter().collect::<Vec<_>>()
    );

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };
    let port = parsed.port();

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match port {
        Some(explicit) if explicit != default_port => Some(format!("{scheme}://{host}:{explicit}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}

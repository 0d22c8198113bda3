use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use axum::{
    Form, Json, Router,
    extract::{ConnectInfo, Query, State, rejection::FormRejection, rejection::QueryRejection},
    http::{HeaderMap, Method},
    response::Response,
    routing::{any, get},
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    config::{AntiForgeryMode, ServiceConfig},
    lookup::{MetadataLookup, SimulatedLookup, fetch_media_info},
    respond::{OutputMode, Responder},
    token::{IssuedToken, IssuedTokenStore, PlaceholderVerifier, TokenVerifier},
    validate::{Submission, Validator},
};

#[derive(Clone)]
pub struct AppState {
    config: Arc<ServiceConfig>,
    validator: Arc<Validator>,
    tokens: Arc<dyn TokenVerifier>,
    lookup: Arc<dyn MetadataLookup>,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        let lookup = Arc::new(SimulatedLookup::new(config.download_base_path.clone()));
        Self::with_lookup(config, lookup)
    }

    pub fn with_lookup(config: ServiceConfig, lookup: Arc<dyn MetadataLookup>) -> Self {
        let tokens: Arc<dyn TokenVerifier> = match config.anti_forgery {
            AntiForgeryMode::Placeholder => Arc::new(PlaceholderVerifier),
            AntiForgeryMode::Issued => Arc::new(IssuedTokenStore::new(config.token_ttl_seconds)),
        };
        let config = Arc::new(config);

        Self {
            validator: Arc::new(Validator::new(Arc::clone(&config), Arc::clone(&tokens))),
            config,
            tokens,
            lookup,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SubmitForm {
    #[serde(default)]
    sf_url: String,
    #[serde(default)]
    csrf_token: Option<String>,
    #[serde(default)]
    lang: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DownloadQuery {
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    url: String,
}

const SUBMIT_PATH: &str = "/savefrom";
const PROXY_CLIENT_HEADERS: [&str; 3] = ["x-forwarded-for", "cf-connecting-ip", "x-real-ip"];

pub fn router(state: AppState) -> Router {
    let download_path = state.config.download_base_path.clone();

    Router::new()
        .route("/", get(form_page))
        .route(SUBMIT_PATH, any(submit))
        .route("/api/health", get(health))
        .route("/api/token", get(issue_token))
        .route(&download_path, get(download_notice))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn form_page(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let client = client_ip_for_request(&state.config, &headers, addr);
    let issued = state.tokens.issue(&client);
    Responder::new(OutputMode::Rendered, None).form_page(SUBMIT_PATH, &issued.token)
}

async fn issue_token(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Json<IssuedToken> {
    let client = client_ip_for_request(&state.config, &headers, addr);
    Json(state.tokens.issue(&client))
}

async fn submit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    form: Result<Form<SubmitForm>, FormRejection>,
) -> Response {
    let mode = OutputMode::from_headers(&headers);
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            debug!("Unreadable submission body, treating as empty: {rejection}");
            SubmitForm::default()
        }
    };
    let responder =
        Responder::new(mode, form.lang.as_deref()).with_retry(&state.config.form_url);

    let submission = Submission {
        method,
        url: form.sf_url,
        token: form.csrf_token,
        client: client_ip_for_request(&state.config, &headers, addr),
    };

    let request = match state.validator.validate(&submission) {
        Ok(request) => request,
        Err(rejection) => {
            info!(
                "Rejected submission from {} ({}): {rejection}",
                submission.client,
                rejection.code()
            );
            return responder.error(&rejection);
        }
    };

    match fetch_media_info(state.lookup.as_ref(), &request, state.config.lookup_timeout).await {
        Ok(media) => {
            info!(
                "Prepared {} format(s) for {} ({:?})",
                media.formats.len(),
                request.host,
                responder.mode()
            );
            responder.success(&media, request.url.as_str())
        }
        Err(rejection) => responder.error(&rejection),
    }
}

async fn download_notice(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Response {
    let responder = Responder::new(OutputMode::from_headers(&headers), None)
        .with_retry(&state.config.form_url);
    let query = query.map(|Query(query)| query).unwrap_or_default();

    if let Err(rejection) = state.validator.check_target(&query.url) {
        return responder.error(&rejection);
    }

    debug!(
        "Download requested for {} as {:?}; answering with simulation notice",
        query.url, query.format
    );
    responder.simulation_notice()
}

/// First address named by a proxy header. Only the left-most entry of a
/// forwarding chain counts, and it has to be an IP address.
fn forwarded_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    PROXY_CLIENT_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)?
            .to_str()
            .ok()?
            .split(',')
            .next()?
            .trim()
            .parse::<IpAddr>()
            .ok()
    })
}

fn client_ip_for_request(config: &ServiceConfig, headers: &HeaderMap, addr: SocketAddr) -> String {
    if config.trust_proxy_headers {
        forwarded_client_ip(headers).unwrap_or(addr.ip()).to_string()
    } else {
        addr.ip().to_string()
    }
}

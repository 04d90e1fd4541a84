use crate::{
    app::{task_runner::read_queue_dump, AppBackend, AppError, AppLocal, VectorizeOpts},
    config::Config,
    eid::Eid,
    ideas::{Idea, IdeaCreate, IdeaQuery, IdeaUpdate, Vote},
    offers::{Deal, Offer, OfferCreate, OfferUpdate},
    session::{self, SessionContext},
    users::{OauthProfile, UserData, UserType},
    vector::VectorizeReport,
    voice::{VoiceError, VoiceSearchOutcome},
};
use axum::{
    extract::{DefaultBodyLimit, Query, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{fmt::Debug, sync::Arc};
use tokio::{signal, sync::RwLock};

#[derive(Clone)]
struct SharedState {
    app: Arc<RwLock<AppLocal>>,
}

async fn start_app(app: AppLocal, uploads_path: String) {
    let app = Arc::new(RwLock::new(app));

    let signal = shutdown_signal(app.clone());
    let shared_state = Arc::new(SharedState { app: app.clone() });

    async fn shutdown_signal(app: Arc<RwLock<AppLocal>>) {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {
                let mut app = app.write().await;
                app.shutdown();

                // join on queue thread handle
                log::warn!("waiting for queues to stop");
                app.wait_task_queue_finish();
            },
            _ = terminate => {},
        }
    }

    let app = Router::new()
        .nest_service(
            "/api/file/",
            tower_http::services::ServeDir::new(uploads_path),
        )
        .route("/api/ideas/search", post(search))
        .route("/api/ideas/create", post(create))
        .route("/api/ideas/update", post(update))
        .route("/api/ideas/delete", post(delete))
        .route("/api/ideas/vote", post(vote))
        .route("/api/ideas/total", post(total))
        .route("/api/ideas/industries", post(industries))
        .route("/api/ideas/upload_media", post(upload_media))
        .route("/api/ideas/vectorize", post(vectorize))
        .route("/api/voice/search", post(voice_search))
        .route("/api/offers/create", post(create_offer))
        .route("/api/offers/update", post(update_offer))
        .route("/api/offers/by_idea", post(offers_by_idea))
        .route("/api/deals/create", post(create_deal))
        .route("/api/deals/by_user", post(deals_by_user))
        .route("/api/users/upsert", post(upsert_user))
        .route("/oauth/callback/founder", get(oauth_founder))
        .route("/oauth/callback/distributor", get(oauth_distributor))
        .route("/api/session/me", get(session_me))
        .route("/api/config", get(get_config))
        .route("/api/config", post(update_config))
        .route("/api/task_queue", get(task_queue))
        .layer(middleware::from_fn(require_bearer))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
    log::info!("listening on 0.0.0.0:8080");
    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .unwrap();
}

pub fn start_daemon(app: AppLocal, uploads_path: String) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(app, uploads_path).await });
}

/// When COLAUNCH_AUTH_TOKEN is set on the daemon, every request must
/// carry a matching bearer token. Comparison is constant-time.
async fn require_bearer(request: Request, next: Next) -> Response {
    let expected = match std::env::var("COLAUNCH_AUTH_TOKEN") {
        Ok(token) if !token.trim().is_empty() => token.trim().to_string(),
        _ => return next.run(request).await,
    };

    let provided = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(session::extract_bearer_token);

    match provided {
        Some(token) if session::validate_token(token, &expected) => next.run(request).await,
        _ => (
            axum::http::StatusCode::UNAUTHORIZED,
            json!({"error": "invalid bearer token"}).to_string(),
        )
            .into_response(),
    }
}

// Make our own error that wraps `AppError`.
#[derive(Debug)]
struct HttpError(AppError);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            AppError::NotFound => (
                axum::http::StatusCode::NOT_FOUND,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::Unauthorized(_) => (
                axum::http::StatusCode::UNAUTHORIZED,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::Base64(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            AppError::Voice(VoiceError::EmptyTranscript) => (
                axum::http::StatusCode::BAD_REQUEST,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::Voice(_) | AppError::Ai(_) | AppError::Vector(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::BAD_GATEWAY,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            AppError::Reqwest(_) | AppError::IO(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
        }
        .into_response()
    }
}

// This enables using `?` on functions that return `Result<_, AppError>`
// to turn them into `Result<_, HttpError>` without manual mapping.
impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<IdeaQuery>,
) -> Result<axum::Json<Vec<Idea>>, HttpError> {
    let app = state.app.clone();

    log::debug!("payload: {payload:?}");

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.search(payload).map(Into::into).map_err(Into::into)
    })
}

#[derive(Deserialize, Serialize)]
pub struct IdeaCreateRequest {
    #[serde(flatten)]
    pub create: IdeaCreate,

    /// Media files as base64, stored and appended in order
    #[serde(default)]
    pub media_b64: Vec<String>,
}

impl Debug for IdeaCreateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "IdeaCreateRequest {{ create: {:?}, media_b64: [REDACTED; {}] }}",
            self.create,
            self.media_b64.len()
        )
    }
}

async fn create(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<IdeaCreateRequest>,
) -> Result<axum::Json<Idea>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();

        let mut idea = app.create(payload.create)?;

        for media in payload.media_b64 {
            let file = STANDARD.decode(media)?;
            idea = app.upload_media(&idea.id, file)?;
        }

        Ok(idea.into())
    })
}

#[derive(Debug, Deserialize)]
struct IdeaUpdateRequest {
    id: Eid,
    update: IdeaUpdate,
}

async fn update(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<IdeaUpdateRequest>,
) -> Result<axum::Json<Idea>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.update(&payload.id, payload.update)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct IdeaIdRequest {
    id: Eid,
}

async fn delete(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<IdeaIdRequest>,
) -> Result<axum::Json<()>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.delete(&payload.id).map(Into::into).map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct VoteRequest {
    id: Eid,
    direction: Vote,
}

async fn vote(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<VoteRequest>,
) -> Result<axum::Json<Idea>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.vote(&payload.id, payload.direction)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TotalResponse {
    pub total: usize,
}

async fn total(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<TotalResponse>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.total()
            .map(|total| TotalResponse { total }.into())
            .map_err(Into::into)
    })
}

async fn industries(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<Vec<String>>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.industries().map(Into::into).map_err(Into::into)
    })
}

#[derive(Deserialize)]
struct UploadMediaRequest {
    id: Eid,
    media_b64: String,
}

impl Debug for UploadMediaRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UploadMediaRequest {{ id: {}, media_b64: [REDACTED] }}",
            self.id
        )
    }
}

async fn upload_media(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<UploadMediaRequest>,
) -> Result<axum::Json<Idea>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        let file = STANDARD.decode(payload.media_b64)?;
        app.upload_media(&payload.id, file)
            .map(Into::into)
            .map_err(Into::into)
    })
}

async fn vectorize(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<VectorizeOpts>,
) -> Result<axum::Json<Option<VectorizeReport>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.vectorize(payload).map(Into::into).map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct VoiceSearchRequest {
    transcript: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VoiceSearchResponse {
    pub show_search_bar: bool,
    #[serde(flatten)]
    pub outcome: VoiceSearchOutcome,
}

async fn voice_search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<VoiceSearchRequest>,
) -> Result<axum::Json<VoiceSearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();

        let outcome = match app.voice_search(&payload.transcript) {
            Ok(outcome) => outcome,
            Err(AppError::Voice(VoiceError::EmptyTranscript)) => {
                return Err(HttpError(AppError::Voice(VoiceError::EmptyTranscript)))
            }
            // pipeline failures degrade to the manual search bar
            Err(err) => {
                log::error!("voice search failed: {err:?}");
                VoiceSearchOutcome::NoMatch { interpreted: None }
            }
        };

        Ok(VoiceSearchResponse {
            show_search_bar: outcome.show_search_bar(),
            outcome,
        }
        .into())
    })
}

async fn create_offer(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<OfferCreate>,
) -> Result<axum::Json<Offer>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.create_offer(payload).map(Into::into).map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct OfferUpdateRequest {
    id: Eid,
    update: OfferUpdate,
}

async fn update_offer(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<OfferUpdateRequest>,
) -> Result<axum::Json<Offer>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.update_offer(&payload.id, payload.update)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct OffersByIdeaRequest {
    idea_id: Eid,
}

async fn offers_by_idea(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<OffersByIdeaRequest>,
) -> Result<axum::Json<Vec<Offer>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.offers_for_idea(&payload.idea_id)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct DealCreateRequest {
    offer_id: Eid,
    to_user: Eid,
}

async fn create_deal(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<DealCreateRequest>,
) -> Result<axum::Json<Deal>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.make_deal(&payload.offer_id, &payload.to_user)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct DealsByUserRequest {
    user_id: Eid,
}

async fn deals_by_user(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<DealsByUserRequest>,
) -> Result<axum::Json<Vec<Deal>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.deals_for_user(&payload.user_id)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct UpsertUserRequest {
    profile: OauthProfile,
    user_type: UserType,
}

async fn upsert_user(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<UpsertUserRequest>,
) -> Result<axum::Json<UserData>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.upsert_oauth_user(payload.profile, payload.user_type)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct OauthCallbackQuery {
    token: Option<String>,
}

/// Where each callback flavor lands on success and failure.
struct OauthRoutes {
    user_type: UserType,
    success: &'static str,
    login: &'static str,
}

const FOUNDER_ROUTES: OauthRoutes = OauthRoutes {
    user_type: UserType::Founder,
    success: "/signup/thankyou",
    login: "/signup",
};

const DISTRIBUTOR_ROUTES: OauthRoutes = OauthRoutes {
    user_type: UserType::Distributor,
    success: "/dashboard",
    login: "/dashboard/login",
};

async fn oauth_founder(
    State(state): State<Arc<SharedState>>,
    Query(query): Query<OauthCallbackQuery>,
) -> Redirect {
    oauth_callback(state, query, FOUNDER_ROUTES).await
}

async fn oauth_distributor(
    State(state): State<Arc<SharedState>>,
    Query(query): Query<OauthCallbackQuery>,
) -> Redirect {
    oauth_callback(state, query, DISTRIBUTOR_ROUTES).await
}

/// Receive the provider's URL-encoded JSON profile, upsert the user
/// keyed by email, and redirect to the dashboard with the user JSON
/// (and a session token when a signing secret is configured) attached
/// as query parameters. Malformed blobs land on the login route.
async fn oauth_callback(
    state: Arc<SharedState>,
    query: OauthCallbackQuery,
    routes: OauthRoutes,
) -> Redirect {
    let Some(token) = query.token else {
        log::error!("oauth callback without token parameter");
        return Redirect::to(routes.login);
    };

    let profile = match OauthProfile::parse(&token) {
        Ok(profile) => profile,
        Err(err) => {
            log::error!("malformed oauth profile: {err}");
            return Redirect::to(routes.login);
        }
    };

    let app = state.app.clone();
    let result = tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.upsert_oauth_user(profile, routes.user_type)
    });

    match result {
        Ok(user) => {
            let user_json = serde_json::to_string(&user).expect("user serializes");
            let mut target = url::form_urlencoded::Serializer::new(String::new());
            target.append_pair("user", &user_json);

            if let Ok(secret) = session::secret_from_env() {
                let config = tokio::task::block_in_place(|| {
                    let app = state.app.blocking_read();
                    let config = app.config().expect("local config");
                    let session = config.read().expect("config lock poisoned").session.clone();
                    session
                });
                let session = SessionContext::issue(user, &secret, &config);
                target.append_pair("session", &session.token);
            }

            Redirect::to(&format!("{}?{}", routes.success, target.finish()))
        }
        Err(err) => {
            log::error!("oauth upsert failed: {err:?}");
            Redirect::to(routes.login)
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionMeResponse {
    user: UserData,
    /// A reissued token when the presented one was inside the refresh
    /// window, otherwise absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    refreshed_token: Option<String>,
}

async fn session_me(
    State(state): State<Arc<SharedState>>,
    headers: axum::http::HeaderMap,
) -> Result<axum::Json<SessionMeResponse>, HttpError> {
    let secret =
        session::secret_from_env().map_err(|err| HttpError(AppError::Other(err.into())))?;

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(session::extract_bearer_token)
        .ok_or_else(|| {
            HttpError(AppError::Unauthorized("missing bearer token".to_string()))
        })?;

    let context = SessionContext::verify(token, &secret)
        .map_err(|err| HttpError(AppError::Unauthorized(err.to_string())))?;

    let session_config = tokio::task::block_in_place(|| {
        let app = state.app.blocking_read();
        let config = app.config().expect("local config");
        let session = config.read().expect("config lock poisoned").session.clone();
        session
    });

    let refreshed_token = context
        .needs_refresh(&session_config)
        .then(|| context.refresh(&secret, &session_config).token);

    Ok(SessionMeResponse {
        user: context.claims.user,
        refreshed_token,
    }
    .into())
}

async fn get_config(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<Config>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        let config = app.config()?;
        let config = config.read().expect("config lock poisoned").clone();
        Ok(config.into())
    })
}

async fn update_config(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<Config>,
) -> Result<axum::Json<Config>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.update_config(payload)?;
        let config = app.config()?;
        let config = config.read().expect("config lock poisoned").clone();
        Ok(config.into())
    })
}

async fn task_queue() -> Result<axum::Json<crate::app::task_runner::QueueDump>, HttpError> {
    tokio::task::block_in_place(move || Ok(read_queue_dump().into()))
}

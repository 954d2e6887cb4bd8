use crate::{
    api::routes::{
        create_tournament, decide_registration, delete_tournament, get_capacity, get_registration,
        get_subject_registration, get_tournament, health, list_registrations, list_tournaments,
        start_tournament, stream_signals, submit_registration, transition_tournament,
        update_tournament,
    },
    config::Settings,
    domain::{Coordinator, SignalHub, TournamentStore},
    infra::{
        bracket::{BracketClient, BracketGenerator},
        db::{DBConnection, DatabasePoolConfig},
        file_utils::create_folder,
    },
};

// Mock implementations only available with e2e-testing feature or debug builds
#[cfg(any(feature = "e2e-testing", debug_assertions))]
use crate::infra::bracket_mock::MockBracketGenerator;
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::{connect_info::IntoMakeServiceWithConnectInfo, ConnectInfo, Request},
    http::{Extensions, HeaderValue},
    middleware::{self, AddExtension, Next},
    response::IntoResponse,
    routing::{get, post},
    serve::Serve,
    Router,
};
use hyper::{
    header::{HeaderName, ACCEPT, CONTENT_TYPE},
    Method,
};
use log::{error, info, warn};
use reqwest_middleware::{
    reqwest::{self, Client, Url},
    ClientBuilder, ClientWithMiddleware, Middleware,
};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::{net::SocketAddr, str::FromStr, sync::Arc, time::Duration};
use tokio::signal::unix::{signal, SignalKind};
use tokio::{net::TcpListener, select};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::api::extractors::ACTOR_ID_HEADER;

pub struct Application {
    server: Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    cancellation_token: CancellationToken,
    background_tasks: TaskTracker,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let address = format!(
            "{}:{}",
            config.api_settings.domain, config.api_settings.port
        );
        let listener = SocketAddr::from_str(&address)?;
        let (app_state, background_tasks, cancellation_token) = build_app(config.clone()).await?;
        let server = build_server(listener, app_state, config.api_settings.origins).await?;
        Ok(Self {
            server,
            cancellation_token,
            background_tasks,
        })
    }

    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        info!("Starting server...");
        let cancellation_token = self.cancellation_token.clone();
        let shutdown = async move {
            shutdown_signal().await;
            // ends open signal streams so connections can drain
            cancellation_token.cancel();
        };

        match self.server.with_graceful_shutdown(shutdown).await {
            Ok(_) => {
                info!("Server shutdown initiated");
                self.cancellation_token.cancel();

                let timeout = tokio::time::sleep(Duration::from_secs(10));
                select! {
                    _ = self.background_tasks.wait() => {
                        info!("Background tasks completed gracefully");
                    }
                    _ = timeout => {
                        warn!("Background tasks timed out during shutdown");
                    }
                }

                info!("Shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Server shutdown error: {}", e);
                self.cancellation_token.cancel();

                let _ =
                    tokio::time::timeout(Duration::from_secs(5), self.background_tasks.wait())
                        .await;

                Err(anyhow!("Error during server shutdown: {}", e))
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub cancellation_token: CancellationToken,
}

pub async fn build_app(
    config: Settings,
) -> Result<(AppState, TaskTracker, CancellationToken), anyhow::Error> {
    let bracket_generator = build_bracket_generator(&config)?;

    create_folder(&config.db_settings.data_folder.clone());

    let pool_config: DatabasePoolConfig = config.db_settings.clone().into();
    let tournament_db =
        DBConnection::new(&config.db_settings.data_folder, "tournaments", pool_config)
            .await
            .map_err(|e| anyhow!("Error setting up tournament db: {}", e))?;

    let coordinator = Arc::new(Coordinator::new(
        TournamentStore::new(tournament_db),
        bracket_generator,
        SignalHub::new(config.tournament_settings.signal_capacity),
        Duration::from_secs(config.bracket_settings.timeout_secs),
    ));
    info!("Coordinator service configured");

    // nothing runs in the background yet, closing keeps shutdown from waiting on it
    let tracker = TaskTracker::new();
    tracker.close();
    let cancel_token = CancellationToken::new();

    let app_state = AppState {
        coordinator,
        cancellation_token: cancel_token.clone(),
    };
    Ok((app_state, tracker, cancel_token))
}

#[cfg(any(feature = "e2e-testing", debug_assertions))]
fn build_bracket_generator(config: &Settings) -> Result<Arc<dyn BracketGenerator>, anyhow::Error> {
    if config.bracket_settings.mock_enabled {
        info!("Mock bracket generator configured");
        return Ok(Arc::new(MockBracketGenerator::new()));
    }
    build_bracket_client(config)
}

#[cfg(not(any(feature = "e2e-testing", debug_assertions)))]
fn build_bracket_generator(config: &Settings) -> Result<Arc<dyn BracketGenerator>, anyhow::Error> {
    if config.bracket_settings.mock_enabled {
        return Err(anyhow!(
            "Mock bracket generator requires e2e-testing feature or debug build"
        ));
    }
    build_bracket_client(config)
}

fn build_bracket_client(config: &Settings) -> Result<Arc<dyn BracketGenerator>, anyhow::Error> {
    let base_url = Url::parse(&config.bracket_settings.base_url)
        .map_err(|e| anyhow!("Failed to parse bracket service url: {}", e))?;
    let client = build_reqwest_client(config.bracket_settings.max_retries);
    info!("Bracket client configured for {}", base_url);
    Ok(Arc::new(BracketClient::new(client, &base_url)))
}

pub async fn build_server(
    socket_addr: SocketAddr,
    app_state: AppState,
    origins: Vec<String>,
) -> Result<
    Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    anyhow::Error,
> {
    let listener = TcpListener::bind(socket_addr).await?;

    info!("Setting up service");
    let app = app(app_state, origins);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    info!(
        "Service running @: http://{}:{}",
        socket_addr.ip(),
        socket_addr.port()
    );
    Ok(server)
}

pub fn app(app_state: AppState, origins: Vec<String>) -> Router {
    let origins: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static(ACTOR_ID_HEADER),
        ])
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true);

    let tournament_endpoints = Router::new()
        .route("/", post(create_tournament).get(list_tournaments))
        .route(
            "/{tournament_id}",
            get(get_tournament)
                .patch(update_tournament)
                .delete(delete_tournament),
        )
        .route("/{tournament_id}/status", post(transition_tournament))
        .route("/{tournament_id}/start", post(start_tournament))
        .route("/{tournament_id}/capacity", get(get_capacity))
        .route(
            "/{tournament_id}/registrations",
            post(submit_registration).get(list_registrations),
        )
        .route(
            "/{tournament_id}/registrations/subjects/{subject_id}",
            get(get_subject_registration),
        );

    let registration_endpoints = Router::new()
        .route("/{registration_id}", get(get_registration))
        .route("/{registration_id}/decision", post(decide_registration));

    Router::new()
        .route("/api/v1/health_check", get(health))
        .route("/api/v1/signals", get(stream_signals))
        .nest("/api/v1/tournaments", tournament_endpoints)
        .nest("/api/v1/registrations", registration_endpoints)
        .layer(middleware::from_fn(log_request))
        .with_state(Arc::new(app_state))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}

pub fn build_reqwest_client(max_retries: u32) -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
    ClientBuilder::new(Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(LoggingMiddleware)
        .build()
}

struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let method = req.method().clone();
        let url = req.url().clone();

        info!("Making {} request to: {}", method, url);

        let result = next.run(req, extensions).await;

        match &result {
            Ok(response) => {
                info!("{} {} -> Status: {}", method, url, response.status());
            }
            Err(error) => {
                warn!("{} {} -> Error: {:?}", method, url, error);
            }
        }

        result
    }
}

async fn shutdown_signal() {
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

    select! {
        _ = sigint.recv() => info!("Received SIGINT signal"),
        _ = sigterm.recv() => info!("Received SIGTERM signal"),
    }
}

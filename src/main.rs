use actix_cors::Cors;
use actix_web::{web, App, HttpServer, HttpResponse, middleware, error, http::StatusCode};
use lume_intake::config::Settings;
use lume_intake::core::{EmbeddingGenerator, EventDeduplicator, Matcher, ProfileExtractor, ProfileSync};
use lume_intake::routes::{self, AppState};
use lume_intake::services::{
    IdempotencyStore, MatchStore, MemoryIdempotencyStore, MemoryMatchStore, MemoryProfileStore,
    OpenAiClient, PostgresClient, ProfileStore, RedisIdempotencyStore,
};
use std::sync::Arc;
use tracing::{info, warn, error};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "ValidationError".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle path parameter errors
pub fn handle_path_error(err: error::PathError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "ValidationError".to_string(),
        message: format!("Invalid path: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn startup_error(what: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", what, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", what, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    init_logging(&settings.logging.level, &settings.logging.format);

    info!("Starting Lume Intake service...");

    if settings.openai.api_key.is_empty() {
        warn!("OPENAI_API_KEY is not set, extraction and embedding calls will fail");
    }

    let openai = Arc::new(
        OpenAiClient::new(
            settings.openai.base_url.clone(),
            settings.openai.api_key.clone(),
            settings.openai.extraction_model.clone(),
            settings.openai.embedding_model.clone(),
            settings.openai.embedding_dimensions,
            settings.openai.request_timeout(),
        )
        .map_err(|e| startup_error("Failed to build OpenAI client", e))?,
    );

    info!(
        "OpenAI client initialized (extraction: {}, embedding: {} x{})",
        settings.openai.extraction_model, settings.openai.embedding_model, settings.openai.embedding_dimensions
    );

    // Profile and match stores
    let (profiles, matches) = match &settings.database.url {
        Some(url) => {
            let postgres = Arc::new(
                PostgresClient::from_settings(
                    url,
                    settings.database.max_connections,
                    settings.database.min_connections,
                    settings.database.acquire_timeout_secs,
                    settings.database.idle_timeout_secs,
                )
                .await
                .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?,
            );
            info!("PostgreSQL stores initialized");
            let profiles: Arc<dyn ProfileStore> = postgres.clone();
            let matches: Arc<dyn MatchStore> = postgres;
            (profiles, matches)
        }
        None => {
            warn!("No database url configured, using in-memory stores");
            let profiles: Arc<dyn ProfileStore> = Arc::new(MemoryProfileStore::new());
            let matches: Arc<dyn MatchStore> = Arc::new(MemoryMatchStore::new());
            (profiles, matches)
        }
    };

    // Idempotency store
    let idempotency: Arc<dyn IdempotencyStore> = match &settings.idempotency.redis_url {
        Some(url) => {
            let redis = RedisIdempotencyStore::new(url)
                .await
                .map_err(|e| startup_error("Failed to connect to Redis", e))?;
            info!("Redis idempotency store initialized");
            Arc::new(redis)
        }
        None => {
            warn!("No redis url configured, deduplicating in process only");
            Arc::new(MemoryIdempotencyStore::new(settings.idempotency.capacity))
        }
    };

    let matcher = Matcher::new(settings.matching.top_k, settings.matching.similarity_threshold);

    info!(
        "Matcher initialized (top_k: {}, threshold: {})",
        matcher.top_k(),
        matcher.threshold()
    );

    let sync = ProfileSync::new(
        profiles,
        matches,
        ProfileExtractor::new(openai.clone()),
        EmbeddingGenerator::new(openai, settings.openai.embedding_dimensions),
        EventDeduplicator::new(
            idempotency,
            settings.idempotency.in_flight_ttl(),
            settings.idempotency.processed_ttl(),
        ),
        matcher,
    );

    // Build application state
    let app_state = AppState { sync: Arc::new(sync) };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::PathConfig::default().error_handler(handle_path_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}

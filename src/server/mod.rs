// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HTTP service.
//!
//! One model is shared by every request. Sessions need exclusive access to
//! run, so the detector sits behind a mutex and requests are serialised at the
//! model call; decoding, annotation and encoding run outside the lock on
//! tokio's blocking pool. A request that panics mid-inference does not take
//! the model down with it.

pub mod error;
pub mod handlers;
pub mod schema;

use std::sync::{Arc, Mutex};

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::annotate::Annotator;
use crate::error::{InferenceError, Result};
use crate::io::DEFAULT_JPEG_QUALITY;
use crate::model::Detector;
use crate::results::Results;

use self::schema::ApiDoc;

/// Default listen address.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default listen port.
pub const DEFAULT_PORT: u16 = 8000;
/// Default upload limit in MiB.
pub const DEFAULT_MAX_UPLOAD_MB: usize = 20;

/// Shared application state.
pub struct AppState {
    detector: Mutex<Box<dyn Detector>>,
    model_path: String,
    annotator: Annotator,
    jpeg_quality: u8,
}

impl AppState {
    /// Wrap a loaded detector.
    #[must_use]
    pub fn new(detector: Box<dyn Detector>, annotator: Annotator) -> Self {
        let model_path = detector.model_path().to_string();
        Self {
            detector: Mutex::new(detector),
            model_path,
            annotator,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Set the JPEG quality of annotated images.
    #[must_use]
    pub const fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Model path reported by `/health`.
    #[must_use]
    pub fn model_path(&self) -> &str {
        &self.model_path
    }

    #[must_use]
    pub const fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    #[must_use]
    pub const fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Run the detector. Blocks while another request holds the model.
    ///
    /// A detector keeps no state between calls, so a lock poisoned by a
    /// panicking request is taken over by the next one.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InferenceError`] if inference fails.
    pub fn detect(&self, image: &image::DynamicImage) -> Result<Results> {
        let results = {
            let mut detector = self.detector.lock().unwrap_or_else(|poisoned| {
                warn!("Recovering model lock after a panicked inference");
                poisoned.into_inner()
            });
            detector.predict(image)?
        };

        info!(
            "{}x{}: {} ({:.1}ms)",
            results.orig_shape.1,
            results.orig_shape.0,
            results.verbose(),
            results.speed.total()
        );
        Ok(results)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("model_path", &self.model_path)
            .field("annotator", &self.annotator)
            .field("jpeg_quality", &self.jpeg_quality)
            .finish_non_exhaustive()
    }
}

/// Network-facing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; `*` allows any origin.
    pub cors_origins: Vec<String>,
    /// Maximum request body size in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: vec!["*".to_string()],
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// `host:port` to bind.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// CORS policy: any method and header, origins as configured.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ConfigError`] for an origin that is not a
    /// valid header value.
    pub fn cors_layer(&self) -> Result<CorsLayer> {
        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

        if self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*") {
            return Ok(layer.allow_origin(Any));
        }

        let origins = self
            .cors_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|_| {
                    InferenceError::ConfigError(format!("invalid CORS origin '{origin}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(layer.allow_origin(AllowOrigin::list(origins)))
    }
}

/// Build the application router.
///
/// # Errors
///
/// Returns [`InferenceError::ConfigError`] for an invalid CORS origin.
pub fn create_app(state: Arc<AppState>, config: &ServerConfig) -> Result<Router> {
    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/predict", post(handlers::predict))
        .route("/predict-image", post(handlers::predict_image))
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(config.cors_layer()?)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

/// Bind and serve until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns [`InferenceError::Io`] if the address cannot be bound or the
/// server fails, and [`InferenceError::ConfigError`] for an invalid CORS origin.
pub async fn serve(state: Arc<AppState>, config: &ServerConfig) -> Result<()> {
    let app = create_app(state, config)?;

    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    let local_addr = listener.local_addr()?;
    info!("Server listening on http://{local_addr}");
    info!("Swagger UI available at http://{local_addr}/docs");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}

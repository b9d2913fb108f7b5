pub mod admission_request;
pub mod admission_response;
pub mod api;
mod certs;
pub mod cli;
pub mod config;
pub mod crd;
pub mod lister;
pub mod tracing;
pub mod validation;

use ::tracing::info;
use anyhow::{anyhow, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::{self, TraceLayer};

use api::{
    handlers::{healthz_handler, validate_handler},
    state::ApiServerState,
};
use config::{Config, TlsConfig};
use lister::{build_kube_client, KubeResourceLister, ResourceLister};
use validation::CrdDeletionValidator;

/// AdmissionReviews of CRDs embed the whole object, large OpenAPI schemas included
const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

pub struct CrdDeletionGuard {
    router: Router,
    addr: SocketAddr,
    tls_config: TlsConfig,
}

impl CrdDeletionGuard {
    /// Connect to the Kubernetes cluster and build the webhook
    pub async fn new_from_config(config: Config) -> Result<Self> {
        let client = build_kube_client(config.kubeconfig.as_deref()).await?;
        let lister = Arc::new(KubeResourceLister::new(client));

        Ok(Self::new_with_lister(config, lister))
    }

    /// Build the webhook on top of the given `ResourceLister`
    pub fn new_with_lister(config: Config, lister: Arc<dyn ResourceLister>) -> Self {
        if config.crd_filter.is_empty() {
            info!("deletion of every CRD is guarded");
        } else {
            info!(crds = ?config.crd_filter, "deletion of selected CRDs is guarded");
        }

        let state = Arc::new(ApiServerState {
            validator: CrdDeletionValidator::new(lister, config.crd_filter, config.list_timeout),
        });

        let router = Router::new()
            .route("/validate", post(validate_handler))
            .route("/healthz", get(healthz_handler))
            .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new().level(::tracing::Level::DEBUG))
                    .on_response(trace::DefaultOnResponse::new().level(::tracing::Level::DEBUG)),
            )
            .with_state(state);

        Self {
            router,
            addr: config.addr,
            tls_config: config.tls_config,
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve the webhook over TLS until the server stops
    pub async fn run(self) -> Result<()> {
        let rustls_config: RustlsConfig =
            certs::create_tls_config_and_watch_certificate_changes(self.tls_config).await?;

        info!(address = self.addr.to_string().as_str(), "started HTTPS server");
        axum_server::bind_rustls(self.addr, rustls_config)
            .serve(self.router.into_make_service())
            .await
            .map_err(|e| anyhow!("HTTPS server error: {e}"))
    }
}

//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use unimarket_core::DisbursementProvider;

use crate::config::ServerConfig;
use crate::gateways::{self, Disburser, FlipClient, MidtransClient, XenditClient};
use crate::services::realtime::RealtimeHub;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections, gateway clients and
/// configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    midtrans: MidtransClient,
    flip: FlipClient,
    xendit: XenditClient,
    realtime: RealtimeHub,
}

impl AppState {
    /// Create a new application state.
    ///
    /// All gateway clients share one `reqwest::Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ServerConfig, pool: PgPool) -> Result<Self, reqwest::Error> {
        let http = gateways::http_client()?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                midtrans: MidtransClient::new(http.clone(), &config.midtrans),
                flip: FlipClient::new(http.clone(), &config.flip),
                xendit: XenditClient::new(http, &config.xendit),
                realtime: RealtimeHub::new(),
                config,
                pool,
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn midtrans(&self) -> &MidtransClient {
        &self.inner.midtrans
    }

    #[must_use]
    pub fn flip(&self) -> &FlipClient {
        &self.inner.flip
    }

    #[must_use]
    pub fn xendit(&self) -> &XenditClient {
        &self.inner.xendit
    }

    /// Get a reference to the realtime event hub.
    #[must_use]
    pub fn realtime(&self) -> &RealtimeHub {
        &self.inner.realtime
    }

    /// The disbursement client for `provider`.
    #[must_use]
    pub fn disburser(&self, provider: DisbursementProvider) -> Disburser<'_> {
        match provider {
            DisbursementProvider::Flip => Disburser::Flip(&self.inner.flip),
            DisbursementProvider::Xendit => Disburser::Xendit(&self.inner.xendit),
        }
    }
}

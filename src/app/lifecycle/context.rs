use crate::app::config::SageConfig;
use crate::app::state::AppState;
use crate::core::store::Store;
use actix_web::dev::ServerHandle;
use opentelemetry_sdk::trace::SdkTracerProvider;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

/// Context shared by the startup and shutdown pipelines: everything
/// built while booting lands here, and shutdown tears it down again.
#[derive(Default)]
pub struct StartupContext {
    pub config: OnceLock<SageConfig>,
    pub otel_provider: Mutex<Option<SdkTracerProvider>>,
    pub store: OnceLock<Arc<dyn Store>>,
    pub app: OnceLock<Arc<AppState>>,
    pub server: OnceLock<ServerHandle>,
}

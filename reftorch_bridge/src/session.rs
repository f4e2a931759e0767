use reftorch_native::{BackendKind, CpuBackend};
#[cfg(feature = "torch")]
use reftorch_native::TorchBackend;
use tracing::info;

use crate::config::BridgeConfig;
use crate::dispatch::{Bridge, Invocation};
use crate::error::{BridgeResult, ConfigError};
use crate::logging;
use crate::node::Node;
use crate::view::{Span, ViewField};
use crate::writer::Output;

/// A bridge whose backend was picked at runtime.
#[derive(Debug)]
pub enum Session {
    Cpu(Bridge<CpuBackend>),
    #[cfg(feature = "torch")]
    Torch(Bridge<TorchBackend>),
}

impl Session {
    /// Builds the configured backend and installs the stderr subscriber with
    /// `cfg.log_filter` unless one is already set.
    pub fn from_config(cfg: &BridgeConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        logging::init_logging(&cfg.log_filter);
        let session = match cfg.backend_kind()? {
            BackendKind::Cpu => Session::Cpu(Bridge::new(CpuBackend::new(cfg.seed, cfg.max_elements))),
            #[cfg(feature = "torch")]
            BackendKind::Torch => {
                Session::Torch(Bridge::new(TorchBackend::new(&cfg.device, cfg.seed)?))
            }
            #[cfg(not(feature = "torch"))]
            BackendKind::Torch => return Err(ConfigError::BackendUnavailable(cfg.backend.clone())),
        };
        info!(backend = %session.kind(), device = %cfg.device, "session ready");
        Ok(session)
    }

    pub fn cpu(seed: u64, max_elements: usize) -> Self {
        Session::Cpu(Bridge::new(CpuBackend::new(seed, max_elements)))
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Session::Cpu(_) => BackendKind::Cpu,
            #[cfg(feature = "torch")]
            Session::Torch(_) => BackendKind::Torch,
        }
    }

    pub fn invoke(&mut self, name: &str, field: &mut ViewField, span: Span) -> Invocation {
        match self {
            Session::Cpu(bridge) => bridge.invoke(name, field, span),
            #[cfg(feature = "torch")]
            Session::Torch(bridge) => bridge.invoke(name, field, span),
        }
    }

    pub fn call(&mut self, name: &str, args: &[Node]) -> BridgeResult<Output> {
        match self {
            Session::Cpu(bridge) => bridge.call(name, args),
            #[cfg(feature = "torch")]
            Session::Torch(bridge) => bridge.call(name, args),
        }
    }

    pub fn live_count(&self) -> usize {
        match self {
            Session::Cpu(bridge) => bridge.live_count(),
            #[cfg(feature = "torch")]
            Session::Torch(bridge) => bridge.live_count(),
        }
    }
}

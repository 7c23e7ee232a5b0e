use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::compactor;
use crate::engine::Engine;
use crate::limits::*;
use crate::notify::{self, LogSink, NotifyHub};

/// Manages per-tenant engines. Each tenant gets its own Engine + WAL +
/// compactor + notification dispatcher.
/// Tenant = database name from the pgwire connection.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    shutdown: CancellationToken,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            shutdown: CancellationToken::new(),
        }
    }

    /// Get or lazily create an engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Sanitize tenant name to prevent path traversal
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let hub = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(safe_name, wal_path, hub.clone())?);

        // Spawn compactor + notification dispatcher for this tenant
        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        let token = self.shutdown.child_token();
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold, token).await;
        });
        let token = self.shutdown.child_token();
        tokio::spawn(async move {
            notify::run_dispatcher(hub, Arc::new(LogSink), token).await;
        });

        self.engines.insert(tenant.to_string(), engine.clone());
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }

    /// Stop all per-tenant background tasks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

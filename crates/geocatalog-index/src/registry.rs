//! Per storage-connection cache of connection managers

use geocatalog_client::ConnectionSettings;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use ulid::Ulid;

use crate::connection::{ConnectionFactory, ConnectionManager};
use crate::error::{IndexError, IndexResult};

/// A host storage connection.
///
/// Managers are cached here by the persistent id of the index they serve,
/// so every request sharing this connection reuses the same manager.
#[derive(Debug)]
pub struct StorageConnection {
    id: Ulid,
    foreign_connections: Mutex<HashMap<Ulid, Arc<ConnectionManager>>>,
}

impl StorageConnection {
    pub fn new() -> Self {
        Self {
            id: Ulid::new(),
            foreign_connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Manager for the index `oid`.
    ///
    /// A cached manager is replaced when its settings (URI, page size,
    /// timeout) no longer match.
    pub fn manager_for(
        &self,
        oid: Ulid,
        settings: ConnectionSettings,
        factory: &ConnectionFactory,
    ) -> IndexResult<Arc<ConnectionManager>> {
        let mut managers = self
            .foreign_connections
            .lock()
            .map_err(|e| IndexError::Lock(e.to_string()))?;

        if let Some(existing) = managers.get(&oid) {
            if existing.settings() == &settings {
                return Ok(existing.clone());
            }
            tracing::debug!(
                "Settings for index {} changed ({} -> {}), replacing its connection manager",
                oid,
                existing.uri(),
                settings.uri
            );
        }

        let manager = Arc::new(ConnectionManager::new(settings, factory.clone())?);
        managers.insert(oid, manager.clone());
        Ok(manager)
    }

    /// Number of cached managers
    pub fn len(&self) -> usize {
        self.foreign_connections.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StorageConnection {
    fn default() -> Self {
        Self::new()
    }
}

//! Connection manager: one spatial service client per index configuration,
//! participating in host transactions

use async_trait::async_trait;
use geocatalog_client::{ClientResult, ConnectionSettings, HttpSpatialClient, SpatialService};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{IndexError, IndexResult};
use crate::transaction::{
    DataManager, NoRollbackSavepoint, RollbackHandle, Transaction, TransactionId,
};

/// Builds a service client from connection settings
pub type ConnectionFactory =
    Arc<dyn Fn(&ConnectionSettings) -> ClientResult<Arc<dyn SpatialService>> + Send + Sync>;

/// Factory producing HTTP clients
pub fn http_factory() -> ConnectionFactory {
    Arc::new(|settings: &ConnectionSettings| -> ClientResult<Arc<dyn SpatialService>> {
        let client = HttpSpatialClient::new(settings.clone())?;
        Ok(Arc::new(client) as Arc<dyn SpatialService>)
    })
}

/// Where the manager stands in the commit protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    Idle,
    Joined(TransactionId),
    Voting(TransactionId),
}

/// Binds one client to one index configuration and joins host transactions
/// on the first write
pub struct ConnectionManager {
    settings: ConnectionSettings,
    factory: ConnectionFactory,
    connection: Mutex<Option<Arc<dyn SpatialService>>>,
    state: Mutex<ParticipantState>,
}

impl ConnectionManager {
    pub fn new(settings: ConnectionSettings, factory: ConnectionFactory) -> IndexResult<Self> {
        let connection = factory(&settings)?;
        tracing::debug!("Opened spatial service connection to {}", settings.uri);
        Ok(Self {
            settings,
            factory,
            connection: Mutex::new(Some(connection)),
            state: Mutex::new(ParticipantState::Idle),
        })
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn uri(&self) -> &str {
        &self.settings.uri
    }

    pub fn state(&self) -> ParticipantState {
        self.lock_state()
            .map(|s| *s)
            .unwrap_or(ParticipantState::Idle)
    }

    fn lock_state(&self) -> IndexResult<MutexGuard<'_, ParticipantState>> {
        self.state.lock().map_err(|e| IndexError::Lock(e.to_string()))
    }

    fn lock_connection(&self) -> IndexResult<MutexGuard<'_, Option<Arc<dyn SpatialService>>>> {
        self.connection
            .lock()
            .map_err(|e| IndexError::Lock(e.to_string()))
    }

    /// The cached client, recreated if a previous abort discarded it
    pub fn connection(&self) -> IndexResult<Arc<dyn SpatialService>> {
        let mut slot = self.lock_connection()?;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = (self.factory)(&self.settings)?;
        tracing::debug!("Reopened spatial service connection to {}", self.settings.uri);
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Join `txn` before a write. Only the first call per transaction joins.
    pub fn set_changed(self: &Arc<Self>, txn: &Transaction) -> IndexResult<()> {
        {
            let mut state = self.lock_state()?;
            match *state {
                ParticipantState::Joined(id) | ParticipantState::Voting(id) if id == txn.id() => {
                    return Ok(());
                }
                ParticipantState::Idle => {}
                other => {
                    tracing::debug!(
                        "{} left {:?} without finishing, joining {}",
                        self.settings.uri,
                        other,
                        txn.id()
                    );
                }
            }
            *state = ParticipantState::Joined(txn.id());
        }

        if let Err(e) = txn.join(self.clone()) {
            *self.lock_state()? = ParticipantState::Idle;
            return Err(e);
        }
        tracing::debug!("{} joined transaction {}", self.settings.uri, txn.id());
        Ok(())
    }

    fn reset(&self) {
        if let Ok(mut state) = self.lock_state() {
            *state = ParticipantState::Idle;
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("uri", &self.settings.uri)
            .field("page_size", &self.settings.page_size)
            .field("state", &self.state())
            .finish()
    }
}

#[async_trait]
impl DataManager for ConnectionManager {
    async fn tpc_begin(&self, _txn: TransactionId) -> IndexResult<()> {
        Ok(())
    }

    async fn commit(&self, _txn: TransactionId) -> IndexResult<()> {
        Ok(())
    }

    async fn tpc_vote(&self, txn: TransactionId) -> IndexResult<()> {
        // Surface connection failures now rather than in finish
        self.connection()?;
        *self.lock_state()? = ParticipantState::Voting(txn);
        Ok(())
    }

    async fn tpc_finish(&self, txn: TransactionId) -> IndexResult<()> {
        let result = match self.connection() {
            Ok(conn) => conn.commit().await.map_err(IndexError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                self.reset();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Commit to {} failed: {}", self.settings.uri, e);
                self.abort(txn).await;
                Err(e)
            }
        }
    }

    async fn tpc_abort(&self, txn: TransactionId) {
        self.abort(txn).await;
    }

    async fn abort(&self, txn: TransactionId) {
        let conn = self.lock_connection().ok().and_then(|mut slot| slot.take());
        if let Some(conn) = conn {
            conn.close().await;
        }
        self.reset();
        tracing::debug!("{} aborted transaction {}", self.settings.uri, txn);
    }

    fn sort_key(&self) -> String {
        self.settings.uri.clone()
    }

    fn savepoint(&self) -> Box<dyn RollbackHandle> {
        Box::new(NoRollbackSavepoint::new(self.settings.uri.clone()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transaction::TransactionStatus;
    use geocatalog_client::{ClientError, MemorySpatialService};
    use geocatalog_core::{
        BatchRequest, DocumentId, IndexRecord, QuerySpec, ScoredItem, ServiceStats,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Factory handing out fresh in-memory services and counting them
    pub(crate) fn counting_factory() -> (ConnectionFactory, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let factory: ConnectionFactory = Arc::new(
            move |settings: &ConnectionSettings| -> ClientResult<Arc<dyn SpatialService>> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MemorySpatialService::with_uri(settings.uri.clone())))
            },
        );
        (factory, created)
    }

    /// A service whose commit always fails
    struct FailingCommit;

    #[async_trait]
    impl SpatialService for FailingCommit {
        fn uri(&self) -> &str {
            "memory://failing"
        }

        async fn info(&self) -> ClientResult<ServiceStats> {
            Err(ClientError::Unreachable("down".to_string()))
        }

        async fn items(&self, _document_id: DocumentId) -> ClientResult<Vec<IndexRecord>> {
            Ok(Vec::new())
        }

        async fn query(&self, _spec: &QuerySpec) -> ClientResult<Vec<ScoredItem>> {
            Ok(Vec::new())
        }

        async fn batch(&self, _request: &BatchRequest) -> ClientResult<()> {
            Ok(())
        }

        async fn commit(&self) -> ClientResult<()> {
            Err(ClientError::Unreachable("connection lost".to_string()))
        }
    }

    fn manager(factory: ConnectionFactory) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(ConnectionSettings::new("memory://a"), factory).unwrap())
    }

    #[tokio::test]
    async fn test_abort_discards_connection() {
        let (factory, created) = counting_factory();
        let cm = manager(factory);
        let before = cm.connection().unwrap();
        assert!(Arc::ptr_eq(&before, &cm.connection().unwrap()));

        let txn = Transaction::begin();
        cm.set_changed(&txn).unwrap();
        cm.tpc_abort(txn.id()).await;
        assert_eq!(cm.state(), ParticipantState::Idle);

        let after = cm.connection().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_set_changed_joins_once() {
        let (factory, _) = counting_factory();
        let cm = manager(factory);
        let txn = Transaction::begin();

        cm.set_changed(&txn).unwrap();
        cm.set_changed(&txn).unwrap();
        assert_eq!(txn.participant_count(), 1);
        assert_eq!(cm.state(), ParticipantState::Joined(txn.id()));

        txn.commit().await.unwrap();
        assert_eq!(cm.state(), ParticipantState::Idle);

        // A new transaction joins again
        let next = Transaction::begin();
        cm.set_changed(&next).unwrap();
        assert_eq!(next.participant_count(), 1);
    }

    #[tokio::test]
    async fn test_vote_reopens_connection() {
        let (factory, created) = counting_factory();
        let cm = manager(factory);
        let txn = Transaction::begin();
        cm.abort(txn.id()).await;
        assert_eq!(created.load(Ordering::SeqCst), 1);

        cm.tpc_vote(txn.id()).await.unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(cm.state(), ParticipantState::Voting(txn.id()));
    }

    #[tokio::test]
    async fn test_failed_finish_aborts_and_propagates() {
        let factory: ConnectionFactory = Arc::new(
            |_: &ConnectionSettings| -> ClientResult<Arc<dyn SpatialService>> {
                Ok(Arc::new(FailingCommit))
            },
        );
        let cm = manager(factory);
        let before = cm.connection().unwrap();
        let txn = Transaction::begin();
        cm.set_changed(&txn).unwrap();

        let err = txn.commit().await.unwrap_err();
        assert!(matches!(err, IndexError::Client(ClientError::Unreachable(_))));
        assert_eq!(cm.state(), ParticipantState::Idle);
        assert!(!Arc::ptr_eq(&before, &cm.connection().unwrap()));
    }

    #[tokio::test]
    async fn test_vote_surfaces_connection_failure() {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = opened.clone();
        let factory: ConnectionFactory = Arc::new(
            move |settings: &ConnectionSettings| -> ClientResult<Arc<dyn SpatialService>> {
                if counter.fetch_add(1, Ordering::SeqCst) > 0 {
                    return Err(ClientError::Unreachable("refused".to_string()));
                }
                Ok(Arc::new(MemorySpatialService::with_uri(settings.uri.clone())))
            },
        );
        let cm = manager(factory);
        let txn = Transaction::begin();
        cm.abort(txn.id()).await;
        cm.set_changed(&txn).unwrap();

        let err = txn.commit().await.unwrap_err();
        assert!(matches!(err, IndexError::Client(ClientError::Unreachable(ref m)) if m == "refused"));
        assert_eq!(txn.status(), TransactionStatus::Aborted);
        assert_eq!(cm.state(), ParticipantState::Idle);
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sort_key_is_uri() {
        let (factory, _) = counting_factory();
        let cm = manager(factory);
        assert_eq!(cm.sort_key(), "memory://a");
    }

    #[test]
    fn test_factory_failure() {
        let factory: ConnectionFactory = Arc::new(
            |_: &ConnectionSettings| -> ClientResult<Arc<dyn SpatialService>> {
                Err(ClientError::Setup("no tls backend".to_string()))
            },
        );
        let err = ConnectionManager::new(ConnectionSettings::new("memory://a"), factory).unwrap_err();
        assert!(matches!(err, IndexError::Client(ClientError::Setup(_))));
    }
}

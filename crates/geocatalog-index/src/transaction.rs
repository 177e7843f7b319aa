//! Explicit host transactions with two-phase commit participants
//!
//! A [`Transaction`] is a cheap, clonable handle. Participants implementing
//! [`DataManager`] join it while work is done and are driven through
//! `tpc_begin → commit → tpc_vote → tpc_finish` when it commits, or `abort`
//! when it is rolled back.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use ulid::Ulid;

use crate::error::{IndexError, IndexResult};

/// Unique identifier for a transaction
pub type TransactionId = Ulid;

/// Lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committing,
    Committed,
    Aborted,
}

/// Handle returned by a participant's savepoint
pub trait RollbackHandle: Send + Sync {
    fn rollback(&self) -> IndexResult<()>;
}

/// Two-phase commit participant
#[async_trait]
pub trait DataManager: Send + Sync {
    async fn tpc_begin(&self, txn: TransactionId) -> IndexResult<()>;

    async fn commit(&self, txn: TransactionId) -> IndexResult<()>;

    async fn tpc_vote(&self, txn: TransactionId) -> IndexResult<()>;

    async fn tpc_finish(&self, txn: TransactionId) -> IndexResult<()>;

    async fn tpc_abort(&self, txn: TransactionId);

    async fn abort(&self, txn: TransactionId);

    /// Orders participants within a commit
    fn sort_key(&self) -> String;

    fn savepoint(&self) -> Box<dyn RollbackHandle>;
}

struct TransactionState {
    status: TransactionStatus,
    participants: Vec<Arc<dyn DataManager>>,
}

/// A host transaction
#[derive(Clone)]
pub struct Transaction {
    id: TransactionId,
    state: Arc<Mutex<TransactionState>>,
}

impl Transaction {
    pub fn begin() -> Self {
        Self {
            id: Ulid::new(),
            state: Arc::new(Mutex::new(TransactionState {
                status: TransactionStatus::Active,
                participants: Vec::new(),
            })),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    fn state(&self) -> IndexResult<MutexGuard<'_, TransactionState>> {
        self.state
            .lock()
            .map_err(|e| IndexError::Lock(e.to_string()))
    }

    pub fn status(&self) -> TransactionStatus {
        self.state()
            .map(|s| s.status)
            .unwrap_or(TransactionStatus::Aborted)
    }

    pub fn participant_count(&self) -> usize {
        self.state().map(|s| s.participants.len()).unwrap_or(0)
    }

    /// Register a participant for the commit protocol
    pub fn join(&self, participant: Arc<dyn DataManager>) -> IndexResult<()> {
        let mut state = self.state()?;
        if state.status != TransactionStatus::Active {
            return Err(IndexError::Transaction(format!(
                "cannot join transaction {} in state {:?}",
                self.id, state.status
            )));
        }
        state.participants.push(participant);
        Ok(())
    }

    /// Savepoint across every current participant
    pub fn savepoint(&self) -> IndexResult<Savepoint> {
        let state = self.state()?;
        Ok(Savepoint {
            handles: state.participants.iter().map(|p| p.savepoint()).collect(),
        })
    }

    /// Take the participants, ordered by sort key, and move to `status`
    fn take_participants(
        &self,
        status: TransactionStatus,
    ) -> IndexResult<Vec<Arc<dyn DataManager>>> {
        let mut state = self.state()?;
        if state.status != TransactionStatus::Active {
            return Err(IndexError::Transaction(format!(
                "transaction {} is {:?}",
                self.id, state.status
            )));
        }
        state.status = status;
        let mut participants = std::mem::take(&mut state.participants);
        participants.sort_by_key(|p| p.sort_key());
        Ok(participants)
    }

    fn set_status(&self, status: TransactionStatus) {
        if let Ok(mut state) = self.state() {
            state.status = status;
        }
    }

    /// Run the two-phase commit.
    ///
    /// A failure before `tpc_finish` aborts every participant. A failure in
    /// `tpc_finish` is returned after the remaining participants finish.
    pub async fn commit(&self) -> IndexResult<()> {
        let participants = self.take_participants(TransactionStatus::Committing)?;
        tracing::debug!(
            "Committing transaction {} with {} participants",
            self.id,
            participants.len()
        );

        if let Err(e) = self.first_phase(&participants).await {
            tracing::warn!("Transaction {} failed before finish: {}", self.id, e);
            for p in &participants {
                p.tpc_abort(self.id).await;
                p.abort(self.id).await;
            }
            self.set_status(TransactionStatus::Aborted);
            return Err(e);
        }

        let mut failure = None;
        for p in &participants {
            if let Err(e) = p.tpc_finish(self.id).await {
                tracing::warn!("Participant {} failed to finish: {}", p.sort_key(), e);
                failure.get_or_insert(e);
            }
        }

        match failure {
            Some(e) => {
                self.set_status(TransactionStatus::Aborted);
                Err(e)
            }
            None => {
                self.set_status(TransactionStatus::Committed);
                Ok(())
            }
        }
    }

    async fn first_phase(&self, participants: &[Arc<dyn DataManager>]) -> IndexResult<()> {
        for p in participants {
            p.tpc_begin(self.id).await?;
        }
        for p in participants {
            p.commit(self.id).await?;
        }
        for p in participants {
            p.tpc_vote(self.id).await?;
        }
        Ok(())
    }

    /// Roll back: every participant is told to abort
    pub async fn abort(&self) -> IndexResult<()> {
        let participants = self.take_participants(TransactionStatus::Aborted)?;
        tracing::debug!("Aborting transaction {}", self.id);
        for p in &participants {
            p.abort(self.id).await;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("participants", &self.participant_count())
            .finish()
    }
}

/// Savepoint over all participants of a transaction
pub struct Savepoint {
    handles: Vec<Box<dyn RollbackHandle>>,
}

impl Savepoint {
    pub fn rollback(&self) -> IndexResult<()> {
        for handle in &self.handles {
            handle.rollback()?;
        }
        Ok(())
    }
}

/// Savepoint for a participant whose writes cannot be undone
pub struct NoRollbackSavepoint {
    sort_key: String,
}

impl NoRollbackSavepoint {
    pub fn new(sort_key: impl Into<String>) -> Self {
        Self {
            sort_key: sort_key.into(),
        }
    }
}

impl RollbackHandle for NoRollbackSavepoint {
    fn rollback(&self) -> IndexResult<()> {
        tracing::debug!(
            "Savepoint rollback for {} leaves already sent writes in place",
            self.sort_key
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Records every call it receives
    struct Recorder {
        key: String,
        log: Arc<StdMutex<Vec<String>>>,
        fail_vote: bool,
        fail_finish: bool,
    }

    impl Recorder {
        fn new(key: &str, log: &Arc<StdMutex<Vec<String>>>) -> Self {
            Self {
                key: key.to_string(),
                log: log.clone(),
                fail_vote: false,
                fail_finish: false,
            }
        }

        fn record(&self, call: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", self.key, call));
        }
    }

    #[async_trait]
    impl DataManager for Recorder {
        async fn tpc_begin(&self, _txn: TransactionId) -> IndexResult<()> {
            self.record("begin");
            Ok(())
        }

        async fn commit(&self, _txn: TransactionId) -> IndexResult<()> {
            self.record("commit");
            Ok(())
        }

        async fn tpc_vote(&self, _txn: TransactionId) -> IndexResult<()> {
            self.record("vote");
            if self.fail_vote {
                return Err(IndexError::Transaction("vote failed".to_string()));
            }
            Ok(())
        }

        async fn tpc_finish(&self, _txn: TransactionId) -> IndexResult<()> {
            self.record("finish");
            if self.fail_finish {
                return Err(IndexError::Transaction("finish failed".to_string()));
            }
            Ok(())
        }

        async fn tpc_abort(&self, _txn: TransactionId) {
            self.record("tpc_abort");
        }

        async fn abort(&self, _txn: TransactionId) {
            self.record("abort");
        }

        fn sort_key(&self) -> String {
            self.key.clone()
        }

        fn savepoint(&self) -> Box<dyn RollbackHandle> {
            Box::new(NoRollbackSavepoint::new(self.key.clone()))
        }
    }

    #[tokio::test]
    async fn test_commit_runs_phases_in_sort_order() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let txn = Transaction::begin();
        txn.join(Arc::new(Recorder::new("b", &log))).unwrap();
        txn.join(Arc::new(Recorder::new("a", &log))).unwrap();

        txn.commit().await.unwrap();

        assert_eq!(txn.status(), TransactionStatus::Committed);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:begin", "b:begin", "a:commit", "b:commit", "a:vote", "b:vote", "a:finish",
                "b:finish"
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_vote_aborts_everyone() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let txn = Transaction::begin();
        let mut failing = Recorder::new("a", &log);
        failing.fail_vote = true;
        txn.join(Arc::new(failing)).unwrap();
        txn.join(Arc::new(Recorder::new("b", &log))).unwrap();

        assert!(txn.commit().await.is_err());
        assert_eq!(txn.status(), TransactionStatus::Aborted);

        let log = log.lock().unwrap();
        assert!(!log.iter().any(|c| c.ends_with(":finish")));
        assert!(log.contains(&"a:abort".to_string()));
        assert!(log.contains(&"b:abort".to_string()));
    }

    #[tokio::test]
    async fn test_failed_finish_is_reported() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let txn = Transaction::begin();
        let mut failing = Recorder::new("a", &log);
        failing.fail_finish = true;
        txn.join(Arc::new(failing)).unwrap();
        txn.join(Arc::new(Recorder::new("b", &log))).unwrap();

        assert!(txn.commit().await.is_err());
        assert!(log.lock().unwrap().contains(&"b:finish".to_string()));
        assert_eq!(txn.status(), TransactionStatus::Aborted);
    }

    #[tokio::test]
    async fn test_cannot_join_finished_transaction() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let txn = Transaction::begin();
        txn.abort().await.unwrap();
        assert!(txn.join(Arc::new(Recorder::new("a", &log))).is_err());
        assert!(txn.commit().await.is_err());
    }

    #[test]
    fn test_savepoint_rollback_is_noop() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let txn = Transaction::begin();
        txn.join(Arc::new(Recorder::new("a", &log))).unwrap();
        let savepoint = txn.savepoint().unwrap();
        assert!(savepoint.rollback().is_ok());
        assert_eq!(txn.participant_count(), 1);
    }
}

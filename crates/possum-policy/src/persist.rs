//! Background persistence
//!
//! Verdicts are computed from memory; writing decisions to disk happens on a
//! dedicated thread so a slow disk never holds up a request.

use possum_storage::Database;
use tokio::sync::{mpsc, oneshot};

use crate::error::PolicyError;
use crate::Result;

enum PersistOp {
    Put { key: String, value: String },
    Delete { key: String },
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub(crate) struct Persister {
    tx: mpsc::UnboundedSender<PersistOp>,
}

impl Persister {
    /// Spawn the writer thread. It exits once every handle is dropped.
    pub fn spawn(db: Database) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistOp>();

        std::thread::Builder::new()
            .name("possum-persist".to_string())
            .spawn(move || {
                while let Some(op) = rx.blocking_recv() {
                    let result = match op {
                        PersistOp::Put { key, value } => db.put_entry(&key, &value),
                        PersistOp::Delete { key } => db.delete_entry(&key),
                        PersistOp::Flush(done) => {
                            let _ = done.send(());
                            Ok(())
                        }
                    };

                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to persist action");
                    }
                }
                tracing::debug!("Persistence writer stopped");
            })
            .map_err(|_| PolicyError::WriterClosed)?;

        Ok(Self { tx })
    }

    pub fn put(&self, key: String, value: String) {
        if self.tx.send(PersistOp::Put { key, value }).is_err() {
            tracing::warn!("Persistence writer gone, dropping write");
        }
    }

    pub fn delete(&self, key: String) {
        if self.tx.send(PersistOp::Delete { key }).is_err() {
            tracing::warn!("Persistence writer gone, dropping delete");
        }
    }

    /// Block until every write queued before this call has been applied.
    ///
    /// Must not be called from inside an async runtime; use [`Self::flush_async`].
    pub fn flush(&self) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(PersistOp::Flush(done))
            .map_err(|_| PolicyError::WriterClosed)?;
        wait.blocking_recv().map_err(|_| PolicyError::WriterClosed)
    }

    pub async fn flush_async(&self) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(PersistOp::Flush(done))
            .map_err(|_| PolicyError::WriterClosed)?;
        wait.await.map_err(|_| PolicyError::WriterClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_are_applied_in_order() {
        let db = Database::open_in_memory().unwrap();
        let persister = Persister::spawn(db.clone()).unwrap();

        persister.put("url:a".to_string(), "1".to_string());
        persister.put("url:a".to_string(), "2".to_string());
        persister.put("url:b".to_string(), "3".to_string());
        persister.delete("url:b".to_string());
        persister.flush().unwrap();

        assert_eq!(db.get_entry("url:a").unwrap().as_deref(), Some("2"));
        assert!(db.get_entry("url:b").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flush_async() {
        let db = Database::open_in_memory().unwrap();
        let persister = Persister::spawn(db.clone()).unwrap();

        persister.put("host:t.test".to_string(), "{}".to_string());
        persister.flush_async().await.unwrap();

        assert_eq!(db.get_entry("host:t.test").unwrap().as_deref(), Some("{}"));
    }
}

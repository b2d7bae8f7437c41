//! Bounded pool of segment write tasks.
//!
//! A single upload can carry many segments; at most `size` of them are
//! on disk duty at once. `submit` parks the caller while every permit is
//! taken, which is what throttles a fast sender, and `drain` joins every
//! spawned task so no write outlives the connection that queued it.

use crate::error::{DepotError, Result};
use crate::store;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Concurrent write tasks per connection.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// One segment bound for disk.
#[derive(Debug, Clone)]
pub struct WriteJob {
    pub path: PathBuf,
    pub offset: u64,
    pub data: Bytes,
}

/// What became of one job.
#[derive(Debug)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub result: Result<u64>,
}

pub struct WritePool {
    permits: Arc<Semaphore>,
    tasks: JoinSet<WriteOutcome>,
}

impl WritePool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Queue one segment write, suspending until a permit frees up.
    /// The task holds its permit for as long as it runs.
    pub async fn submit(&mut self, job: WriteJob) -> Result<()> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DepotError::PoolClosed)?;

        self.tasks.spawn(async move {
            let _permit = permit;
            let result = store::write_segment(&job.path, job.offset, &job.data).await;
            if let Err(ref e) = result {
                tracing::warn!(path = %job.path.display(), "segment write failed: {e}");
            }
            WriteOutcome {
                path: job.path,
                result,
            }
        });
        Ok(())
    }

    /// Join every outstanding task and collect what happened. A panicked
    /// task is logged here; its segment simply has no outcome.
    pub async fn drain(&mut self) -> Vec<WriteOutcome> {
        let mut outcomes = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("write task died before reporting: {e}"),
            }
        }
        outcomes
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;
    use tempfile::TempDir;

    fn job(dir: &TempDir, name: &str, data: &[u8]) -> WriteJob {
        WriteJob {
            path: dir.path().join(name),
            offset: 0,
            data: Bytes::copy_from_slice(data),
        }
    }

    #[tokio::test]
    async fn test_pool_writes_everything_submitted() {
        let tmp = TempDir::new().unwrap();
        let mut pool = WritePool::new(2);

        for i in 0..5 {
            let name = format!("f{i}.txt");
            let body = format!("contents {i}");
            pool.submit(job(&tmp, &name, body.as_bytes())).await.unwrap();
        }

        let outcomes = pool.drain().await;
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));

        for i in 0..5 {
            let body = stdfs::read(tmp.path().join(format!("f{i}.txt"))).unwrap();
            assert_eq!(body, format!("contents {i}").as_bytes());
        }
    }

    #[tokio::test]
    async fn test_pool_reports_failed_writes() {
        let tmp = TempDir::new().unwrap();
        let mut pool = WritePool::new(2);

        pool.submit(job(&tmp, "good.txt", b"fine")).await.unwrap();
        // A directory in place of the destination file fails the open.
        stdfs::create_dir(tmp.path().join("blocked")).unwrap();
        pool.submit(job(&tmp, "blocked", b"nope")).await.unwrap();

        let outcomes = pool.drain().await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes.iter().filter(|o| o.result.is_ok()).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| o.result.is_err()).count(), 1);
        assert_eq!(stdfs::read(tmp.path().join("good.txt")).unwrap(), b"fine");
    }

    #[tokio::test]
    async fn test_drain_on_empty_pool() {
        let mut pool = WritePool::new(4);
        assert!(pool.drain().await.is_empty());
    }

    #[tokio::test]
    async fn test_single_permit_serializes_jobs() {
        let tmp = TempDir::new().unwrap();
        let mut pool = WritePool::new(1);
        let path = tmp.path().join("chunked.bin");

        pool.submit(WriteJob {
            path: path.clone(),
            offset: 0,
            data: Bytes::from_static(b"hello "),
        })
        .await
        .unwrap();
        pool.submit(WriteJob {
            path: path.clone(),
            offset: 6,
            data: Bytes::from_static(b"world"),
        })
        .await
        .unwrap();

        let outcomes = pool.drain().await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(stdfs::read(&path).unwrap(), b"hello world");
    }
}

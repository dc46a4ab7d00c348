//! Bounded worker pool with fan-in result aggregation and cooperative
//! cancellation.
//!
//! Producers submit [`Job`]s into a bounded [`FifoQueue`]. A fixed set of
//! workers pull jobs, run a [`Handler`] on each, and send the
//! [`JobResult`]s to a fan-in task that merges them into one [`Results`]
//! stream in completion order. A [`Canceller`] stops everything at the next
//! suspension point; in-flight jobs are never interrupted.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tributary::{Canceller, FifoQueue, Job, JobError, WorkerPool};
//!
//! # async fn run() -> tributary::Result<()> {
//! let queue = Arc::new(FifoQueue::new(8)?);
//! let (pool, results) = WorkerPool::start(3, queue, Canceller::new(), |job: Job<u32, u32>| async move {
//!     let (_, n) = job.into_parts();
//!     Ok::<_, JobError>(n * 2)
//! })?;
//!
//! for id in 1..=5 {
//!     pool.submit(Job::new(id, id)).await?;
//! }
//! pool.close();
//!
//! let report = results.collect().await;
//! assert_eq!(report.results.len(), 5);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod error;
pub mod handler;
pub mod job;
pub mod logging;
pub mod queue;
pub mod worker;
pub mod worker_pool;

pub use aggregator::{Completion, Report, Results};
pub use cancel::Canceller;
pub use config::PoolConfig;
pub use error::{Error, Result};
pub use handler::Handler;
pub use job::{Job, JobError, JobId, JobResult, JobStatus};
pub use queue::{FifoQueue, Next, Queue};
pub use worker::{WorkerExit, WorkerId, WorkerState};
pub use worker_pool::{PoolState, WorkerPool};

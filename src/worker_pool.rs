use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::aggregator::{self, with_counters, Completion, Counters, Results, SharedCounters};
use crate::cancel::Canceller;
use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::job::{Job, JobId};
use crate::queue::{FifoQueue, Queue};
use crate::worker::{Worker, WorkerExit};

// One in-flight result per worker; the fan-in task forwards without blocking.
const WORKER_MAILBOX: usize = 1;

/// Point-in-time view of a pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PoolState {
    pub workers: usize,
    pub live_workers: usize,
    pub queue_open: bool,
    /// Results handed to the [`Results`] consumer. Results produced after
    /// the consumer was dropped are discarded and not counted.
    pub results_emitted: u64,
}

/// A fixed set of workers pulling jobs from a shared queue.
///
/// Results come out of the [`Results`] handle returned by [`start`](Self::start).
/// Dropping the pool closes its queue, so workers finish what is queued and
/// exit instead of waiting forever. A configured timeout still applies.
pub struct WorkerPool<I, P, Q = FifoQueue<Job<I, P>>>
where
    Q: Queue<Job<I, P>>,
{
    size: usize,
    queue: Arc<Q>,
    cancel: Canceller,
    handles: Vec<JoinHandle<WorkerExit>>,
    counters: SharedCounters,
    deadline: Option<JoinHandle<()>>,
    _jobs: PhantomData<fn(Job<I, P>)>,
}

impl<I, P, Q> WorkerPool<I, P, Q>
where
    I: JobId,
    P: Send + 'static,
    Q: Queue<Job<I, P>> + 'static,
{
    /// Spawns `pool_size` workers on the current Tokio runtime.
    pub fn start<O, H>(
        pool_size: usize,
        queue: Arc<Q>,
        cancel: Canceller,
        handler: H,
    ) -> Result<(Self, Results<I, O>)>
    where
        O: Send + 'static,
        H: Handler<I, P, O>,
    {
        if pool_size == 0 {
            return Err(Error::invalid_config("pool needs at least one worker"));
        }

        let handler = Arc::new(handler);
        let counters = Arc::new(Mutex::new(Counters {
            live_workers: pool_size,
            results_emitted: 0,
        }));

        let mut handles = Vec::with_capacity(pool_size);
        let mut mailboxes = Vec::with_capacity(pool_size);
        for id in 0..pool_size {
            let (tx, rx) = mpsc::channel(WORKER_MAILBOX);
            let worker = Worker::new(id, queue.clone(), handler.clone(), cancel.clone(), tx);
            handles.push(worker.spawn());
            mailboxes.push((id, rx));
        }

        let results = aggregator::spawn(mailboxes, counters.clone());
        info!(pool_size, capacity = queue.capacity(), "worker pool started");

        let pool = Self {
            size: pool_size,
            queue,
            cancel,
            handles,
            counters,
            deadline: None,
            _jobs: PhantomData,
        };
        Ok((pool, results))
    }

    pub async fn submit(&self, job: Job<I, P>) -> Result<()> {
        self.queue.submit(job, &self.cancel).await
    }

    pub fn close(&self) {
        self.queue.close()
    }

    pub fn cancel(&self) {
        self.cancel.trigger()
    }

    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    pub fn canceller(&self) -> &Canceller {
        &self.cancel
    }

    pub fn state(&self) -> PoolState {
        let (live_workers, results_emitted) =
            with_counters(&self.counters, |c| (c.live_workers, c.results_emitted));
        PoolState {
            workers: self.size,
            live_workers,
            queue_open: !self.queue.is_closed(),
            results_emitted,
        }
    }

    /// Closes the queue and waits for every worker to drain it and exit.
    pub async fn join(mut self) -> Completion {
        self.queue.close();

        let mut completion = Completion::Drained;
        for handle in std::mem::take(&mut self.handles) {
            match handle.await {
                Ok(WorkerExit::Exhausted) => {}
                Ok(WorkerExit::Cancelled) => completion = Completion::Cancelled,
                Err(e) => {
                    error!(error = %e, "worker task failed");
                    completion = Completion::Cancelled;
                }
            }
        }

        if let Some(deadline) = self.deadline.take() {
            deadline.abort();
        }
        info!(?completion, "worker pool stopped");
        completion
    }

    /// Triggers cancellation and waits for every worker to exit. In-flight
    /// jobs still finish and their results are still delivered.
    pub async fn stop(self) -> Completion {
        self.cancel.trigger();
        self.join().await
    }
}

impl<I, P> WorkerPool<I, P, FifoQueue<Job<I, P>>>
where
    I: JobId,
    P: Send + 'static,
{
    /// Builds the queue and canceller from `config` and starts the pool,
    /// arming the configured timeout if there is one.
    pub fn from_config<O, H>(config: &PoolConfig, handler: H) -> Result<(Self, Results<I, O>)>
    where
        O: Send + 'static,
        H: Handler<I, P, O>,
    {
        config.validate()?;
        let queue = Arc::new(FifoQueue::new(config.queue_capacity)?);
        let cancel = Canceller::new();
        let (mut pool, results) = Self::start(config.workers, queue, cancel, handler)?;

        if let Some(timeout) = config.timeout() {
            pool.deadline = Some(pool.cancel.trigger_after(timeout));
        }
        Ok((pool, results))
    }
}

impl<I, P, Q> Drop for WorkerPool<I, P, Q>
where
    Q: Queue<Job<I, P>>,
{
    // The deadline task is left running: it still has to cancel whatever
    // the workers are draining, and it exits by itself once cancelled.
    fn drop(&mut self) {
        self.queue.close();
    }
}

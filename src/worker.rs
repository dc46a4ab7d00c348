use futures::FutureExt;
use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, trace, warn};
use tracing_futures::Instrument;

use crate::cancel::Canceller;
use crate::handler::Handler;
use crate::job::{Job, JobError, JobId, JobResult};
use crate::queue::{Next, Queue};

pub type WorkerId = usize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Idle,
    Processing,
    Stopped,
}

/// Why a worker stopped pulling jobs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WorkerExit {
    /// The queue was closed and drained.
    Exhausted,
    Cancelled,
}

#[derive(Debug)]
pub(crate) enum WorkerMail<I, O> {
    Finished(JobResult<I, O>),
    Exited(WorkerExit),
}

pub(crate) struct Worker<I, P, O, Q, H> {
    id: WorkerId,
    state: WorkerState,
    queue: Arc<Q>,
    handler: Arc<H>,
    cancel: Canceller,
    mail: mpsc::Sender<WorkerMail<I, O>>,
    _payload: PhantomData<fn(P)>,
}

impl<I, P, O, Q, H> Worker<I, P, O, Q, H>
where
    I: JobId,
    P: Send + 'static,
    O: Send + 'static,
    Q: Queue<Job<I, P>> + 'static,
    H: Handler<I, P, O>,
{
    pub(crate) fn new(
        id: WorkerId,
        queue: Arc<Q>,
        handler: Arc<H>,
        cancel: Canceller,
        mail: mpsc::Sender<WorkerMail<I, O>>,
    ) -> Self {
        Self {
            id,
            state: WorkerState::Idle,
            queue,
            handler,
            cancel,
            mail,
            _payload: PhantomData,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<WorkerExit> {
        let span = info_span!("worker", id = self.id);
        tokio::spawn(self.run().instrument(span))
    }

    async fn run(mut self) -> WorkerExit {
        let exit = loop {
            self.transition(WorkerState::Idle);
            let job = match self.queue.acquire(&self.cancel).await {
                Next::Job(job) => job,
                Next::Exhausted => break WorkerExit::Exhausted,
                Next::Cancelled => break WorkerExit::Cancelled,
            };

            self.transition(WorkerState::Processing);
            let result = self.process(job).await;
            if self.mail.send(WorkerMail::Finished(result)).await.is_err() {
                // the fan-in task is gone, nobody can see further results
                warn!("result channel closed, stopping");
                break WorkerExit::Cancelled;
            }
        };

        self.transition(WorkerState::Stopped);
        debug!(?exit, "worker exited");
        let _ = self.mail.send(WorkerMail::Exited(exit)).await;
        exit
    }

    async fn process(&self, job: Job<I, P>) -> JobResult<I, O> {
        let job_id = job.id().clone();
        let started = Instant::now();

        let outcome = AssertUnwindSafe(self.handler.handle(job))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(JobError::Panicked(panic_message(panic))));

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &outcome {
            Ok(_) => debug!(%job_id, elapsed_ms, "job succeeded"),
            Err(error) => warn!(%job_id, elapsed_ms, %error, "job failed"),
        }

        JobResult::new(job_id, self.id, outcome)
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "worker state");
            self.state = next;
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}

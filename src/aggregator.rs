use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, info, info_span};
use tracing_futures::Instrument;

use crate::job::JobResult;
use crate::worker::{WorkerExit, WorkerId, WorkerMail};

/// How the pool finished, as seen by the consumer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Completion {
    /// Every worker drained the queue.
    Drained,
    /// At least one worker stopped because of cancellation, so queued jobs
    /// may have been left unprocessed.
    Cancelled,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) live_workers: usize,
    /// Results handed to the consumer; discarded ones are not counted.
    pub(crate) results_emitted: u64,
}

pub(crate) type SharedCounters = Arc<Mutex<Counters>>;

pub(crate) fn with_counters<R>(counters: &SharedCounters, f: impl FnOnce(&mut Counters) -> R) -> R {
    let mut guard = counters.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// Merges every worker's mailbox into a single [`Results`] stream.
///
/// Results are forwarded in completion order. The output closes once every
/// worker mailbox has closed.
pub(crate) fn spawn<I, O>(
    sources: Vec<(WorkerId, mpsc::Receiver<WorkerMail<I, O>>)>,
    counters: SharedCounters,
) -> Results<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    let mut mailboxes = StreamMap::new();
    for (id, rx) in sources {
        mailboxes.insert(id, ReceiverStream::new(rx));
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();

    let fan_in = async move {
        let mut completion = Completion::Drained;
        let mut consumer_gone = false;

        while let Some((worker_id, mail)) = mailboxes.next().await {
            match mail {
                WorkerMail::Finished(result) => {
                    // keep draining after the consumer leaves so workers never block
                    if consumer_gone {
                        continue;
                    }
                    if tx.send(result).is_ok() {
                        with_counters(&counters, |c| c.results_emitted += 1);
                    } else {
                        debug!("results receiver dropped, discarding further results");
                        consumer_gone = true;
                    }
                }
                WorkerMail::Exited(exit) => {
                    with_counters(&counters, |c| c.live_workers = c.live_workers.saturating_sub(1));
                    if exit == WorkerExit::Cancelled {
                        completion = Completion::Cancelled;
                    }
                    debug!(worker_id, ?exit, "worker mailbox closing");
                }
            }
        }

        let emitted = with_counters(&counters, |c| c.results_emitted);
        info!(?completion, emitted, "all workers exited");
        let _ = done_tx.send(completion);
        drop(tx);
    };
    tokio::spawn(fan_in.instrument(info_span!("fan_in")));

    Results {
        rx,
        done: done_rx,
        completion: None,
    }
}

/// Consumer side of the pool: every [`JobResult`] in completion order,
/// followed by a terminal [`Completion`].
pub struct Results<I, O> {
    rx: mpsc::UnboundedReceiver<JobResult<I, O>>,
    done: oneshot::Receiver<Completion>,
    completion: Option<Completion>,
}

impl<I, O> Results<I, O> {
    /// Waits for the next result. `None` once every worker has exited and
    /// all results have been handed out.
    pub async fn next(&mut self) -> Option<JobResult<I, O>> {
        self.rx.recv().await
    }

    /// The terminal signal, available once the stream has ended.
    pub fn completion(&mut self) -> Option<Completion> {
        if self.completion.is_none() {
            self.completion = match self.done.try_recv() {
                Ok(completion) => Some(completion),
                Err(oneshot::error::TryRecvError::Empty) => None,
                // fan-in task went away without reporting
                Err(oneshot::error::TryRecvError::Closed) => Some(Completion::Cancelled),
            };
        }
        self.completion
    }

    /// Reads results until the stream ends.
    pub async fn collect(mut self) -> Report<I, O> {
        let mut results = Vec::new();
        while let Some(result) = self.next().await {
            results.push(result);
        }

        let completion = match self.completion() {
            Some(completion) => completion,
            None => (&mut self.done).await.unwrap_or(Completion::Cancelled),
        };

        Report {
            results,
            completion,
        }
    }
}

impl<I, O> Stream for Results<I, O> {
    type Item = JobResult<I, O>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[derive(Debug)]
pub struct Report<I, O> {
    pub results: Vec<JobResult<I, O>>,
    pub completion: Completion,
}

impl<I, O> Report<I, O> {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

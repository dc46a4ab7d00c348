use async_trait::async_trait;
use std::future::Future;

use crate::job::{Job, JobError};

/// The computation a worker runs for each job.
///
/// Implemented for any `Fn(Job<I, P>) -> impl Future<Output = Result<O, JobError>>`,
/// so closures can be handed to a pool directly.
#[async_trait]
pub trait Handler<I, P, O>: Send + Sync + 'static {
    async fn handle(&self, job: Job<I, P>) -> Result<O, JobError>;
}

#[async_trait]
impl<I, P, O, F, Fut> Handler<I, P, O> for F
where
    F: Fn(Job<I, P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, JobError>> + Send + 'static,
    I: Send + 'static,
    P: Send + 'static,
    O: Send + 'static,
{
    async fn handle(&self, job: Job<I, P>) -> Result<O, JobError> {
        (self)(job).await
    }
}

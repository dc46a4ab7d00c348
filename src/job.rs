use std::fmt;
use std::hash::Hash;
use thiserror::Error;

/// Anything usable as a job identifier: integers, strings, nanoids.
pub trait JobId: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> JobId for T where T: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

/// A unit of submitted work. Fields are private so a job can't change once
/// it has been handed to a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job<I, P> {
    id: I,
    payload: P,
}

impl<I, P> Job<I, P> {
    pub fn new(id: I, payload: P) -> Self {
        Self { id, payload }
    }

    pub fn id(&self) -> &I {
        &self.id
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_parts(self) -> (I, P) {
        (self.id, self.payload)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("job failed: {0}")]
    Failed(String),

    #[error("job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    pub fn failed(reason: impl Into<String>) -> Self {
        JobError::Failed(reason.into())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Succeeded,
    Failed,
}

/// Output of exactly one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult<I, O> {
    job_id: I,
    worker_id: usize,
    outcome: Result<O, JobError>,
}

impl<I, O> JobResult<I, O> {
    pub(crate) fn new(job_id: I, worker_id: usize, outcome: Result<O, JobError>) -> Self {
        Self {
            job_id,
            worker_id,
            outcome,
        }
    }

    pub fn job_id(&self) -> &I {
        &self.job_id
    }

    /// Id of the worker that processed the job.
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn outcome(&self) -> Result<&O, &JobError> {
        self.outcome.as_ref()
    }

    pub fn into_outcome(self) -> Result<O, JobError> {
        self.outcome
    }

    pub fn status(&self) -> JobStatus {
        match self.outcome {
            Ok(_) => JobStatus::Succeeded,
            Err(_) => JobStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == JobStatus::Succeeded
    }
}

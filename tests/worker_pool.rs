use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

use tributary::{
    Canceller, Completion, Error, FifoQueue, Handler, Job, JobError, PoolConfig, Queue, WorkerPool,
};

const WAIT: Duration = Duration::from_secs(10);

async fn double(job: Job<u32, u32>) -> Result<u32, JobError> {
    let (_, n) = job.into_parts();
    Ok(n * 2)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_five_jobs_three_workers_yield_five_distinct_results() {
    let queue = Arc::new(FifoQueue::new(8).unwrap());
    let (pool, results) = WorkerPool::start(3, queue, Canceller::new(), double).unwrap();

    for id in 1..=5 {
        pool.submit(Job::new(id, id)).await.unwrap();
    }
    pool.close();

    let report = timeout(WAIT, results.collect()).await.unwrap();
    assert_eq!(report.results.len(), 5);
    assert_eq!(report.completion, Completion::Drained);

    let ids: HashSet<u32> = report.results.iter().map(|r| *r.job_id()).collect();
    assert_eq!(ids, (1..=5).collect::<HashSet<u32>>());
    for result in &report.results {
        assert_eq!(*result.outcome().unwrap(), result.job_id() * 2);
        assert!(result.worker_id() < 3);
    }

    assert_eq!(timeout(WAIT, pool.join()).await.unwrap(), Completion::Drained);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_submitted_job_produces_exactly_one_result() {
    const JOBS: u32 = 200;
    let queue = Arc::new(FifoQueue::new(4).unwrap());
    let (pool, results) = WorkerPool::start(5, queue, Canceller::new(), double).unwrap();

    let producer = {
        let queue = pool.queue().clone();
        let cancel = pool.canceller().clone();
        tokio::spawn(async move {
            for id in 0..JOBS {
                queue.submit(Job::new(id, id), &cancel).await.unwrap();
            }
            queue.close();
        })
    };

    let report = timeout(WAIT, results.collect()).await.unwrap();
    producer.await.unwrap();

    let ids: HashSet<u32> = report.results.iter().map(|r| *r.job_id()).collect();
    assert_eq!(report.results.len(), JOBS as usize);
    assert_eq!(ids.len(), JOBS as usize);
    assert!(ids.iter().all(|id| *id < JOBS));

    let state = pool.state();
    assert_eq!(state.results_emitted, JOBS as u64);
    assert_eq!(state.live_workers, 0);
    assert!(!state.queue_open);
}

#[tokio::test]
async fn test_failing_job_is_reported_and_pool_terminates() {
    let queue = Arc::new(FifoQueue::new(2).unwrap());
    let handler = |_job: Job<u32, ()>| async move { Err::<(), _>(JobError::failed("always fails")) };
    let (pool, results) = WorkerPool::start(1, queue, Canceller::new(), handler).unwrap();

    pool.submit(Job::new(1, ())).await.unwrap();
    pool.close();

    let report = timeout(WAIT, results.collect()).await.unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(*report.results[0].job_id(), 1);
    assert_eq!(
        report.results[0].outcome().unwrap_err(),
        &JobError::Failed("always fails".into())
    );
    assert_eq!(report.completion, Completion::Drained);
    assert_eq!(timeout(WAIT, pool.join()).await.unwrap(), Completion::Drained);
}

#[tokio::test]
async fn test_panicking_job_does_not_take_down_worker() {
    let queue = Arc::new(FifoQueue::new(4).unwrap());
    let handler = |job: Job<u32, u32>| async move {
        if *job.id() == 2 {
            panic!("bad job");
        }
        Ok::<_, JobError>(*job.payload())
    };
    let (pool, results) = WorkerPool::start(1, queue, Canceller::new(), handler).unwrap();

    for id in 1..=3 {
        pool.submit(Job::new(id, id)).await.unwrap();
    }
    pool.close();

    let mut report = timeout(WAIT, results.collect()).await.unwrap();
    report.results.sort_by_key(|r| *r.job_id());
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(
        report.results[1].outcome().unwrap_err(),
        &JobError::Panicked("bad job".into())
    );
}

#[tokio::test]
async fn test_cancel_before_pickup_leaves_jobs_unprocessed() {
    let queue = Arc::new(FifoQueue::new(4).unwrap());
    let cancel = Canceller::new();
    queue.submit(Job::new(1u32, 1u32), &cancel).await.unwrap();
    queue.submit(Job::new(2, 2), &cancel).await.unwrap();
    cancel.trigger();

    let (pool, results) = WorkerPool::start(2, queue, cancel, double).unwrap();

    let report = timeout(WAIT, results.collect()).await.unwrap();
    assert!(report.results.len() < 2);
    assert_eq!(report.completion, Completion::Cancelled);
    assert_eq!(timeout(WAIT, pool.join()).await.unwrap(), Completion::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_finishes_in_flight_jobs_then_exits() {
    let started = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    let handler = {
        let started = started.clone();
        let gate = gate.clone();
        move |job: Job<u32, u32>| {
            let started = started.clone();
            let gate = gate.clone();
            async move {
                if started.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                    gate.notify_one();
                }
                sleep(Duration::from_millis(100)).await;
                Ok::<_, JobError>(*job.payload())
            }
        }
    };

    let queue = Arc::new(FifoQueue::new(16).unwrap());
    let (pool, results) = WorkerPool::start(2, queue, Canceller::new(), handler).unwrap();
    for id in 0..10 {
        pool.submit(Job::new(id, id)).await.unwrap();
    }

    // both workers are mid-job
    timeout(WAIT, gate.notified()).await.unwrap();

    let begin = Instant::now();
    let completion = timeout(WAIT, pool.stop()).await.unwrap();
    assert_eq!(completion, Completion::Cancelled);
    assert!(begin.elapsed() < Duration::from_secs(5));

    let report = timeout(WAIT, results.collect()).await.unwrap();
    assert_eq!(report.completion, Completion::Cancelled);
    assert!(report.results.len() >= 2, "in-flight jobs must still report");
    assert!(report.results.len() < 10);
    assert_eq!(report.results.len(), started.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_submit_after_close_is_rejected() {
    let queue = Arc::new(FifoQueue::new(4).unwrap());
    let (pool, results) = WorkerPool::start(1, queue, Canceller::new(), double).unwrap();

    pool.submit(Job::new(1, 1)).await.unwrap();
    pool.close();
    pool.close();
    assert!(matches!(pool.submit(Job::new(2, 2)).await, Err(Error::QueueClosed)));

    let report = timeout(WAIT, results.collect()).await.unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(*report.results[0].job_id(), 1);
}

#[tokio::test]
async fn test_cancel_is_idempotent_and_surfaces_to_producer() {
    let queue = Arc::new(FifoQueue::new(1).unwrap());
    let (pool, results) = WorkerPool::start(1, queue, Canceller::new(), double).unwrap();

    pool.cancel();
    pool.cancel();
    let err = pool.submit(Job::new(1, 1)).await.unwrap_err();
    assert!(err.is_cancelled());

    let report = timeout(WAIT, results.collect()).await.unwrap();
    assert!(report.results.is_empty());
    assert_eq!(report.completion, Completion::Cancelled);
}

#[tokio::test]
async fn test_zero_workers_is_rejected() {
    let queue = Arc::new(FifoQueue::new(1).unwrap());
    let err = WorkerPool::start(0, queue, Canceller::new(), double).err().unwrap();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_config_timeout_cancels_open_pool() {
    let config = PoolConfig::default()
        .with_workers(2)
        .with_queue_capacity(4)
        .with_timeout(Duration::from_millis(50));
    let (pool, results) = WorkerPool::<u32, u32>::from_config(&config, double).unwrap();

    // the queue stays open, only the deadline can end this
    let report = timeout(WAIT, results.collect()).await.unwrap();
    assert_eq!(report.completion, Completion::Cancelled);
    assert!(pool.canceller().is_cancelled());
    assert_eq!(timeout(WAIT, pool.join()).await.unwrap(), Completion::Cancelled);
}

#[tokio::test]
async fn test_dropping_pool_lets_workers_drain_and_exit() {
    let queue = Arc::new(FifoQueue::new(4).unwrap());
    let (pool, results) = WorkerPool::start(2, queue, Canceller::new(), double).unwrap();
    pool.submit(Job::new(1, 1)).await.unwrap();
    drop(pool);

    let report = timeout(WAIT, results.collect()).await.unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.completion, Completion::Drained);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropping_pool_keeps_configured_timeout() {
    let config = PoolConfig::default()
        .with_workers(1)
        .with_queue_capacity(8)
        .with_timeout(Duration::from_millis(50));
    let slow = |job: Job<u32, u32>| async move {
        sleep(Duration::from_millis(300)).await;
        Ok::<_, JobError>(*job.payload())
    };
    let (pool, results) = WorkerPool::<u32, u32>::from_config(&config, slow).unwrap();
    for id in 0..5 {
        pool.submit(Job::new(id, id)).await.unwrap();
    }
    drop(pool);

    let report = timeout(WAIT, results.collect()).await.unwrap();
    assert_eq!(report.completion, Completion::Cancelled);
    assert!(report.results.len() < 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dropped_results_do_not_block_workers() {
    const JOBS: u32 = 50;
    let queue = Arc::new(FifoQueue::new(2).unwrap());
    let (pool, results) = WorkerPool::start(3, queue, Canceller::new(), double).unwrap();
    drop(results);

    let producer = {
        let queue = pool.queue().clone();
        let cancel = pool.canceller().clone();
        tokio::spawn(async move {
            for id in 0..JOBS {
                queue.submit(Job::new(id, id), &cancel).await.unwrap();
            }
            queue.close();
        })
    };

    timeout(WAIT, producer).await.unwrap().unwrap();
    assert_eq!(timeout(WAIT, pool.join()).await.unwrap(), Completion::Drained);
}

struct Lookup {
    table: Vec<&'static str>,
}

#[async_trait]
impl Handler<usize, (), &'static str> for Lookup {
    async fn handle(&self, job: Job<usize, ()>) -> Result<&'static str, JobError> {
        self.table
            .get(*job.id())
            .copied()
            .ok_or_else(|| JobError::failed(format!("no entry {}", job.id())))
    }
}

#[tokio::test]
async fn test_struct_handler() {
    let queue = Arc::new(FifoQueue::new(4).unwrap());
    let handler = Lookup {
        table: vec!["zero", "one"],
    };
    let (pool, results) = WorkerPool::start(2, queue, Canceller::new(), handler).unwrap();
    for id in 0..3 {
        pool.submit(Job::new(id, ())).await.unwrap();
    }
    pool.close();

    let mut report = timeout(WAIT, results.collect()).await.unwrap();
    report.results.sort_by_key(|r| *r.job_id());
    assert_eq!(report.results[0].outcome(), Ok(&"zero"));
    assert_eq!(report.results[1].outcome(), Ok(&"one"));
    assert!(report.results[2].outcome().is_err());
}

use nanoid::nanoid;
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use tributary::{Job, JobError, PoolConfig, Queue, WorkerPool};

/// ```toml
/// jobs = 20
/// fail_every = 7
/// min_work_ms = 50
/// max_work_ms = 300
///
/// [pool]
/// workers = 3
/// queue_capacity = 4
/// timeout_ms = 2000
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DriverConfig {
    pool: PoolConfig,
    jobs: u64,
    /// Every job whose payload is a multiple of this fails.
    fail_every: Option<u64>,
    min_work_ms: u64,
    max_work_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default().with_workers(3),
            jobs: 10,
            fail_every: None,
            min_work_ms: 50,
            max_work_ms: 250,
        }
    }
}

impl DriverConfig {
    async fn load(path: impl AsRef<Path>) -> tributary::Result<Self> {
        let source = tokio::fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&source)?;
        config.pool.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tributary::logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => DriverConfig::load(path).await?,
        None => DriverConfig::default(),
    };
    info!(?config, "starting");

    let DriverConfig {
        fail_every,
        min_work_ms,
        max_work_ms,
        ..
    } = config;
    let max_work_ms = max_work_ms.max(min_work_ms);

    let handler = move |job: Job<String, u64>| async move {
        let work_ms = rand::thread_rng().gen_range(min_work_ms..=max_work_ms);
        sleep(Duration::from_millis(work_ms)).await;

        let n = *job.payload();
        match fail_every {
            Some(k) if k > 0 && n % k == 0 => Err(JobError::failed(format!("{} is a multiple of {}", n, k))),
            _ => Ok(n * 2),
        }
    };

    let (pool, mut results) = WorkerPool::<String, u64>::from_config(&config.pool, handler)?;

    let producer = {
        let queue = pool.queue().clone();
        let cancel = pool.canceller().clone();
        let jobs = config.jobs;
        tokio::spawn(async move {
            for n in 1..=jobs {
                if let Err(e) = queue.submit(Job::new(nanoid!(), n), &cancel).await {
                    warn!(error = %e, submitted = n - 1, "producer stopped");
                    break;
                }
            }
            queue.close();
        })
    };

    let (mut succeeded, mut failed) = (0u64, 0u64);
    while let Some(result) = results.next().await {
        match result.outcome() {
            Ok(value) => {
                succeeded += 1;
                info!(job = %result.job_id(), worker = result.worker_id(), value, "result");
            }
            Err(error) => {
                failed += 1;
                warn!(job = %result.job_id(), worker = result.worker_id(), %error, "result");
            }
        }
    }

    producer.await?;
    let completion = pool.join().await;
    info!(?completion, succeeded, failed, "done");

    Ok(())
}

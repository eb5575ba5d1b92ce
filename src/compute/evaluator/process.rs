//! Persistent worker pool evaluating stateful fitness functions.
//!
//! Each worker builds its own fitness function from the factory, inside the
//! worker thread, so per-worker state (simulators, environments) never has
//! to be `Send`. Work travels over a bounded job channel; results come back
//! on an unbounded channel tagged with the batch id and the index range they
//! cover, so reassembly does not depend on scheduling order.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use crate::schema::{ConfigError, Parameters, Population};

use super::{EvaluationError, Evaluator, Fitness, FitnessFunction, LazyFitness, chunk_ranges};

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Number of worker threads.
    #[serde(default = "default_n_process")]
    pub n_process: usize,
    /// Individuals per job; 0 sends the whole population as one job.
    #[serde(default = "default_individual_per_call")]
    pub individual_per_call: usize,
    /// Maximum wait for each result. `None` waits forever.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            n_process: default_n_process(),
            individual_per_call: default_individual_per_call(),
            timeout_ms: None,
        }
    }
}

fn default_n_process() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
fn default_individual_per_call() -> usize {
    1
}

impl ProcessConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_process == 0 {
            return Err(ConfigError::InvalidValue(
                "n_process must be positive".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue(
                "timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

struct Job {
    batch: u64,
    first: usize,
    last: usize,
    population: Population,
}

struct JobResult {
    batch: u64,
    first: usize,
    last: usize,
    scores: Result<Vec<f64>, String>,
}

struct Pool {
    jobs: Option<Sender<Job>>,
    /// Parent-side handle on the job queue, used to withdraw queued jobs.
    queued: Receiver<Job>,
    results: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Withdraw every job no worker has picked up yet.
    fn drain(&self) -> usize {
        let mut withdrawn = 0;
        while self.queued.try_recv().is_ok() {
            withdrawn += 1;
        }
        withdrawn
    }

    /// Detach the workers. Each one exits after its current job, once it
    /// sees the closed channels.
    fn abandon(self) {
        self.drain();
    }

    /// Close the job channel and wait for every worker.
    fn shutdown(mut self, name: &str) {
        self.drain();
        self.jobs.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::warn!("{}: worker exited abnormally", name);
            }
        }
    }
}

type Factory<F> = Arc<dyn Fn() -> F + Send + Sync>;

/// Evaluates chunks of the population on a pool of worker threads.
///
/// Workers are spawned on the first call and live until the evaluator is
/// dropped. A finite timeout turns a hung worker into
/// [`EvaluationError::Timeout`] for that call; a panicking fitness function
/// into [`EvaluationError::WorkerFailed`]. Neither is retried. Jobs of a
/// failed call that are still queued are withdrawn, and results of it that
/// arrive later are discarded. After a timeout the pool is detached, not
/// joined, and the next call starts fresh workers.
pub struct ProcessEvaluator<F> {
    name: String,
    factory: Factory<F>,
    n_scores: usize,
    parameters: Parameters,
    config: ProcessConfig,
    pool: Option<Pool>,
    batch: u64,
}

impl<F: FitnessFunction + 'static> ProcessEvaluator<F> {
    pub fn new(
        n_scores: usize,
        config: ProcessConfig,
        factory: impl Fn() -> F + Send + Sync + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let parameters = Parameters::new()
            .with_static("n_scores", n_scores.max(1))
            .with_static("n_process", config.n_process)
            .with_static("individual_per_call", config.individual_per_call)
            .with_static("timeout_ms", config.timeout_ms.map(|t| t as usize));

        Ok(Self {
            name: "ProcessEvaluator".to_string(),
            factory: Arc::new(factory),
            n_scores: n_scores.max(1),
            parameters,
            config,
            pool: None,
            batch: 0,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Whether the workers have been spawned.
    pub fn is_started(&self) -> bool {
        self.pool.is_some()
    }

    fn spawn_pool(&self) -> Result<Pool, EvaluationError> {
        let (job_tx, job_rx) = channel::bounded::<Job>(self.config.n_process * 2);
        let (result_tx, result_rx) = channel::unbounded::<JobResult>();

        let mut workers = Vec::with_capacity(self.config.n_process);
        for index in 0..self.config.n_process {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let factory = Arc::clone(&self.factory);
            let handle = thread::Builder::new()
                .name(format!("evoflow-worker-{}", index))
                .spawn(move || worker_loop(factory, jobs, results))
                .map_err(|e| EvaluationError::Spawn(e.to_string()))?;
            workers.push(handle);
        }
        log::info!("{}: started {} workers", self.name, workers.len());

        Ok(Pool {
            jobs: Some(job_tx),
            queued: job_rx,
            results: result_rx,
            workers,
        })
    }

    /// Send one job per range under the current batch id and reassemble the
    /// results.
    fn run_batch(
        &self,
        population: &Population,
        ranges: &[std::ops::Range<usize>],
    ) -> Result<Fitness, EvaluationError> {
        let timeout = self.timeout();
        let waited_ms = self.config.timeout_ms.unwrap_or(0);
        let batch = self.batch;
        let n_scores = self.n_scores;

        let pool = self.pool.as_ref().ok_or(EvaluationError::WorkersUnavailable)?;
        let jobs = pool.jobs.as_ref().ok_or(EvaluationError::WorkersUnavailable)?;

        for range in ranges {
            let job = Job {
                batch,
                first: range.start,
                last: range.end,
                population: population.slice(range.clone()),
            };
            match timeout {
                Some(timeout) => jobs.send_timeout(job, timeout).map_err(|e| match e {
                    SendTimeoutError::Timeout(_) => EvaluationError::Timeout { waited_ms },
                    SendTimeoutError::Disconnected(_) => EvaluationError::WorkersUnavailable,
                })?,
                None => jobs
                    .send(job)
                    .map_err(|_| EvaluationError::WorkersUnavailable)?,
            }
        }

        let mut values = vec![0.0; population.len() * n_scores];
        let mut received = 0;
        while received < ranges.len() {
            let result = match timeout {
                Some(timeout) => pool.results.recv_timeout(timeout).map_err(|e| match e {
                    RecvTimeoutError::Timeout => EvaluationError::Timeout { waited_ms },
                    RecvTimeoutError::Disconnected => EvaluationError::WorkersUnavailable,
                })?,
                None => pool
                    .results
                    .recv()
                    .map_err(|_| EvaluationError::WorkersUnavailable)?,
            };

            if result.batch != batch {
                log::warn!(
                    "{}: dropping stale result for individuals {}..{}",
                    self.name,
                    result.first,
                    result.last
                );
                continue;
            }

            let scores = result.scores.map_err(EvaluationError::WorkerFailed)?;
            let expected = (result.last - result.first) * n_scores;
            if scores.len() != expected {
                return Err(EvaluationError::ScoreShape {
                    expected,
                    actual: scores.len(),
                });
            }
            values[result.first * n_scores..result.last * n_scores].copy_from_slice(&scores);
            received += 1;
        }

        Fitness::new(n_scores, values)
    }

    fn timeout(&self) -> Option<Duration> {
        self.config.timeout_ms.map(Duration::from_millis)
    }
}

fn worker_loop<F: FitnessFunction>(
    factory: Factory<F>,
    jobs: Receiver<Job>,
    results: Sender<JobResult>,
) {
    let mut function: Option<LazyFitness<F>> = None;
    while let Ok(job) = jobs.recv() {
        let scores = panic::catch_unwind(AssertUnwindSafe(|| {
            function
                .get_or_insert_with(|| LazyFitness::new(factory()))
                .call(&job.population)
        }))
        .map_err(panic_message);

        // A panic may leave the function half-updated; build a fresh one.
        if scores.is_err() {
            function = None;
        }

        let result = JobResult {
            batch: job.batch,
            first: job.first,
            last: job.last,
            scores,
        };
        if results.send(result).is_err() {
            break;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "fitness function panicked".to_string()
    }
}

impl<F: FitnessFunction + 'static> Evaluator for ProcessEvaluator<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_scores(&self) -> usize {
        self.n_scores
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn evaluate(&mut self, population: &Population) -> Result<Fitness, EvaluationError> {
        let ranges = chunk_ranges(population.len(), self.config.individual_per_call)?;
        if ranges.is_empty() {
            return Ok(Fitness::zeros(0, self.n_scores));
        }

        if self.pool.is_none() {
            self.pool = Some(self.spawn_pool()?);
        }
        self.batch += 1;

        let outcome = self.run_batch(population, &ranges);
        if let Err(error) = &outcome
            && let Some(pool) = self.pool.take()
        {
            let withdrawn = pool.drain();
            log::debug!("{}: withdrew {} queued jobs after {}", self.name, withdrawn, error);
            if matches!(error, EvaluationError::Timeout { .. }) {
                log::warn!("{}: detaching workers after a timeout", self.name);
                pool.abandon();
            } else {
                self.pool = Some(pool);
            }
        }
        outcome
    }
}

impl<F> Drop for ProcessEvaluator<F> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown(&self.name);
        }
    }
}

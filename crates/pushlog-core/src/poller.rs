use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pushlog_db::{Database, NewRepository, RepositoryRecord};
use pushlog_logging::{LogEvent, Logger};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::error::PollError;
use crate::ingest::PushIngestor;
use crate::source::{forest_repository, PushSource};

/// How often to poll and how much to fetch.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Pushes requested per fetch
    pub limit: usize,
    /// Repositories fetched at the same time
    pub parallelism: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            limit: 200,
            parallelism: 4,
        }
    }
}

/// A forest listing whose repositories are tracked automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForestSource {
    pub name: String,
    pub url: String,
}

/// Totals of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub repositories: usize,
    pub pushes: usize,
    pub failed: usize,
}

/// Periodically fetches new pushes for every tracked repository and
/// ingests them.
pub struct Poller {
    db: Arc<Database>,
    source: Arc<dyn PushSource>,
    ingestor: Arc<PushIngestor>,
    logger: Arc<Logger>,
    config: PollConfig,
    forests: Vec<ForestSource>,
    permits: Arc<Semaphore>,
    interrupted: Arc<AtomicBool>,
    cycle: AtomicU64,
    skipped: AtomicU64,
}

impl Poller {
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn PushSource>,
        ingestor: Arc<PushIngestor>,
        logger: Arc<Logger>,
        config: PollConfig,
    ) -> Self {
        let parallelism = config.parallelism.max(1);
        Self {
            db,
            source,
            ingestor,
            logger,
            config: PollConfig {
                parallelism,
                ..config
            },
            forests: Vec::new(),
            permits: Arc::new(Semaphore::new(parallelism)),
            interrupted: Arc::new(AtomicBool::new(false)),
            cycle: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn with_forests(mut self, forests: Vec<ForestSource>) -> Self {
        self.forests = forests;
        self
    }

    /// Get a handle to set the interrupt flag (for Ctrl+C handling)
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Number of cycles skipped because the previous one was still busy.
    pub fn skipped_cycles(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Run a single cycle to completion.
    pub async fn poll_once(self: &Arc<Self>) -> Result<CycleReport, PollError> {
        let cycle = self.next_cycle();
        self.clone().run_cycle(cycle).await
    }

    /// Poll every `interval` until interrupted.
    ///
    /// A tick that arrives while the previous cycle is still fetching is
    /// skipped instead of queued.
    pub async fn run(self: Arc<Self>) -> Result<(), PollError> {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut current: Option<JoinHandle<Result<CycleReport, PollError>>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_for_interrupt(&self.interrupted) => break,
            }

            let cycle = self.next_cycle();
            if current.as_ref().is_some_and(|handle| !handle.is_finished()) {
                self.skipped.fetch_add(1, Ordering::SeqCst);
                self.logger.log(&LogEvent::PollCycleSkipped {
                    cycle,
                    busy: self.config.parallelism - self.permits.available_permits(),
                });
                continue;
            }

            if let Some(handle) = current.take() {
                finish(handle).await;
            }
            current = Some(tokio::spawn(self.clone().run_cycle(cycle)));
        }

        if let Some(handle) = current.take() {
            finish(handle).await;
        }
        Ok(())
    }

    fn next_cycle(&self) -> u64 {
        self.cycle.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn run_cycle(self: Arc<Self>, cycle: u64) -> Result<CycleReport, PollError> {
        let started = Instant::now();

        for forest in &self.forests {
            if let Err(e) = self.discover(forest).await {
                self.logger.log(&LogEvent::RepositoryFailed {
                    repository: forest.name.clone(),
                    error: e.to_string(),
                });
            }
        }

        let repositories = self.db.repositories().list(false)?;
        self.logger.log(&LogEvent::PollCycleStarted {
            cycle,
            repositories: repositories.len(),
        });

        let mut tasks = JoinSet::new();
        for record in repositories.iter().cloned() {
            let poller = self.clone();
            tasks.spawn(async move {
                let Ok(_permit) = poller.permits.clone().acquire_owned().await else {
                    return (record.name, Err(PollError::Interrupted));
                };
                let result = poller.poll_repository(&record).await;
                (record.name, result)
            });
        }

        let mut report = CycleReport {
            cycle,
            repositories: repositories.len(),
            ..CycleReport::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(pushes))) => report.pushes += pushes,
                Ok((repository, Err(e))) => {
                    report.failed += 1;
                    self.logger.log(&LogEvent::RepositoryFailed {
                        repository,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, "Poll task panicked");
                }
            }
        }

        self.logger.log(&LogEvent::PollCycleFinished {
            cycle,
            pushes: report.pushes,
            failed: report.failed,
            duration_secs: started.elapsed().as_secs_f64(),
        });
        Ok(report)
    }

    /// Register repositories listed by a forest that are not tracked yet.
    async fn discover(&self, forest: &ForestSource) -> Result<(), PollError> {
        let links = self.source.fetch_forest(&forest.url).await?;

        let mut added = Vec::new();
        for link in links {
            let (name, url) = forest_repository(&forest.url, &link);
            if name.is_empty() || self.db.repositories().get_by_name(&name)?.is_some() {
                continue;
            }
            self.db.repositories().create(&NewRepository {
                name: name.clone(),
                url,
                fork_of: None,
                forest: Some(forest.name.clone()),
            })?;
            added.push(name);
        }

        self.logger.log(&LogEvent::ForestDiscovered {
            forest: forest.name.clone(),
            added,
        });
        Ok(())
    }

    /// Fetch and ingest everything new for one repository. Full pages are
    /// followed up right away.
    async fn poll_repository(&self, record: &RepositoryRecord) -> Result<usize, PollError> {
        let mut start = record.last_known_push;
        let mut total = 0;

        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                debug!(repository = %record.name, "Interrupted, not fetching");
                break;
            }

            let pushes = self
                .source
                .fetch_pushes(&record.url, start, self.config.limit)
                .await?;
            let full = pushes.len() >= self.config.limit;
            self.logger.log(&LogEvent::PushesFetched {
                repository: record.name.clone(),
                start,
                count: pushes.len(),
            });

            let Some(outcome) = self.ingestor.ingest_with_outcome(record.id, pushes).await? else {
                break;
            };

            if let Some(path) = outcome.cloned {
                self.logger.log(&LogEvent::RepositoryCloned {
                    repository: record.name.clone(),
                    url: record.url.clone(),
                    path,
                });
            }
            self.logger.log(&LogEvent::PushesIngested {
                repository: record.name.clone(),
                pushes: outcome.pushes,
                last_known_push: outcome.last_known_push,
            });
            total += outcome.pushes;

            if !full || outcome.last_known_push <= start {
                break;
            }
            start = outcome.last_known_push;
        }

        Ok(total)
    }
}

async fn wait_for_interrupt(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn finish(handle: JoinHandle<Result<CycleReport, PollError>>) {
    match handle.await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(error = %e, "Poll cycle failed"),
        Err(e) => warn!(error = %e, "Poll cycle panicked"),
    }
}

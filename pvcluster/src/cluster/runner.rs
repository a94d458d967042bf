//! Runs independent clustering jobs concurrently on a fixed worker pool.
//!
//! Each job owns its whole engine state; the only shared resources are the
//! report writers, which serialize whole batches.

use std::time::Instant;

use pvcore::{PvError, Result, ScanId};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::info;

use crate::cluster::poisoned::{ClusterOutcome, ClusteringConfig, SparsePoisonedClustering};
use crate::cluster::report::SharedResultWriter;
use crate::cluster::source::EdgeSource;

pub struct ClusteringJob {
    pub name: String,
    pub source: Box<dyn EdgeSource + Send>,
    pub cutoff: f64,
    pub merge_offset: u32,
    pub poisoned: Vec<ScanId>,
}

impl ClusteringJob {
    pub fn new<S: EdgeSource + Send + 'static>(name: impl Into<String>, source: S, cutoff: f64, merge_offset: u32) -> Self {
        ClusteringJob {
            name: name.into(),
            source: Box::new(source),
            cutoff,
            merge_offset,
            poisoned: Vec::new(),
        }
    }

    pub fn with_poisoned(mut self, poisoned: Vec<ScanId>) -> Self {
        self.poisoned = poisoned;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub name: String,
    pub merges: u32,
    pub poisoned_edges: usize,
    pub clusters: usize,
}

pub struct ClusteringRunner {
    config: ClusteringConfig,
    pool: ThreadPool,
}

impl ClusteringRunner {
    pub fn new(num_threads: usize, config: ClusteringConfig) -> Result<Self> {
        config.validate()?;
        if num_threads == 0 {
            return Err(PvError::config("num_threads must be > 0"));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| PvError::ThreadPool(e.to_string()))?;
        Ok(ClusteringRunner { config, pool })
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Runs one job and returns its outcome without writing anything.
    pub fn run_one(&self, job: ClusteringJob) -> Result<ClusterOutcome> {
        let config = self.config.clone();
        self.pool.install(|| run_job(job, config))
    }

    /// Runs all jobs in parallel and appends each merge tree (and poisoned
    /// edge list) to the shared writers. Summaries come back in job order.
    pub fn run(
        &self,
        jobs: Vec<ClusteringJob>,
        tree_writer: &SharedResultWriter,
        poisoned_writer: Option<&SharedResultWriter>,
    ) -> Result<Vec<JobSummary>> {
        let start = Instant::now();
        let num_jobs = jobs.len();
        let write_poisoned = self.config.write_poisoned_edges;

        let summaries = self.pool.install(|| {
            jobs.into_par_iter()
                .map(|job| {
                    let name = job.name.clone();
                    let outcome = run_job(job, self.config.clone())?;
                    tree_writer.append(&outcome.tree)?;
                    if write_poisoned {
                        if let Some(writer) = poisoned_writer {
                            writer.append(&outcome.poisoned)?;
                        }
                    }
                    Ok(JobSummary {
                        name,
                        merges: outcome.merges,
                        poisoned_edges: outcome.poisoned.len(),
                        clusters: outcome.cluster_members().len(),
                    })
                })
                .collect::<Result<Vec<_>>>()
        })?;

        info!(jobs = num_jobs, elapsed_sec = start.elapsed().as_secs_f64(), "clustering jobs done");
        Ok(summaries)
    }
}

fn run_job(job: ClusteringJob, config: ClusteringConfig) -> Result<ClusterOutcome> {
    let ClusteringJob { name, source, cutoff, merge_offset, poisoned } = job;
    let outcome = SparsePoisonedClustering::new(source, merge_offset, config)
        .with_poisoned(poisoned)
        .do_clustering(cutoff)?;
    info!(job = %name, merges = outcome.merges, poisoned = outcome.poisoned.len(), "job finished");
    Ok(outcome)
}

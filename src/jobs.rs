//! Active-job tracking.
//!
//! [`JobManager`] owns the job-id counter and the current [`BlockTemplate`].
//! The current job is swapped as a whole behind an [`Arc`], so sessions still
//! holding the previous job keep a consistent view of it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::block_template::{BlockTemplate, JobParams};
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::template::RawTemplate;

/// Job ids cycle through `1..=0xffff`.
const JOB_ID_WRAP: u64 = 0xffff;

/// Hands out job ids and publishes block templates.
#[derive(Debug)]
pub struct JobManager {
    config: PoolConfig,
    placeholder_len: usize,
    counter: AtomicU64,
    current: RwLock<Option<Arc<BlockTemplate>>>,
}

impl JobManager {
    pub fn new(config: PoolConfig, placeholder_len: usize) -> Self {
        Self {
            config,
            placeholder_len,
            counter: AtomicU64::new(0),
            current: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Next job id as lowercase hex.
    pub fn next_job_id(&self) -> String {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) % JOB_ID_WRAP + 1;
        format!("{:x}", id)
    }

    pub fn current(&self) -> Option<Arc<BlockTemplate>> {
        self.current.read().clone()
    }

    /// Publish `template` if it starts a new block.
    ///
    /// A template is new when there is no current job, its previous hash
    /// differs from the current job's, or its height is greater. Returns
    /// whether a new job was published. On error the current job is kept.
    pub fn process_template(&self, template: RawTemplate) -> Result<bool, PoolError> {
        // Decide and publish under one write guard so concurrent callers
        // with the same block publish it once.
        let mut current = self.current.write();
        if !starts_new_block(current.as_deref(), &template) {
            debug!(height = template.height, "template does not start a new block");
            return Ok(false);
        }

        let job = BlockTemplate::new(self.next_job_id(), template, self.placeholder_len, &self.config)?;
        info!(
            job_id = job.job_id(),
            height = job.height(),
            difficulty = job.difficulty(),
            "new block, publishing job"
        );
        *current = Some(Arc::new(job));
        Ok(true)
    }

    /// Rebuild the current job from a refreshed template of the same block
    /// (new transactions, new time) under a fresh id.
    ///
    /// Returns the broadcast parameters with `clean_jobs` cleared, since
    /// work on the previous job is still valid.
    pub fn update_current_job(&self, template: RawTemplate) -> Result<JobParams, PoolError> {
        let job = BlockTemplate::new(self.next_job_id(), template, self.placeholder_len, &self.config)?;
        let params = job.updated_job_params();
        debug!(job_id = job.job_id(), height = job.height(), "updated current job");
        *self.current.write() = Some(Arc::new(job));
        Ok(params)
    }
}

fn starts_new_block(current: Option<&BlockTemplate>, template: &RawTemplate) -> bool {
    match current {
        None => true,
        Some(current) => {
            current.template().previous_block_hash != template.previous_block_hash
                || template.height > current.height()
        }
    }
}

//! Concurrency-capped batch validation
//!
//! At most `concurrency` files are in flight at once; a new one starts only
//! when an earlier one releases its permit. Verdicts keep input order.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use warden_core::RejectionCode;

use crate::source::FileSource;
use crate::validator::{FileValidator, FileVerdict, ValidationOptions};

const MB: u64 = 1024 * 1024;

/// Limits applied to a whole batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchLimits {
    pub max_files: usize,
    /// Sum of declared sizes, in bytes
    pub max_total_size: u64,
    /// Files validated at the same time
    pub concurrency: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_total_size: 200 * MB,
            concurrency: 3,
        }
    }
}

impl BatchLimits {
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.max_files == 0 {
            problems.push("batch max_files must be positive".to_string());
        }
        if self.max_total_size == 0 {
            problems.push("batch max_total_size must be positive".to_string());
        }
        if self.concurrency == 0 {
            problems.push("batch concurrency must be positive".to_string());
        }
        problems
    }
}

/// Runs async work with a fixed number of permits
#[derive(Debug)]
pub struct BatchExecutor {
    permits: Semaphore,
    concurrency: usize,
}

impl BatchExecutor {
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            permits: Semaphore::new(concurrency),
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Apply `f` to every item, results in input order
    pub async fn run<I, F, Fut>(&self, items: I, f: F) -> Vec<Fut::Output>
    where
        I: IntoIterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future,
    {
        let f = &f;
        let permits = &self.permits;
        let tasks = items.into_iter().map(|item| async move {
            // The semaphore is never closed, so acquire cannot fail
            let _permit = permits.acquire().await.ok();
            f(item).await
        });
        join_all(tasks).await
    }
}

/// One file error or warning, attributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchIssue {
    pub file_name: String,
    pub code: RejectionCode,
    pub message: String,
}

/// Aggregate outcome of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub valid_count: usize,
    pub invalid_count: usize,
    pub errors: Vec<BatchIssue>,
    pub warnings: Vec<BatchIssue>,
    pub total_bytes: u64,
    /// Per-file verdicts in input order; empty when the batch itself was refused
    pub verdicts: Vec<FileVerdict>,
    /// Count and total-size violations
    pub batch_errors: Vec<String>,
}

impl BatchSummary {
    pub fn is_valid(&self) -> bool {
        self.batch_errors.is_empty() && self.invalid_count == 0
    }

    fn add(&mut self, verdict: FileVerdict) {
        if verdict.is_valid {
            self.valid_count += 1;
        } else {
            self.invalid_count += 1;
        }
        let attribute = |issue: &crate::validator::FileIssue| BatchIssue {
            file_name: verdict.file_name.clone(),
            code: issue.code,
            message: issue.message.clone(),
        };
        self.errors.extend(verdict.errors.iter().map(attribute));
        self.warnings.extend(verdict.warnings.iter().map(attribute));
        self.verdicts.push(verdict);
    }
}

impl FileValidator {
    /// Validate a batch; a batch over its count or total-size limit is
    /// refused before any file is read
    pub async fn validate_files(
        &self,
        files: &[&dyn FileSource],
        options: &ValidationOptions,
        limits: &BatchLimits,
    ) -> BatchSummary {
        let mut summary = BatchSummary {
            total_bytes: files.iter().map(|f| f.size()).fold(0u64, u64::saturating_add),
            ..Default::default()
        };

        if files.len() > limits.max_files {
            summary
                .batch_errors
                .push(format!("{} files exceeds the limit of {}", files.len(), limits.max_files));
        }
        if summary.total_bytes > limits.max_total_size {
            summary.batch_errors.push(format!(
                "{} bytes exceeds the batch limit of {} bytes",
                summary.total_bytes, limits.max_total_size
            ));
        }
        if !summary.batch_errors.is_empty() {
            summary.invalid_count = files.len();
            warn!(files = files.len(), errors = ?summary.batch_errors, "Batch refused");
            return summary;
        }

        let executor = BatchExecutor::new(limits.concurrency);
        let verdicts = executor
            .run(files.iter().copied(), |file| self.validate(file, options))
            .await;
        for verdict in verdicts {
            summary.add(verdict);
        }

        info!(
            valid = summary.valid_count,
            invalid = summary.invalid_count,
            total_bytes = summary.total_bytes,
            "Batch validated"
        );
        summary
    }
}

//! Concurrent fan-out with aggregated, order-preserving results.

use std::future::Future;

use tracing::{error, info};

use super::{CloudError, Instance};

/// One failed entry of a batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchFailure {
    /// Name the caller supplied for the failed operation.
    pub name: String,
    /// Instance the provider created before the failure, if it got that far.
    /// Its termination has already been requested.
    pub instance_id: Option<String>,
    /// Why it failed.
    pub error: CloudError,
}

/// Failure of one create, remembering any instance it left behind.
#[derive(Debug)]
pub(crate) struct CreateFailure {
    pub(crate) instance_id: Option<String>,
    pub(crate) error: CloudError,
}

impl From<CloudError> for CreateFailure {
    fn from(error: CloudError) -> Self {
        Self {
            instance_id: None,
            error,
        }
    }
}

/// Result of a concurrent batch: every success and every failure, never
/// just the first error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchOutcome {
    /// Tag attached to every instance created by the batch.
    pub batch_id: String,
    /// Instances that reached their target state, in request order.
    pub succeeded: Vec<Instance>,
    /// Names that failed, in request order.
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    /// Returns `true` when no entry failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Fail-fast view of the batch.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::Batch`] naming every failed entry when any
    /// failed. Succeeded instances are not rolled back.
    pub fn into_result(self) -> Result<Vec<Instance>, CloudError> {
        if self.failed.is_empty() {
            return Ok(self.succeeded);
        }
        Err(CloudError::Batch {
            batch_id: self.batch_id,
            failures: self
                .failed
                .into_iter()
                .map(|failure| (failure.name, failure.error))
                .collect(),
        })
    }
}

/// Runs `operation` once per name on its own task and joins every task.
///
/// Results come back in the order of `names`. A task that panics is reported
/// as [`CloudError::Task`] for its name; the others are unaffected.
pub(crate) async fn fan_out<T, E, F, Fut>(
    names: Vec<String>,
    operation: F,
) -> Vec<(String, Result<T, E>)>
where
    T: Send + 'static,
    E: From<CloudError> + Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let handles: Vec<_> = names
        .into_iter()
        .map(|name| {
            let task = tokio::spawn(operation(name.clone()));
            (name, task)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                error!(name, error = %join_err, "batch task failed to join");
                Err(E::from(CloudError::Task {
                    name: name.clone(),
                    message: join_err.to_string(),
                }))
            }
        };
        results.push((name, result));
    }
    results
}

/// Splits fan-out results into a [`BatchOutcome`].
pub(crate) fn collect_outcome(
    batch_id: String,
    results: Vec<(String, Result<Instance, CreateFailure>)>,
) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        batch_id,
        succeeded: Vec::new(),
        failed: Vec::new(),
    };
    for (name, result) in results {
        match result {
            Ok(instance) => outcome.succeeded.push(instance),
            Err(CreateFailure { instance_id, error }) => outcome.failed.push(BatchFailure {
                name,
                instance_id,
                error,
            }),
        }
    }
    info!(
        batch_id = %outcome.batch_id,
        succeeded = outcome.succeeded.len(),
        failed = outcome.failed.len(),
        "instance batch finished"
    );
    outcome
}

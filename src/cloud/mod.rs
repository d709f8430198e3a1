//! Cloud instance lifecycle: create, start, stop, and tear down instances,
//! concurrently where the caller asks for many.
//!
//! The manager talks to a provider through [`CloudApi`] and never retries a
//! provider call. Every state change is confirmed by the status-poll loop in
//! [`InstanceManager::wait_for_state`] before it is reported.

mod batch;
mod error;
mod types;
mod wait;

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use batch::CreateFailure;
pub use batch::{BatchFailure, BatchOutcome};
pub use error::CloudError;
pub use types::{
    CloudApi, CloudFuture, CreateRequest, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, FloatingIp,
    Instance, InstanceState, PollSettings,
};

/// Tag attached to every instance the manager creates.
pub const MANAGED_TAG: &str = "ruslan";

/// Prefix of the per-batch tag, followed by a random identifier.
pub const BATCH_TAG_PREFIX: &str = "ruslan-batch-";

/// Provider-agnostic instance lifecycle manager.
pub struct InstanceManager<A: CloudApi> {
    api: Arc<A>,
    poll: PollSettings,
}

impl<A: CloudApi> Clone for InstanceManager<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            poll: self.poll,
        }
    }
}

impl<A: CloudApi> InstanceManager<A> {
    /// Creates a manager with the default poll interval and timeout.
    #[must_use]
    pub fn new(api: A) -> Self {
        Self {
            api: Arc::new(api),
            poll: PollSettings::default(),
        }
    }

    /// Overrides the status-poll settings.
    #[must_use]
    pub const fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Returns the provider client.
    #[must_use]
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Creates one instance per name concurrently and waits for each to be
    /// running.
    ///
    /// Every task is joined before returning. Failures never cancel sibling
    /// tasks and succeeded instances are left in place; pass them to
    /// [`Self::rollback`] to tear them down. An instance that was created but
    /// never became running is terminated here and reported through
    /// [`BatchFailure::instance_id`].
    pub async fn create_many<S: AsRef<str>>(&self, names: &[S]) -> BatchOutcome {
        let batch_id = format!("{BATCH_TAG_PREFIX}{}", Uuid::new_v4().simple());
        let tags = vec![MANAGED_TAG.to_owned(), batch_id.clone()];
        info!(%batch_id, count = names.len(), "creating instance batch");

        let owned: Vec<String> = names.iter().map(|name| name.as_ref().to_owned()).collect();
        let results = batch::fan_out(owned, |name| {
            let manager = self.clone();
            let request = CreateRequest {
                name,
                tags: tags.clone(),
            };
            async move { manager.create_one(&request).await }
        })
        .await;

        batch::collect_outcome(batch_id, results)
    }

    async fn create_one(&self, request: &CreateRequest) -> Result<Instance, CreateFailure> {
        let id = self.api.create_instance(request).await?;
        info!(name = %request.name, id, "instance requested");
        let instance = match self.wait_until_present(&id, InstanceState::Running).await {
            Ok(instance) => instance,
            Err(error) => {
                self.discard(&request.name, &id, &error).await;
                return Err(CreateFailure {
                    instance_id: Some(id),
                    error,
                });
            }
        };
        info!(
            name = %request.name,
            id,
            public_ip = instance.public_ip.as_deref().unwrap_or("-"),
            "instance running"
        );
        Ok(instance)
    }

    async fn discard(&self, name: &str, id: &str, cause: &CloudError) {
        warn!(name, id, error = %cause, "instance never became running; terminating it");
        if let Err(err) = self.api.terminate(id).await {
            error!(name, id, error = %err, "failed to terminate stranded instance");
        }
    }

    /// Terminates every instance in `instances` concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::Batch`] naming every instance that could not be
    /// terminated; the others are still torn down.
    pub async fn rollback(&self, instances: &[Instance]) -> Result<(), CloudError> {
        let ids: Vec<String> = instances.iter().map(|instance| instance.id.clone()).collect();
        warn!(count = ids.len(), "rolling back instances");
        let results = batch::fan_out(ids, |id| {
            let manager = self.clone();
            async move {
                manager.api.terminate(&id).await?;
                manager
                    .wait_for_state(&id, InstanceState::Terminated)
                    .await
                    .map(|_| ())
            }
        })
        .await;

        let failures: Vec<(String, CloudError)> = results
            .into_iter()
            .filter_map(|(id, result)| result.err().map(|err| (id, err)))
            .collect();
        if failures.is_empty() {
            return Ok(());
        }
        Err(CloudError::Batch {
            batch_id: String::from("rollback"),
            failures,
        })
    }

    /// Terminates the running instance that owns `ip`.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::NotFound`] or [`CloudError::AmbiguousIp`] when
    /// `ip` does not identify exactly one instance, and
    /// [`CloudError::NotRunning`] when that instance is not running.
    pub async fn terminate(&self, ip: &str) -> Result<(), CloudError> {
        let instance = self.instance_by_ip(ip).await?;
        if instance.state != InstanceState::Running {
            return Err(CloudError::NotRunning {
                ip: ip.to_owned(),
                id: instance.id,
                state: instance.state,
            });
        }
        self.api.terminate(&instance.id).await?;
        info!(ip, id = %instance.id, "instance terminated");
        Ok(())
    }

    /// Powers `id` off and waits until it is stopped.
    ///
    /// # Errors
    ///
    /// Returns provider errors unchanged and [`CloudError::Timeout`] when
    /// the instance is not stopped by the deadline.
    pub async fn stop(&self, id: &str) -> Result<Instance, CloudError> {
        self.api.stop(id).await?;
        self.wait_until_present(id, InstanceState::Stopped).await
    }

    /// Powers `id` on and waits until it is running with a passing system
    /// check.
    ///
    /// # Errors
    ///
    /// Returns provider errors unchanged and [`CloudError::Timeout`] when
    /// the instance is not ready by the deadline.
    pub async fn start(&self, id: &str) -> Result<Instance, CloudError> {
        self.api.start(id).await?;
        self.wait_until_present(id, InstanceState::Running).await
    }

    /// Releases the floating address attached to the instance owning `ip`.
    ///
    /// Returns the released address, or `None` when the instance has no
    /// floating address.
    ///
    /// # Errors
    ///
    /// Returns lookup errors from [`Self::get_id_by_ip`] and provider errors.
    pub async fn release_floating_ip(&self, ip: &str) -> Result<Option<FloatingIp>, CloudError> {
        let id = self.get_id_by_ip(ip).await?;
        let Some(floating) = self.api.floating_ip(&id).await? else {
            info!(ip, id, "no floating address to release");
            return Ok(None);
        };
        self.api.release_ip(&floating).await?;
        info!(ip, id, address = %floating.address, "floating address released");
        Ok(Some(floating))
    }

    /// Resolves `ip` to the identifier of the single instance that owns it.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::NotFound`] for no match and
    /// [`CloudError::AmbiguousIp`] for more than one.
    pub async fn get_id_by_ip(&self, ip: &str) -> Result<String, CloudError> {
        self.instance_by_ip(ip).await.map(|instance| instance.id)
    }

    /// Reads the current snapshot of `id` without waiting.
    ///
    /// # Errors
    ///
    /// Returns provider errors unchanged.
    pub async fn describe(&self, id: &str) -> Result<Option<Instance>, CloudError> {
        self.api.describe(id).await
    }

    async fn instance_by_ip(&self, ip: &str) -> Result<Instance, CloudError> {
        let mut matches = self.api.find_by_ip(ip).await?;
        match matches.len() {
            0 => Err(CloudError::NotFound { ip: ip.to_owned() }),
            1 => matches
                .pop()
                .ok_or_else(|| CloudError::NotFound { ip: ip.to_owned() }),
            count => Err(CloudError::AmbiguousIp {
                ip: ip.to_owned(),
                count,
            }),
        }
    }

    async fn wait_until_present(
        &self,
        id: &str,
        target: InstanceState,
    ) -> Result<Instance, CloudError> {
        self.wait_for_state(id, target)
            .await?
            .ok_or_else(|| CloudError::UnexpectedState {
                id: id.to_owned(),
                target,
                state: InstanceState::Terminated,
            })
    }
}

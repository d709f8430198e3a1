//! Status-poll loop shared by every lifecycle transition.

use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::deadline::deadline_after;

use super::{CloudApi, CloudError, Instance, InstanceManager, InstanceState};

impl<A: CloudApi> InstanceManager<A> {
    /// Polls `id` until it reaches `target` or the poll timeout elapses.
    ///
    /// Reads that rank lower on the lifecycle leg than one already observed
    /// are treated as stale and ignored. A missing instance counts as "not
    /// visible yet", except when waiting for `Terminated`, where it counts as
    /// gone. The returned snapshot is `None` only in that case.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::Timeout`] at the deadline,
    /// [`CloudError::UnexpectedState`] when the instance is terminated while a
    /// live state is awaited, and provider errors unchanged.
    pub async fn wait_for_state(
        &self,
        id: &str,
        target: InstanceState,
    ) -> Result<Option<Instance>, CloudError> {
        let started = Instant::now();
        let deadline = deadline_after(started, self.poll.timeout);
        let mut furthest: Option<u8> = None;

        loop {
            match self.api.describe(id).await? {
                None if target == InstanceState::Terminated => return Ok(None),
                None => debug!(id, %target, "instance not visible yet"),
                Some(instance) => {
                    let Some(position) = instance.state.leg_position(target) else {
                        return Err(CloudError::UnexpectedState {
                            id: id.to_owned(),
                            target,
                            state: instance.state,
                        });
                    };
                    if furthest.is_some_and(|seen| position < seen) {
                        debug!(id, state = %instance.state, "ignoring stale status read");
                    } else {
                        if furthest != Some(position) {
                            info!(id, state = %instance.state, %target, "instance state observed");
                        }
                        furthest = Some(position);
                        if instance.has_reached(target) {
                            return Ok(Some(instance));
                        }
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CloudError::Timeout {
                    id: id.to_owned(),
                    target,
                    waited: now.saturating_duration_since(started),
                });
            }
            sleep(self.poll.interval.min(deadline.saturating_duration_since(now))).await;
        }
    }
}

//! Polling for provider actions to finish.

use tokio::time::sleep;

use crate::client::CloudClient;
use crate::resources::{Action, ActionStatus};
use crate::state::BuildState;
use crate::step::{ResourceKind, StepError};

/// Waits until `action` leaves the running state.
///
/// # Errors
///
/// Returns [`StepError::ActionFailed`] when the action ends in error,
/// [`StepError::Timeout`] when it is still running at the deadline, or a
/// client error when polling fails.
pub(crate) async fn wait_for_action<C: CloudClient>(
    state: &BuildState<C>,
    action: &Action,
) -> Result<(), StepError<C::Error>> {
    let deadline = state.timings.deadline();
    let mut current = action.clone();

    loop {
        match current.status {
            ActionStatus::Success => return Ok(()),
            ActionStatus::Error => {
                let message = current
                    .error
                    .map_or_else(|| String::from("unknown error"), |err| err.message);
                return Err(StepError::ActionFailed {
                    action: current.id,
                    command: current.command,
                    message,
                });
            }
            ActionStatus::Running => {}
        }

        if deadline.has_passed() {
            return Err(StepError::Timeout {
                waiting_for: current.command,
                resource: format!("action {}", current.id),
            });
        }

        sleep(state.timings.poll_interval).await;
        tracing::debug!(action = %current.id, progress = current.progress, "polling action");
        current = state
            .client
            .action_by_id(current.id)
            .await
            .map_err(StepError::Client)?
            .ok_or_else(|| StepError::NotFound {
                kind: ResourceKind::Action,
                name: current.id.to_string(),
            })?;
    }
}

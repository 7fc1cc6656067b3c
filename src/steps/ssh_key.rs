//! Registers a temporary SSH key, or reuses a configured one.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::client::{CloudClient, SshKeyCreateOpts};
use crate::command::CommandRunner;
use crate::keygen::{KeyGenerator, KeyPair};
use crate::resources::SshKeyId;
use crate::state::{BuildState, SshCredentials};
use crate::step::{ResourceKind, Step, StepError, StepFuture, StepResult};

/// Makes an SSH key available to the create-server step.
///
/// When the request names an existing key it is verified and reused, and
/// cleanup leaves it alone. Otherwise a key pair is generated locally,
/// registered with the provider, and deleted again on cleanup.
pub struct EnsureSshKey<R: CommandRunner> {
    generator: KeyGenerator<R>,
    registered: Option<SshKeyId>,
    key_pair: Option<KeyPair>,
}

impl<R: CommandRunner> EnsureSshKey<R> {
    /// Creates the step around a key generator.
    #[must_use]
    pub const fn new(generator: KeyGenerator<R>) -> Self {
        Self {
            generator,
            registered: None,
            key_pair: None,
        }
    }

    async fn reuse<C: CloudClient>(
        state: &mut BuildState<C>,
        id: SshKeyId,
    ) -> StepResult<C::Error> {
        let key = state
            .client
            .ssh_key_by_id(id)
            .await
            .map_err(StepError::Client)?
            .ok_or_else(|| StepError::NotFound {
                kind: ResourceKind::SshKey,
                name: id.to_string(),
            })?;
        state.ui.say(&format!("Using existing SSH key {} ({})", key.name, key.id));
        state.ssh_key = Some(SshCredentials {
            key_id: key.id,
            private_key: None,
        });
        Ok(())
    }

    async fn register<C: CloudClient>(
        &mut self,
        state: &mut BuildState<C>,
    ) -> StepResult<C::Error> {
        let name = format!("hcloud-imager-{}", Uuid::new_v4().simple());
        state.ui.say("Creating temporary SSH key...");
        let pair = self.generator.generate(&name)?;

        let opts = SshKeyCreateOpts {
            name,
            public_key: pair.public_key().to_owned(),
            labels: BTreeMap::from([(String::from("managed-by"), String::from("hcloud-imager"))]),
        };
        let key = state
            .client
            .create_ssh_key(&opts)
            .await
            .map_err(StepError::Client)?;

        self.registered = Some(key.id);
        state.ssh_key = Some(SshCredentials {
            key_id: key.id,
            private_key: Some(pair.private_key_path().to_owned()),
        });
        self.key_pair = Some(pair);
        tracing::debug!(ssh_key = %key.id, "registered temporary SSH key");
        state.ui.say(&format!("Created temporary SSH key {}", key.id));
        Ok(())
    }
}

impl<C, R> Step<C> for EnsureSshKey<R>
where
    C: CloudClient,
    R: CommandRunner,
{
    fn name(&self) -> &'static str {
        "ssh-key"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState<C>) -> StepFuture<'a, StepResult<C::Error>> {
        Box::pin(async move {
            match state.request.ssh_key_id {
                Some(id) => Self::reuse(state, id).await,
                None => self.register(state).await,
            }
        })
    }

    fn cleanup<'a>(
        &'a mut self,
        state: &'a mut BuildState<C>,
    ) -> StepFuture<'a, StepResult<C::Error>> {
        Box::pin(async move {
            let Some(id) = self.registered.take() else {
                self.key_pair = None;
                return Ok(());
            };
            state.ui.say(&format!("Deleting temporary SSH key {id}..."));
            let result = state
                .client
                .delete_ssh_key(id)
                .await
                .map_err(StepError::Client);
            self.key_pair = None;
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::DEFAULT_SSH_KEYGEN_BIN;
    use crate::request::ImageRequest;
    use crate::test_support::{
        ClientCall, RecordingUi, ScriptedClient, ScriptedRunner, build_state, sample_request,
    };

    fn step_with_key(runner: &ScriptedRunner) -> EnsureSshKey<ScriptedRunner> {
        runner.push_keygen_success("ssh-ed25519 AAAAC3Nza hcloud-imager");
        EnsureSshKey::new(KeyGenerator::new(runner.clone(), DEFAULT_SSH_KEYGEN_BIN))
    }

    #[tokio::test]
    async fn generates_registers_and_deletes_temporary_key() {
        let client = ScriptedClient::new();
        let runner = ScriptedRunner::new();
        let mut step = step_with_key(&runner);
        let mut state = build_state(client.clone(), sample_request(), RecordingUi::new());

        step.run(&mut state).await.expect("key registered");
        let credentials = state.ssh_key.clone().expect("credentials stored");
        let private_key = credentials.private_key.expect("generated key path");
        assert!(private_key.exists());

        step.cleanup(&mut state).await.expect("key deleted");
        step.cleanup(&mut state).await.expect("second cleanup is a no-op");

        assert!(!private_key.exists());
        let deletes = client
            .calls()
            .into_iter()
            .filter(|call| matches!(call, ClientCall::DeleteSshKey(_)))
            .count();
        assert_eq!(deletes, 1);
    }

    #[tokio::test]
    async fn reuses_configured_key_without_deleting_it() {
        let client = ScriptedClient::new();
        let request = ImageRequest {
            ssh_key_id: Some(SshKeyId::new(ScriptedClient::EXISTING_SSH_KEY_ID)),
            ..sample_request()
        };
        let mut step = EnsureSshKey::new(KeyGenerator::new(
            ScriptedRunner::new(),
            DEFAULT_SSH_KEYGEN_BIN,
        ));
        let mut state = build_state(client.clone(), request, RecordingUi::new());

        step.run(&mut state).await.expect("key reused");
        step.cleanup(&mut state).await.expect("nothing to clean");

        assert_eq!(
            state.ssh_key.map(|key| key.key_id),
            Some(SshKeyId::new(ScriptedClient::EXISTING_SSH_KEY_ID))
        );
        assert!(
            !client
                .calls()
                .iter()
                .any(|call| matches!(call, ClientCall::CreateSshKey | ClientCall::DeleteSshKey(_)))
        );
    }

    #[tokio::test]
    async fn unknown_configured_key_is_a_resolution_error() {
        let client = ScriptedClient::new();
        let request = ImageRequest {
            ssh_key_id: Some(SshKeyId::new(999)),
            ..sample_request()
        };
        let mut step = EnsureSshKey::new(KeyGenerator::new(
            ScriptedRunner::new(),
            DEFAULT_SSH_KEYGEN_BIN,
        ));
        let mut state = build_state(client, request, RecordingUi::new());

        let err = step.run(&mut state).await.expect_err("key is unknown");

        assert_eq!(
            err,
            StepError::NotFound {
                kind: ResourceKind::SshKey,
                name: String::from("999"),
            }
        );
    }
}

//! Temporary SSH key pair generation via the system `ssh-keygen`.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use tempfile::TempDir;
use thiserror::Error;

use crate::command::{CommandRunner, SpawnError};

/// Default `ssh-keygen` binary name.
pub const DEFAULT_SSH_KEYGEN_BIN: &str = "ssh-keygen";

const PRIVATE_KEY_FILE: &str = "id_ed25519";
const PUBLIC_KEY_FILE: &str = "id_ed25519.pub";

/// Errors raised while generating a key pair.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum KeygenError {
    /// Raised when the scratch directory cannot be prepared.
    #[error("failed to prepare key directory: {0}")]
    Workspace(String),
    /// Raised when `ssh-keygen` cannot be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// Raised when `ssh-keygen` exits unsuccessfully.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Human readable exit status.
        status_text: String,
        /// Captured stderr.
        stderr: String,
    },
    /// Raised when the generated public key cannot be read back.
    #[error("failed to read generated public key: {0}")]
    ReadPublicKey(String),
}

/// A generated key pair. The private key is removed when this value drops.
#[derive(Debug)]
pub struct KeyPair {
    _dir: TempDir,
    private_key: Utf8PathBuf,
    public_key: String,
}

impl KeyPair {
    /// Path of the private key file.
    #[must_use]
    pub fn private_key_path(&self) -> &Utf8Path {
        &self.private_key
    }

    /// OpenSSH formatted public key.
    #[must_use]
    pub fn public_key(&self) -> &str {
        &self.public_key
    }
}

/// Generates ed25519 key pairs in private scratch directories.
#[derive(Clone, Debug)]
pub struct KeyGenerator<R: CommandRunner> {
    runner: R,
    program: String,
}

impl<R: CommandRunner> KeyGenerator<R> {
    /// Creates a generator that invokes `program` through `runner`.
    #[must_use]
    pub fn new(runner: R, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// Generates a passphrase-less key pair labelled with `comment`.
    ///
    /// # Errors
    ///
    /// Returns [`KeygenError`] when the scratch directory cannot be created,
    /// the generator fails, or the public key cannot be read.
    pub fn generate(&self, comment: &str) -> Result<KeyPair, KeygenError> {
        let dir = TempDir::new().map_err(|err| KeygenError::Workspace(err.to_string()))?;
        let dir_path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).map_err(|path| {
            KeygenError::Workspace(format!("non-utf8 path: {}", path.display()))
        })?;
        let private_key = dir_path.join(PRIVATE_KEY_FILE);

        let args = [
            "-q",
            "-t",
            "ed25519",
            "-N",
            "",
            "-C",
            comment,
            "-f",
            private_key.as_str(),
        ]
        .map(OsString::from);
        let output = self.runner.run(&self.program, &args)?;
        if !output.is_success() {
            return Err(KeygenError::CommandFailure {
                program: self.program.clone(),
                status_text: output.status_text(),
                stderr: output.stderr,
            });
        }

        let public_key = Dir::open_ambient_dir(&dir_path, ambient_authority())
            .and_then(|handle| handle.read_to_string(PUBLIC_KEY_FILE))
            .map_err(|err| KeygenError::ReadPublicKey(err.to_string()))?
            .trim()
            .to_owned();
        if public_key.is_empty() {
            return Err(KeygenError::ReadPublicKey(String::from(
                "public key file is empty",
            )));
        }

        tracing::debug!(path = %private_key, "generated temporary SSH key pair");
        Ok(KeyPair {
            _dir: dir,
            private_key,
            public_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;

    #[test]
    fn generate_reads_public_key_written_by_generator() {
        let runner = ScriptedRunner::new();
        runner.push_keygen_success("ssh-ed25519 AAAAC3Nza test");
        let generator = KeyGenerator::new(runner.clone(), DEFAULT_SSH_KEYGEN_BIN);

        let pair = generator.generate("hcloud-imager").expect("key pair");

        assert_eq!(pair.public_key(), "ssh-ed25519 AAAAC3Nza test");
        assert!(pair.private_key_path().as_str().ends_with(PRIVATE_KEY_FILE));
        let invocation = runner.invocations().pop().expect("invocation recorded");
        assert_eq!(invocation.program, DEFAULT_SSH_KEYGEN_BIN);
        assert!(invocation.command_string().contains("-t ed25519"));
    }

    #[test]
    fn generate_surfaces_non_zero_exit() {
        let runner = ScriptedRunner::new();
        runner.push_failure(1, "boom");
        let generator = KeyGenerator::new(runner, DEFAULT_SSH_KEYGEN_BIN);

        let err = generator.generate("hcloud-imager").expect_err("must fail");

        assert_eq!(
            err,
            KeygenError::CommandFailure {
                program: String::from(DEFAULT_SSH_KEYGEN_BIN),
                status_text: String::from("1"),
                stderr: String::from("boom"),
            }
        );
    }

    #[test]
    fn key_directory_is_removed_on_drop() {
        let runner = ScriptedRunner::new();
        runner.push_keygen_success("ssh-ed25519 AAAA drop");
        let pair = KeyGenerator::new(runner, DEFAULT_SSH_KEYGEN_BIN)
            .generate("hcloud-imager")
            .expect("key pair");
        let path = pair.private_key_path().to_owned();

        drop(pair);

        assert!(!path.exists());
    }
}

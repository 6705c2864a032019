//! SSH key generation for machines created without pre-registered keys.

use std::ffi::OsString;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use thiserror::Error;
use tracing::debug;

use crate::process::{CommandRunner, ProcessCommandRunner, ProcessError};

/// File name of the generated private key.
pub const PRIVATE_KEY_FILE: &str = "id_ed25519";

const PUBLIC_KEY_FILE: &str = "id_ed25519.pub";
const DEFAULT_KEYGEN_BIN: &str = "ssh-keygen";

/// Errors raised while generating an SSH key pair.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Raised when the key directory cannot be prepared.
    #[error("failed to prepare key directory {path}: {message}")]
    Directory {
        /// Directory that could not be prepared.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the key generator fails.
    #[error(transparent)]
    Command(#[from] ProcessError),
    /// Raised when the public key cannot be read back.
    #[error("failed to read public key {path}: {message}")]
    ReadPublicKey {
        /// Public key path.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the generator left an empty public key behind.
    #[error("public key {path} is empty")]
    EmptyPublicKey {
        /// Public key path.
        path: Utf8PathBuf,
    },
}

/// Produces the public half of a fresh key pair for a machine.
pub trait KeySource: Send + Sync {
    /// Generates a key pair commented with `name` and returns the OpenSSH
    /// public key line.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the pair cannot be generated or read.
    fn public_key(&self, name: &str) -> Result<String, KeyError>;
}

/// [`KeySource`] that shells out to `ssh-keygen` and keeps the pair in a
/// per-machine directory.
#[derive(Clone, Debug)]
pub struct SshKeygen<R = ProcessCommandRunner> {
    runner: R,
    directory: Utf8PathBuf,
    program: String,
}

impl SshKeygen {
    /// Creates a key source writing into `directory`.
    #[must_use]
    pub fn new(directory: impl Into<Utf8PathBuf>) -> Self {
        Self::with_runner(ProcessCommandRunner, directory)
    }
}

impl<R: CommandRunner> SshKeygen<R> {
    /// Creates a key source that runs the generator through `runner`.
    #[must_use]
    pub fn with_runner(runner: R, directory: impl Into<Utf8PathBuf>) -> Self {
        Self {
            runner,
            directory: directory.into(),
            program: DEFAULT_KEYGEN_BIN.to_owned(),
        }
    }

    /// Path of the private key once generated.
    #[must_use]
    pub fn private_key_path(&self) -> Utf8PathBuf {
        self.directory.join(PRIVATE_KEY_FILE)
    }

    fn prepare_directory(&self) -> Result<Dir, KeyError> {
        let directory_error = |err: io::Error| KeyError::Directory {
            path: self.directory.clone(),
            message: err.to_string(),
        };
        Dir::create_ambient_dir_all(&self.directory, ambient_authority())
            .map_err(directory_error)?;
        let dir =
            Dir::open_ambient_dir(&self.directory, ambient_authority()).map_err(directory_error)?;
        // ssh-keygen prompts before overwriting, so clear any stale pair.
        for file in [PRIVATE_KEY_FILE, PUBLIC_KEY_FILE] {
            match dir.remove_file(file) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(directory_error(err)),
            }
        }
        Ok(dir)
    }
}

impl<R: CommandRunner> KeySource for SshKeygen<R> {
    fn public_key(&self, name: &str) -> Result<String, KeyError> {
        let dir = self.prepare_directory()?;
        let private_key = self.private_key_path();
        let args = keygen_args(&private_key, name);
        debug!(path = %private_key, "generating SSH key pair");
        let output = self.runner.run(&self.program, &args)?;
        if !output.is_success() {
            return Err(ProcessError::failure(&self.program, output).into());
        }

        let public_path = self.directory.join(PUBLIC_KEY_FILE);
        let contents = dir
            .read_to_string(PUBLIC_KEY_FILE)
            .map_err(|err| KeyError::ReadPublicKey {
                path: public_path.clone(),
                message: err.to_string(),
            })?;
        let key = contents.trim();
        if key.is_empty() {
            return Err(KeyError::EmptyPublicKey { path: public_path });
        }
        Ok(key.to_owned())
    }
}

fn keygen_args(private_key: &Utf8Path, comment: &str) -> Vec<OsString> {
    ["-q", "-t", "ed25519", "-N", "", "-C", comment, "-f", private_key.as_str()]
        .into_iter()
        .map(OsString::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::test_support::ScriptedRunner;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    const PUBLIC_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIExample node-1";

    /// Writes the public key next to the `-f` path, as ssh-keygen would.
    #[derive(Clone, Debug, Default)]
    struct WritingRunner {
        inner: ScriptedRunner,
        contents: String,
    }

    impl CommandRunner for WritingRunner {
        fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ProcessError> {
            let output = self.inner.run(program, args)?;
            if output.is_success() {
                let key_path = args
                    .iter()
                    .skip_while(|arg| arg.as_os_str() != "-f")
                    .nth(1)
                    .unwrap_or_else(|| panic!("missing -f argument"));
                let public_path = format!("{}.pub", key_path.to_string_lossy());
                std::fs::write(&public_path, &self.contents)
                    .unwrap_or_else(|err| panic!("write {public_path}: {err}"));
            }
            Ok(output)
        }
    }

    #[fixture]
    fn key_dir() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = Utf8PathBuf::from_path_buf(temp.path().join("node-1"))
            .unwrap_or_else(|path| panic!("non-UTF-8 temp path: {}", path.display()));
        (temp, path)
    }

    #[rstest]
    fn returns_trimmed_public_key(key_dir: (TempDir, Utf8PathBuf)) {
        let (_temp, path) = key_dir;
        let runner = WritingRunner {
            contents: format!("{PUBLIC_KEY}\n"),
            ..WritingRunner::default()
        };
        runner.inner.push_success();
        let source = SshKeygen::with_runner(runner.clone(), path.clone());

        let key = source
            .public_key("node-1")
            .unwrap_or_else(|err| panic!("key generation should succeed: {err}"));

        assert_eq!(key, PUBLIC_KEY);
        let invocations = runner.inner.invocations();
        let command = invocations
            .first()
            .unwrap_or_else(|| panic!("ssh-keygen was not invoked"))
            .command_string();
        assert_eq!(
            command,
            format!("ssh-keygen -q -t ed25519 -N  -C node-1 -f {path}/id_ed25519")
        );
    }

    #[rstest]
    fn replaces_a_stale_key_pair(key_dir: (TempDir, Utf8PathBuf)) {
        let (_temp, path) = key_dir;
        std::fs::create_dir_all(&path).unwrap_or_else(|err| panic!("mkdir: {err}"));
        std::fs::write(path.join(PRIVATE_KEY_FILE), "stale")
            .unwrap_or_else(|err| panic!("write stale key: {err}"));
        let runner = WritingRunner {
            contents: PUBLIC_KEY.to_owned(),
            ..WritingRunner::default()
        };
        runner.inner.push_success();

        SshKeygen::with_runner(runner, path.clone())
            .public_key("node-1")
            .unwrap_or_else(|err| panic!("key generation should succeed: {err}"));

        assert!(!path.join(PRIVATE_KEY_FILE).exists());
    }

    #[rstest]
    fn reports_generator_failure(key_dir: (TempDir, Utf8PathBuf)) {
        let (_temp, path) = key_dir;
        let runner = ScriptedRunner::new();
        runner.push_failure(1);

        let err = SshKeygen::with_runner(runner, path)
            .public_key("node-1")
            .expect_err("failing ssh-keygen should error");

        assert!(matches!(
            err,
            KeyError::Command(ProcessError::CommandFailure { status: Some(1), .. })
        ));
    }

    #[rstest]
    fn rejects_an_empty_public_key(key_dir: (TempDir, Utf8PathBuf)) {
        let (_temp, path) = key_dir;
        let runner = WritingRunner::default();
        runner.inner.push_success();

        let err = SshKeygen::with_runner(runner, path)
            .public_key("node-1")
            .expect_err("empty key should error");

        assert!(matches!(err, KeyError::EmptyPublicKey { .. }));
    }
}

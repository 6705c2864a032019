//! Per-machine state persisted between driver invocations.
//!
//! The driver keeps no store of its own; the host orchestrator persists the
//! fields below and hands them back on every later call. [`MachineStore`] is
//! the file-backed equivalent used by the bundled binary: one
//! `<store>/<machine>/driver.json` document per machine.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::ServerType;

const RECORD_FILE_NAME: &str = "driver.json";

/// Fields the orchestrator serialises for a provisioned machine.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MachineRecord {
    /// Orchestrator-assigned machine name.
    pub machine_name: String,
    /// Hardware family, which selects the provider endpoints.
    pub server_type: ServerType,
    /// Provider-assigned identifier, once created.
    #[serde(default)]
    pub instance_id: Option<String>,
    /// Last observed main IP address.
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Last observed private address.
    #[serde(default)]
    pub internal_ip: Option<String>,
    /// Docker engine port.
    pub docker_port: u16,
    /// SSH port.
    pub ssh_port: u16,
    /// SSH login user.
    pub ssh_user: String,
    /// SSH keys installed on the machine.
    #[serde(default)]
    pub ssh_key_ids: Vec<String>,
    /// Firewall group the machine is attached to.
    #[serde(default)]
    pub firewall_group_id: Option<String>,
    /// Docker-port rule created in the firewall group, if any.
    #[serde(default)]
    pub firewall_rule_id: Option<u64>,
}

/// Errors raised while reading or writing machine records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Raised when no record exists for the machine.
    #[error("no machine named {name} in {path}")]
    NotFound {
        /// Machine name that was looked up.
        name: String,
        /// Store directory searched.
        path: Utf8PathBuf,
    },
    /// Raised when a record already exists for the machine.
    #[error("machine {name} already exists at {path}; remove it first")]
    AlreadyExists {
        /// Machine name that was looked up.
        name: String,
        /// Record file found.
        path: Utf8PathBuf,
    },
    /// Raised when the machine name cannot be used as a directory name.
    #[error("invalid machine name `{0}`")]
    InvalidName(String),
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the stored JSON cannot be parsed or rendered.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// File-backed store of [`MachineRecord`]s.
#[derive(Clone, Debug)]
pub struct MachineStore {
    root: Utf8PathBuf,
}

impl MachineStore {
    /// Creates a store rooted at `root`, expanding a leading `~/`.
    #[must_use]
    pub fn new(root: &str) -> Self {
        Self {
            root: Utf8PathBuf::from(expand_tilde(root)),
        }
    }

    /// Returns the directory holding files for `name` (SSH keys, record).
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidName`] for names that would escape the
    /// store directory.
    pub fn machine_dir(&self, name: &str) -> Result<Utf8PathBuf, RecordError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Loads the record for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] when no record exists, or
    /// [`RecordError::Io`]/[`RecordError::Parse`] for unreadable files.
    pub fn load(&self, name: &str) -> Result<MachineRecord, RecordError> {
        let dir_path = self.machine_dir(name)?;
        let path = dir_path.join(RECORD_FILE_NAME);
        let dir = match Dir::open_ambient_dir(&dir_path, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(RecordError::NotFound {
                    name: name.to_owned(),
                    path: self.root.clone(),
                });
            }
            Err(err) => {
                return Err(RecordError::Io {
                    path: dir_path,
                    message: err.to_string(),
                });
            }
        };

        let contents = match dir.read_to_string(RECORD_FILE_NAME) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(RecordError::NotFound {
                    name: name.to_owned(),
                    path: self.root.clone(),
                });
            }
            Err(err) => {
                return Err(RecordError::Io {
                    path,
                    message: err.to_string(),
                });
            }
        };

        serde_json::from_str(&contents).map_err(|err| RecordError::Parse {
            path,
            message: err.to_string(),
        })
    }

    /// Succeeds only when no record exists for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::AlreadyExists`] when a record is present, or any
    /// other [`RecordError`] raised while looking for it.
    pub fn ensure_absent(&self, name: &str) -> Result<(), RecordError> {
        match self.load(name) {
            Err(RecordError::NotFound { .. }) => Ok(()),
            Ok(_) => Err(RecordError::AlreadyExists {
                name: name.to_owned(),
                path: self.machine_dir(name)?.join(RECORD_FILE_NAME),
            }),
            Err(err) => Err(err),
        }
    }

    /// Writes `record`, creating the machine directory when needed.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] when the directory or file cannot be written.
    pub fn save(&self, record: &MachineRecord) -> Result<Utf8PathBuf, RecordError> {
        let dir_path = self.machine_dir(&record.machine_name)?;
        let dir = open_or_create(&dir_path)?;
        let path = dir_path.join(RECORD_FILE_NAME);
        let rendered =
            serde_json::to_string_pretty(record).map_err(|err| RecordError::Parse {
                path: path.clone(),
                message: err.to_string(),
            })?;
        dir.write(RECORD_FILE_NAME, rendered)
            .map_err(|err| RecordError::Io {
                path: path.clone(),
                message: err.to_string(),
            })?;
        Ok(path)
    }

    /// Deletes the machine directory; missing directories are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Io`] when the directory cannot be removed.
    pub fn forget(&self, name: &str) -> Result<(), RecordError> {
        let dir_path = self.machine_dir(name)?;
        let root = match Dir::open_ambient_dir(&self.root, ambient_authority()) {
            Ok(root) => root,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(RecordError::Io {
                    path: self.root.clone(),
                    message: err.to_string(),
                });
            }
        };
        match root.remove_dir_all(name) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(RecordError::Io {
                path: dir_path,
                message: err.to_string(),
            }),
        }
    }
}

fn validate_name(name: &str) -> Result<(), RecordError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed != name
        || name.contains(['/', '\\'])
        || name == "."
        || name == ".."
    {
        return Err(RecordError::InvalidName(name.to_owned()));
    }
    Ok(())
}

fn open_or_create(path: &Utf8Path) -> Result<Dir, RecordError> {
    Dir::create_ambient_dir_all(path, ambient_authority()).map_err(|err| RecordError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    Dir::open_ambient_dir(path, ambient_authority()).map_err(|err| RecordError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// If `HOME` is not set the input is returned unchanged.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

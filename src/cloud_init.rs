//! Cloud-init user-data resolution.
//!
//! User-data reaches the provider as a base64 blob. It can be supplied already
//! encoded (passed through untouched) or as a cloud-config file, in which case
//! the document is parsed, the firewall hardening commands are appended to its
//! `runcmd` list, and the result is serialised once and encoded. When neither
//! is supplied a built-in document carrying only the hardening commands is
//! used, so an OS-level firewall never blocks the orchestrator's own port
//! rules.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::record::expand_tilde;

const CLOUD_CONFIG_HEADER: &str = "#cloud-config";
const RUNCMD_KEY: &str = "runcmd";

/// Commands appended to every cloud-config document so that host firewalls
/// do not shadow the provider firewall group.
pub const HARDENING_COMMANDS: [&str; 2] = ["ufw disable", "systemctl disable --now firewalld"];

/// Errors raised while resolving cloud-init user-data.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum CloudInitError {
    /// Raised when both an encoded payload and a file are supplied.
    #[error("cloud-init user-data cannot be provided both inline and via file")]
    BothProvided,
    /// Raised when the supplied base64 payload does not decode.
    #[error("cloud-init user-data is not valid base64: {0}")]
    InvalidEncoding(String),
    /// Raised when the file resolves to empty or only whitespace.
    #[error("cloud-init user-data file must not be empty")]
    FileEmpty,
    /// Raised when reading the file fails.
    #[error("failed to read cloud-init user-data file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the document is not a YAML mapping.
    #[error("cloud-init user-data file is not a cloud-config document: {0}")]
    NotCloudConfig(String),
    /// Raised when `runcmd` exists but is not a list.
    #[error("cloud-config `runcmd` must be a list")]
    RunCmdNotList,
}

/// A parsed cloud-config document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CloudConfig {
    document: Mapping,
}

impl CloudConfig {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a cloud-config document.
    ///
    /// # Errors
    ///
    /// Returns [`CloudInitError::NotCloudConfig`] when the text is not a YAML
    /// mapping.
    pub fn parse(text: &str) -> Result<Self, CloudInitError> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        match serde_yaml::from_str::<Value>(text) {
            Ok(Value::Mapping(document)) => Ok(Self { document }),
            Ok(Value::Null) => Ok(Self::new()),
            Ok(_) => Err(CloudInitError::NotCloudConfig(String::from(
                "top-level value is not a mapping",
            ))),
            Err(err) => Err(CloudInitError::NotCloudConfig(err.to_string())),
        }
    }

    /// Appends commands to `runcmd`, skipping ones already present.
    ///
    /// # Errors
    ///
    /// Returns [`CloudInitError::RunCmdNotList`] when an existing `runcmd`
    /// entry is not a sequence.
    pub fn append_run_commands<'a>(
        &mut self,
        commands: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), CloudInitError> {
        let key = Value::from(RUNCMD_KEY);
        let entry = self
            .document
            .entry(key)
            .or_insert_with(|| Value::Sequence(Vec::new()));
        if entry.is_null() {
            *entry = Value::Sequence(Vec::new());
        }
        let Value::Sequence(runcmd) = entry else {
            return Err(CloudInitError::RunCmdNotList);
        };
        for command in commands {
            let value = Value::from(command);
            if !runcmd.contains(&value) {
                runcmd.push(value);
            }
        }
        Ok(())
    }

    /// Returns the `runcmd` entries rendered as strings.
    #[must_use]
    pub fn run_commands(&self) -> Vec<String> {
        self.document
            .get(RUNCMD_KEY)
            .and_then(Value::as_sequence)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| match entry {
                        Value::String(text) => Some(text.clone()),
                        other => serde_yaml::to_string(other)
                            .ok()
                            .map(|text| text.trim().to_owned()),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Serialises the document with its `#cloud-config` header.
    ///
    /// # Errors
    ///
    /// Returns [`CloudInitError::NotCloudConfig`] if serialisation fails.
    pub fn render(&self) -> Result<String, CloudInitError> {
        let body = serde_yaml::to_string(&self.document)
            .map_err(|err| CloudInitError::NotCloudConfig(err.to_string()))?;
        Ok(format!("{CLOUD_CONFIG_HEADER}\n{body}"))
    }
}

/// Returns the built-in cloud-config used when no user-data is supplied.
///
/// # Errors
///
/// Returns [`CloudInitError`] only if YAML serialisation fails.
pub fn default_cloud_config() -> Result<String, CloudInitError> {
    hardened(CloudConfig::new())?.render()
}

/// Resolves the base64 user-data blob sent on create.
///
/// # Errors
///
/// Returns [`CloudInitError`] when both sources are given, the encoded payload
/// is not base64, or the file cannot be read or parsed.
pub fn resolve_user_data(
    encoded: Option<&str>,
    file: Option<&str>,
) -> Result<String, CloudInitError> {
    let encoded_value = encoded.map(str::trim).filter(|value| !value.is_empty());
    let file_path = file.map(str::trim).filter(|value| !value.is_empty());

    match (encoded_value, file_path) {
        (Some(_), Some(_)) => Err(CloudInitError::BothProvided),
        (Some(payload), None) => {
            STANDARD
                .decode(payload)
                .map_err(|err| CloudInitError::InvalidEncoding(err.to_string()))?;
            Ok(payload.to_owned())
        }
        (None, Some(path)) => {
            let content = read_user_data_file(path)?;
            let document = hardened(CloudConfig::parse(&content)?)?;
            Ok(STANDARD.encode(document.render()?))
        }
        (None, None) => Ok(STANDARD.encode(default_cloud_config()?)),
    }
}

fn hardened(mut document: CloudConfig) -> Result<CloudConfig, CloudInitError> {
    document.append_run_commands(HARDENING_COMMANDS)?;
    Ok(document)
}

fn read_user_data_file(path: &str) -> Result<String, CloudInitError> {
    let expanded = expand_tilde(path);
    let content =
        read_to_string_ambient(&expanded).map_err(|message| CloudInitError::FileRead {
            path: expanded.clone(),
            message,
        })?;
    if content.trim().is_empty() {
        return Err(CloudInitError::FileEmpty);
    }
    Ok(content)
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}

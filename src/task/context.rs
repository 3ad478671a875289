// src/task/context.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{FallaxError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::is_plain_name;

/// Open mapping of extra creation-time parameters carried by a context.
pub type ContextParams = BTreeMap<String, Value>;

/// Per-task working-directory descriptor.
///
/// Paths are derived from `base_data_dir` and `name`:
///
/// ```text
/// <base_data_dir>/working/<name>/in
/// <base_data_dir>/working/<name>/out
/// <base_data_dir>/working/<name>/tmp
/// ```
///
/// All three directories exist once a context has been constructed.
/// Contexts are never mutated after creation; they cross the queue boundary
/// through [`TaskContext::to_transport`] / [`TaskContext::from_transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct TaskContext {
    name: String,
    base_data_dir: PathBuf,
    extra: ContextParams,
}

/// Wire shape of a context inside a task message.
#[derive(Debug, Deserialize)]
struct ContextTransport {
    name: String,
    base_data_dir: String,
    #[serde(default)]
    extra: ContextParams,
}

impl TaskContext {
    /// Create a context and ensure its working directories on the real
    /// filesystem.
    pub fn new(
        name: impl Into<String>,
        base_data_dir: impl Into<PathBuf>,
        extra: ContextParams,
    ) -> Result<Self> {
        Self::new_in(&RealFileSystem, name, base_data_dir, extra)
    }

    /// Like [`TaskContext::new`] but creating directories through `fs`.
    pub fn new_in(
        fs: &dyn FileSystem,
        name: impl Into<String>,
        base_data_dir: impl Into<PathBuf>,
        extra: ContextParams,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;

        let ctx = Self {
            name,
            base_data_dir: base_data_dir.into(),
            extra,
        };
        ctx.ensure_working_directories(fs)?;
        Ok(ctx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_data_dir(&self) -> &Path {
        &self.base_data_dir
    }

    pub fn extra(&self) -> &ContextParams {
        &self.extra
    }

    pub fn working_dir(&self) -> PathBuf {
        self.base_data_dir.join("working")
    }

    pub fn input_dir(&self) -> PathBuf {
        self.working_dir().join(&self.name).join("in")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.working_dir().join(&self.name).join("out")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.working_dir().join(&self.name).join("tmp")
    }

    fn ensure_working_directories(&self, fs: &dyn FileSystem) -> Result<()> {
        for dir in [self.input_dir(), self.output_dir(), self.tmp_dir()] {
            if !fs.is_dir(&dir) {
                fs.create_dir_all(&dir)?;
            }
        }
        Ok(())
    }

    /// Plain JSON object `{name, base_data_dir, extra}` for task messages.
    pub fn to_transport(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "base_data_dir": self.base_data_dir.to_string_lossy(),
            "extra": self.extra,
        })
    }

    /// Rebuild a context from [`TaskContext::to_transport`] output.
    ///
    /// Directories are ensured again: the receiving process may not share
    /// the sender's filesystem view.
    pub fn from_transport(value: &Value) -> Result<Self> {
        Self::from_transport_in(&RealFileSystem, value)
    }

    pub fn from_transport_in(fs: &dyn FileSystem, value: &Value) -> Result<Self> {
        let transport = ContextTransport::deserialize(value)?;
        Self::new_in(fs, transport.name, transport.base_data_dir, transport.extra)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(FallaxError::InvalidContext(
            "context name must not be empty".to_string(),
        ));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(FallaxError::InvalidContext(format!(
            "context name '{name}' must be a single path component"
        )));
    }
    if !is_plain_name(name) {
        return Err(FallaxError::InvalidContext(format!(
            "context name '{name}' may only contain letters, digits, '_', '.' and '-'"
        )));
    }
    Ok(())
}

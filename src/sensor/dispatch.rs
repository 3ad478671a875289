// src/sensor/dispatch.rs

//! The file-to-workflow dispatch rule.
//!
//! For one arrived file:
//! 1. compute [`FileMeta`] (watched root, sub-directory, file name);
//! 2. for each workflow, in order: copy the file to
//!    `<context.input_dir>/<filename>`, then submit the workflow's signature
//!    with `{fp, meta}`;
//! 3. delete the original.
//!
//! Submission failures are logged per workflow and never stop the fan-out or
//! the deletion. A copy failure is a local I/O fault: it aborts the dispatch
//! with [`FallaxError::CopyFailed`] and the original file is left in place.

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::errors::{FallaxError, Result};
use crate::fs::FileSystem;
use crate::queue::QueueError;
use crate::sensor::path_utils::relative_subdir;
use crate::task::{TaskHandle, Workflow};

/// Metadata sent with every dispatched file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMeta {
    /// Absolute path of the watched directory.
    pub input_dir: String,
    /// Directory of the file relative to `input_dir` (`"."` at the top).
    pub input_subdir: String,
    pub original_filename: String,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    Submitted(TaskHandle),
    Failed(QueueError),
}

impl SubmitOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmitOutcome::Submitted(_))
    }
}

#[derive(Debug)]
pub struct WorkflowOutcome {
    pub workflow: String,
    pub copied_to: PathBuf,
    pub submission: SubmitOutcome,
}

/// What happened to one file.
#[derive(Debug)]
pub struct DispatchReport {
    pub path: PathBuf,
    pub meta: FileMeta,
    pub outcomes: Vec<WorkflowOutcome>,
}

impl DispatchReport {
    pub fn submitted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.submission.is_submitted())
            .count()
    }

    pub fn failed_submissions(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.submission.is_submitted())
            .map(|o| o.workflow.as_str())
            .collect()
    }
}

/// Compute the dispatch metadata for `path` under `watched_root`.
pub fn file_meta(fs: &dyn FileSystem, watched_root: &Path, path: &Path) -> Result<FileMeta> {
    let filename = path
        .file_name()
        .ok_or_else(|| FallaxError::Other(anyhow!("event path {path:?} has no file name")))?;

    let root_abs = fs
        .canonicalize(watched_root)
        .or_else(|_| std::path::absolute(watched_root))?;

    let input_subdir = relative_subdir(watched_root, path).unwrap_or_else(|| {
        warn!(?path, root = ?watched_root, "file is not below the watched root");
        ".".to_string()
    });

    Ok(FileMeta {
        input_dir: root_abs.to_string_lossy().into_owned(),
        input_subdir,
        original_filename: filename.to_string_lossy().into_owned(),
    })
}

/// Fan `path` out to every workflow, then delete it.
pub async fn dispatch_file(
    fs: &dyn FileSystem,
    watched_root: &Path,
    path: &Path,
    workflows: &[Workflow],
) -> Result<DispatchReport> {
    debug!(?path, "file detected");

    let meta = file_meta(fs, watched_root, path)?;
    let meta_value = serde_json::to_value(&meta)?;
    let fp = path.to_string_lossy().into_owned();

    if workflows.is_empty() {
        warn!(?path, "no workflow registered for this sensor; file will be deleted");
    }

    let mut outcomes = Vec::with_capacity(workflows.len());

    for wf in workflows {
        let dest = wf.context.input_dir().join(&meta.original_filename);
        debug!(workflow = %wf.name(), from = ?path, to = ?dest, "copying file");
        fs.copy(path, &dest).map_err(|source| {
            error!(workflow = %wf.name(), from = ?path, to = ?dest, error = %source, "copy failed");
            FallaxError::CopyFailed {
                workflow: wf.name().to_string(),
                from: path.to_path_buf(),
                to: dest.clone(),
                source,
            }
        })?;

        info!(workflow = %wf.name(), file = ?dest, "launching workflow");

        let mut kwargs = Map::new();
        kwargs.insert("fp".to_string(), Value::String(fp.clone()));
        kwargs.insert("meta".to_string(), meta_value.clone());

        let submission = match wf.signature.delay(kwargs).await {
            Ok(handle) => {
                debug!(workflow = %wf.name(), id = %handle.id, "task submitted");
                SubmitOutcome::Submitted(handle)
            }
            Err(err) => {
                error!(
                    workflow = %wf.name(),
                    queue = %wf.signature.queue(),
                    error = %err,
                    "unable to send task"
                );
                SubmitOutcome::Failed(err)
            }
        };

        outcomes.push(WorkflowOutcome {
            workflow: wf.name().to_string(),
            copied_to: dest,
            submission,
        });
    }

    debug!(?path, "deleting original file");
    fs.remove_file(path)?;

    Ok(DispatchReport {
        path: path.to_path_buf(),
        meta,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::queue::MemoryBroker;
    use crate::task::{task_fn, ContextParams, QueueApp, TaskContext, TaskFactory};

    fn workflows(fs: &MockFileSystem, app: &Arc<QueueApp>, names: &[&str]) -> Vec<Workflow> {
        names
            .iter()
            .map(|name| {
                let ctx = TaskContext::new_in(fs, *name, "/data", ContextParams::new()).unwrap();
                TaskFactory::new(app.clone(), ctx, task_fn(|_| async { Ok(()) }), None)
                    .workflow()
                    .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn fans_out_in_order_then_deletes() {
        let fs = MockFileSystem::new();
        fs.add_file("/watch/sub/x.txt", b"payload");
        let broker = Arc::new(MemoryBroker::new());
        let app = QueueApp::new("test", broker.clone());
        let wfs = workflows(&fs, &app, &["wf1", "wf2"]);

        let report = dispatch_file(&fs, Path::new("/watch"), Path::new("/watch/sub/x.txt"), &wfs)
            .await
            .unwrap();

        assert_eq!(report.submitted(), 2);
        assert_eq!(fs.contents("/data/working/wf1/in/x.txt").as_deref(), Some(&b"payload"[..]));
        assert_eq!(fs.contents("/data/working/wf2/in/x.txt").as_deref(), Some(&b"payload"[..]));
        assert!(!fs.exists(Path::new("/watch/sub/x.txt")));

        let queues: Vec<_> = broker.published().into_iter().map(|m| m.queue).collect();
        assert_eq!(queues, vec!["wf1", "wf2"]);
        let msg = &broker.published()[0];
        assert_eq!(msg.kwargs["fp"], "/watch/sub/x.txt");
        assert_eq!(msg.kwargs["meta"]["input_dir"], "/watch");
        assert_eq!(msg.kwargs["meta"]["input_subdir"], "sub");
        assert_eq!(msg.kwargs["meta"]["original_filename"], "x.txt");
        assert_eq!(msg.kwargs["context"]["name"], "wf1");
    }

    #[tokio::test]
    async fn copy_failure_aborts_and_keeps_original() {
        let fs = MockFileSystem::new();
        fs.add_file("/watch/x.txt", b"payload");
        let broker = Arc::new(MemoryBroker::new());
        let app = QueueApp::new("test", broker.clone());
        let wfs = workflows(&fs, &app, &["wf1"]);
        fs.remove_dir_all("/data/working/wf1/in");

        let err = dispatch_file(&fs, Path::new("/watch"), Path::new("/watch/x.txt"), &wfs)
            .await
            .unwrap_err();

        assert!(matches!(err, FallaxError::CopyFailed { ref workflow, .. } if workflow == "wf1"));
        assert!(fs.exists(Path::new("/watch/x.txt")));
        assert!(broker.published().is_empty());
    }

    #[tokio::test]
    async fn delete_failure_is_reported_after_fan_out() {
        let fs = MockFileSystem::new();
        fs.add_file("/watch/x.txt", b"payload");
        let broker = Arc::new(MemoryBroker::new());
        let app = QueueApp::new("test", broker.clone());
        let wfs = workflows(&fs, &app, &["wf1"]);
        fs.deny_writes_in("/watch");

        let err = dispatch_file(&fs, Path::new("/watch"), Path::new("/watch/x.txt"), &wfs)
            .await
            .unwrap_err();

        assert!(matches!(err, FallaxError::IoError(_)));
        assert_eq!(broker.published().len(), 1);
    }
}

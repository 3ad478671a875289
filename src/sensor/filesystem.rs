// src/sensor/filesystem.rs

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::sensor::dispatch::{dispatch_file, DispatchReport};
use crate::sensor::event::{FileEvent, FileEventHandler, HandlerFuture};
use crate::sensor::patterns::IgnorePatterns;
use crate::task::Workflow;

/// Handler that turns qualifying file events into dispatches.
///
/// Directory events, paths matching the ignore patterns, and paths that no
/// longer exist (already consumed by an earlier event) are skipped.
#[derive(Debug)]
pub struct EventsToWorkflows {
    input_dir: PathBuf,
    workflows: Vec<Workflow>,
    ignore: IgnorePatterns,
    fs: Arc<dyn FileSystem>,
}

impl EventsToWorkflows {
    pub fn new(input_dir: impl Into<PathBuf>, workflows: Vec<Workflow>) -> Self {
        Self {
            input_dir: input_dir.into(),
            workflows,
            ignore: IgnorePatterns::default(),
            fs: Arc::new(RealFileSystem),
        }
    }

    pub fn with_ignore_patterns(mut self, ignore: IgnorePatterns) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn workflows(&self) -> &[Workflow] {
        &self.workflows
    }

    fn qualifies(&self, path: &Path) -> bool {
        if self.ignore.is_ignored(path) {
            debug!(?path, "ignored by pattern");
            return false;
        }
        if self.fs.is_dir(path) {
            return false;
        }
        if !self.fs.is_file(path) {
            debug!(?path, "file no longer exists; skipping");
            return false;
        }
        true
    }

    /// Dispatch `path` if it qualifies.
    pub async fn handle_path(&self, path: &Path) -> Result<Option<DispatchReport>> {
        if !self.qualifies(path) {
            return Ok(None);
        }
        dispatch_file(self.fs.as_ref(), &self.input_dir, path, &self.workflows)
            .await
            .map(Some)
    }
}

impl FileEventHandler for EventsToWorkflows {
    fn on_file_created<'a>(&'a self, path: &'a Path) -> HandlerFuture<'a> {
        Box::pin(self.handle_path(path))
    }

    fn on_file_moved<'a>(&'a self, _src: &'a Path, dst: &'a Path) -> HandlerFuture<'a> {
        Box::pin(self.handle_path(dst))
    }
}

/// One watched directory feeding one [`EventsToWorkflows`] handler.
///
/// Events are handled one at a time in arrival order: the dispatch of one
/// file (all copies, submissions and the delete) completes before the next
/// event is looked at.
///
/// See [`REPORTS_CLOSE_WRITE`](crate::sensor::event::REPORTS_CLOSE_WRITE) for
/// when a file being written counts as arrived.
#[derive(Debug)]
pub struct FilesystemSensor {
    input_dir: PathBuf,
    recursive: bool,
    handler: EventsToWorkflows,
}

impl FilesystemSensor {
    /// Create a sensor on `input_dir`, creating the directory if needed.
    pub fn new(input_dir: impl Into<PathBuf>, workflows: Vec<Workflow>) -> Result<Self> {
        let input_dir = input_dir.into();
        Self::from_handler(EventsToWorkflows::new(input_dir, workflows))
    }

    /// Create a sensor around a configured handler, watching its input dir.
    pub fn from_handler(handler: EventsToWorkflows) -> Result<Self> {
        let input_dir = handler.input_dir().to_path_buf();
        if !handler.fs.is_dir(&input_dir) {
            handler.fs.create_dir_all(&input_dir)?;
        }
        Ok(Self {
            input_dir,
            recursive: false,
            handler,
        })
    }

    /// Also watch sub-directories of the input dir.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn handler(&self) -> &EventsToWorkflows {
        &self.handler
    }

    /// Watch until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Watch until `shutdown` resolves, then stop the watcher and return.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        // Channel from the blocking notify callback into the async world.
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Err(err) = event_tx.send(res) {
                    // Receiver gone: the run loop has already returned.
                    eprintln!("fallax: failed to forward notify event: {err}");
                }
            },
            Config::default(),
        )?;

        let mode = if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&self.input_dir, mode)?;

        info!(
            dir = ?self.input_dir,
            workflows = self.handler.workflows().len(),
            "start watching"
        );
        if self.handler.workflows().is_empty() {
            warn!(dir = ?self.input_dir, "sensor has no workflow; arriving files will be deleted");
        }

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(dir = ?self.input_dir, "shutdown requested; stop watching");
                    break;
                }
                received = event_rx.recv() => {
                    match received {
                        Some(Ok(event)) => self.process(event).await,
                        Some(Err(err)) => error!(dir = ?self.input_dir, error = %err, "file watch error"),
                        None => break,
                    }
                }
            }
        }

        if let Err(err) = watcher.unwatch(&self.input_dir) {
            debug!(error = %err, "unwatch failed");
        }
        Ok(())
    }

    async fn process(&self, event: Event) {
        debug!(?event, "received notify event");
        for file_event in FileEvent::from_notify(&event) {
            match self.handler.handle_event(&file_event).await {
                Ok(Some(report)) => {
                    let failed = report.failed_submissions();
                    if failed.is_empty() {
                        info!(
                            path = ?report.path,
                            submitted = report.submitted(),
                            "file dispatched"
                        );
                    } else {
                        warn!(
                            path = ?report.path,
                            submitted = report.submitted(),
                            ?failed,
                            "file dispatched with submission failures"
                        );
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    error!(
                        path = ?file_event.final_path(),
                        error = %err,
                        "file dispatch failed"
                    );
                }
            }
        }
    }
}

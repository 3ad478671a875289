// src/sensor/mod.rs

//! File sensors: watch a directory and hand each arrived file to workflows.
//!
//! - [`event`]: `notify` events reduced to [`FileEvent`]s and the
//!   [`FileEventHandler`] callbacks.
//! - [`dispatch`]: the copy / submit / delete rule for one file.
//! - [`filesystem`]: [`EventsToWorkflows`] (filtering + dispatch) and
//!   [`FilesystemSensor`] (one watcher, one blocking run loop).
//! - [`patterns`]: ignore globs such as `*.tmp`.

pub mod dispatch;
pub mod event;
pub mod filesystem;
pub mod path_utils;
pub mod patterns;

pub use dispatch::{dispatch_file, file_meta, DispatchReport, FileMeta, SubmitOutcome, WorkflowOutcome};
pub use event::{FileEvent, FileEventHandler};
pub use filesystem::{EventsToWorkflows, FilesystemSensor};
pub use patterns::{IgnorePatterns, DEFAULT_IGNORE_PATTERNS};

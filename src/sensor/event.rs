// src/sensor/event.rs

//! File events as seen by the dispatch layer, and the handler capability the
//! watcher adapter calls into.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};

use crate::errors::Result;
use crate::sensor::dispatch::DispatchReport;

/// Whether the platform watcher reports a writer closing a file (inotify's
/// `IN_CLOSE_WRITE`).
///
/// When it does, a file is dispatched once its writer closes it, and bare
/// create and data-change events are ignored. Elsewhere files are dispatched
/// on the first create or change, so writers must produce them under an
/// ignored name (`*.tmp`) and rename them into place.
pub const REPORTS_CLOSE_WRITE: bool = cfg!(any(target_os = "linux", target_os = "android"));

/// A filesystem notification reduced to what dispatch cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

impl FileEvent {
    /// Path of the file as it exists after the event: the destination for a
    /// move, the event path otherwise.
    pub fn final_path(&self) -> &Path {
        match self {
            FileEvent::Created(p) | FileEvent::Modified(p) => p,
            FileEvent::Moved { to, .. } => to,
        }
    }

    /// Translate a `notify` event into zero or more file events, using the
    /// platform's [`REPORTS_CLOSE_WRITE`].
    pub fn from_notify(event: &Event) -> Vec<FileEvent> {
        Self::from_notify_with(event, REPORTS_CLOSE_WRITE)
    }

    /// Translate a `notify` event into zero or more file events.
    ///
    /// With `close_aware`, only a writer closing the file counts as a
    /// modification; otherwise creation and data changes do. Directory
    /// creation, removals, metadata and other access events are dropped. A
    /// rename whose source is outside the watch (`RenameMode::To`) counts as a
    /// creation.
    pub fn from_notify_with(event: &Event, close_aware: bool) -> Vec<FileEvent> {
        match &event.kind {
            EventKind::Create(CreateKind::Folder) => Vec::new(),
            EventKind::Create(_) if close_aware => Vec::new(),
            EventKind::Create(_) => event.paths.iter().cloned().map(FileEvent::Created).collect(),
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
                if close_aware =>
            {
                Vec::new()
            }
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                event.paths.iter().cloned().map(FileEvent::Modified).collect()
            }
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                event.paths.iter().cloned().map(FileEvent::Modified).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
                [from, to] => vec![FileEvent::Moved {
                    from: from.clone(),
                    to: to.clone(),
                }],
                _ => Vec::new(),
            },
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                event.paths.iter().cloned().map(FileEvent::Created).collect()
            }
            // Backends that cannot pair rename halves report `Any`; the path
            // may be either side, so treat it like a modification and let the
            // existence check sort it out.
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
                event.paths.iter().cloned().map(FileEvent::Modified).collect()
            }
            _ => Vec::new(),
        }
    }
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<DispatchReport>>> + Send + 'a>>;

/// Callbacks invoked by the watcher adapter.
///
/// Each call resolves to `Ok(None)` when the event was filtered out, or to the
/// report of the dispatch it caused.
pub trait FileEventHandler: Send + Sync {
    fn on_file_created<'a>(&'a self, path: &'a Path) -> HandlerFuture<'a>;

    fn on_file_moved<'a>(&'a self, src: &'a Path, dst: &'a Path) -> HandlerFuture<'a>;

    fn on_file_modified<'a>(&'a self, path: &'a Path) -> HandlerFuture<'a> {
        self.on_file_created(path)
    }

    fn handle_event<'a>(&'a self, event: &'a FileEvent) -> HandlerFuture<'a> {
        match event {
            FileEvent::Created(p) => self.on_file_created(p),
            FileEvent::Modified(p) => self.on_file_modified(p),
            FileEvent::Moved { from, to } => self.on_file_moved(from, to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::DataChange;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut e = Event::new(kind);
        for p in paths {
            e = e.add_path(PathBuf::from(p));
        }
        e
    }

    fn closed_after_write(path: &str) -> Event {
        event(EventKind::Access(AccessKind::Close(AccessMode::Write)), &[path])
    }

    #[test]
    fn file_creation_and_data_changes_qualify_without_close_events() {
        let created = event(EventKind::Create(CreateKind::File), &["/in/a"]);
        let modified = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/in/b"],
        );

        assert_eq!(
            FileEvent::from_notify_with(&created, false),
            vec![FileEvent::Created("/in/a".into())]
        );
        assert_eq!(
            FileEvent::from_notify_with(&modified, false),
            vec![FileEvent::Modified("/in/b".into())]
        );
    }

    #[test]
    fn close_after_write_is_the_only_completion_signal_when_reported() {
        let created = event(EventKind::Create(CreateKind::File), &["/in/a"]);
        let modified = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/in/a"],
        );
        let closed_read = event(EventKind::Access(AccessKind::Close(AccessMode::Read)), &["/in/a"]);

        assert!(FileEvent::from_notify_with(&created, true).is_empty());
        assert!(FileEvent::from_notify_with(&modified, true).is_empty());
        assert!(FileEvent::from_notify_with(&closed_read, true).is_empty());
        assert_eq!(
            FileEvent::from_notify_with(&closed_after_write("/in/a"), true),
            vec![FileEvent::Modified("/in/a".into())]
        );
    }

    #[test]
    fn renames_qualify_either_way() {
        let moved_in = event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/in/a"]);
        for close_aware in [false, true] {
            assert_eq!(
                FileEvent::from_notify_with(&moved_in, close_aware),
                vec![FileEvent::Created("/in/a".into())]
            );
        }
    }

    #[test]
    fn rename_uses_destination_as_final_path() {
        let moved = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/in/x.tmp", "/in/x.txt"],
        );

        let events = FileEvent::from_notify(&moved);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].final_path(), Path::new("/in/x.txt"));
    }

    #[test]
    fn directories_removals_and_rename_sources_are_dropped() {
        for kind in [
            EventKind::Create(CreateKind::Folder),
            EventKind::Remove(notify::event::RemoveKind::File),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            EventKind::Access(AccessKind::Any),
        ] {
            assert!(FileEvent::from_notify_with(&event(kind, &["/in/a"]), false).is_empty());
        }
    }
}

use std::sync::{Arc, Mutex};

use fallax::task::{task_fn, TaskFn, TaskInvocation};

/// A task function that records every invocation it receives.
///
/// Clones share the same record, so keep one handle in the test and give
/// [`RecordingTask::task_fn`] to the factory.
#[derive(Debug, Clone, Default)]
pub struct RecordingTask {
    calls: Arc<Mutex<Vec<TaskInvocation>>>,
    fail: bool,
}

impl RecordingTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder whose function fails after recording.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn task_fn(&self) -> TaskFn {
        let calls = Arc::clone(&self.calls);
        let fail = self.fail;
        task_fn(move |inv| {
            let calls = Arc::clone(&calls);
            async move {
                calls.lock().unwrap().push(inv);
                if fail {
                    anyhow::bail!("recorded task configured to fail");
                }
                Ok(())
            }
        })
    }

    pub fn calls(&self) -> Vec<TaskInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

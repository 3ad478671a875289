#![allow(dead_code, unused_imports)]

use std::path::Path;
use std::sync::Arc;

pub use fallax_test_utils::builders;
pub use fallax_test_utils::recording::RecordingTask;
pub use fallax_test_utils::{init_tracing, wait_until, with_timeout};

use fallax::task::{ContextParams, QueueApp, TaskContext, TaskFactory, TaskFn, Workflow};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// One factory per name, all sharing `base_data_dir`, each bound to `func`.
pub fn factories(
    app: &Arc<QueueApp>,
    base_data_dir: &Path,
    names: &[&str],
    func: &TaskFn,
) -> Vec<TaskFactory> {
    names
        .iter()
        .map(|name| {
            let ctx = TaskContext::new(*name, base_data_dir, ContextParams::new())
                .expect("context creation");
            TaskFactory::new(Arc::clone(app), ctx, Arc::clone(func), None)
        })
        .collect()
}

pub fn workflows(factories: &[TaskFactory]) -> Vec<Workflow> {
    factories
        .iter()
        .map(|f| f.workflow().expect("workflow"))
        .collect()
}

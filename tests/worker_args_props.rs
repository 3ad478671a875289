// tests/worker_args_props.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use tempfile::tempdir;

use fallax::queue::MemoryBroker;
use fallax::task::{task_fn, ContextParams, QueueApp, TaskContext, TaskFactory};
use fallax::types::{WorkerArgs, KEY_AUTOSCALE, KEY_CONCURRENCY, KEY_MAX_MEMORY_PER_CHILD};

fn overrides_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    let key = prop_oneof![
        Just(KEY_CONCURRENCY.to_string()),
        Just(KEY_AUTOSCALE.to_string()),
        Just(KEY_MAX_MEMORY_PER_CHILD.to_string()),
        "[a-z]{3,10}",
    ];
    proptest::collection::btree_map(key, "[0-9]{1,4}", 0..5)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn launch_args_keep_defaults_and_apply_overrides(overrides in overrides_strategy()) {
        let base = tempdir().unwrap();
        let app = QueueApp::new("props", Arc::new(MemoryBroker::new()));
        let ctx = TaskContext::new("wf", base.path(), ContextParams::new()).unwrap();
        let worker: WorkerArgs = overrides.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let factory = TaskFactory::new(app, ctx, task_fn(|_| async { Ok(()) }), Some(worker));

        let args = factory.worker_launch_args();
        let defaults = WorkerArgs::defaults();

        for (key, default) in defaults.iter() {
            match overrides.get(key) {
                Some(v) => prop_assert_eq!(args.get(key), Some(v.as_str())),
                None => prop_assert_eq!(args.get(key), Some(default)),
            }
        }
        for (key, value) in &overrides {
            prop_assert_eq!(args.get(key), Some(value.as_str()));
        }
        let mut keys: Vec<&str> = defaults.iter().map(|(k, _)| k).collect();
        keys.extend(overrides.keys().map(String::as_str));
        keys.sort_unstable();
        keys.dedup();
        prop_assert_eq!(args.iter().map(|(k, _)| k).collect::<Vec<_>>(), keys);
        prop_assert_eq!(factory.queue_name(), "wf");
    }
}

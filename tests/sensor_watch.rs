// tests/sensor_watch.rs

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{factories, init_tracing, wait_until, with_timeout, workflows, RecordingTask, TestResult};
use fallax::queue::MemoryBroker;
use fallax::sensor::FilesystemSensor;
use fallax::task::QueueApp;
use tempfile::tempdir;
use tokio::sync::oneshot;

#[tokio::test]
async fn sensor_dispatches_renamed_files_and_skips_temporaries() -> TestResult {
    init_tracing();
    let root = tempdir()?;
    let watch = root.path().join("incoming");
    let data = tempdir()?;
    let broker = Arc::new(MemoryBroker::new());
    let app = QueueApp::new("watch", broker.clone());
    let facts = factories(&app, data.path(), &["wf1"], &RecordingTask::new().task_fn());

    let sensor = FilesystemSensor::new(&watch, workflows(&facts))?;
    assert!(watch.is_dir(), "sensor creates its input dir");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(async move {
        sensor
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await
    });
    // Let the watcher subscribe before producing events.
    tokio::time::sleep(Duration::from_millis(300)).await;

    fs::write(watch.join("partial.tmp"), b"half")?;
    fs::write(watch.join("x.tmp"), b"complete")?;
    fs::rename(watch.join("x.tmp"), watch.join("x.txt"))?;

    let copy = data.path().join("working/wf1/in/x.txt");
    let original = watch.join("x.txt");
    assert!(wait_until(|| copy.exists() && !original.exists()).await);
    assert_eq!(fs::read(&copy)?, b"complete");

    // Give any trailing events time to be processed.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let _ = stop_tx.send(());
    with_timeout(run).await??;

    assert!(watch.join("partial.tmp").exists());
    assert_eq!(broker.published_to("wf1").len(), 1);
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn sensor_waits_for_a_chunked_writer_to_close_the_file() -> TestResult {
    use std::io::Write;

    init_tracing();
    let root = tempdir()?;
    let watch = root.path().join("incoming");
    let data = tempdir()?;
    let broker = Arc::new(MemoryBroker::new());
    let app = QueueApp::new("watch", broker.clone());
    let facts = factories(&app, data.path(), &["wf1"], &RecordingTask::new().task_fn());

    let sensor = FilesystemSensor::new(&watch, workflows(&facts))?;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(async move {
        sensor
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    let original = watch.join("report.csv");
    let copy = data.path().join("working/wf1/in/report.csv");

    let mut writer = fs::File::create(&original)?;
    writer.write_all(b"header\n")?;
    writer.flush()?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!copy.exists(), "dispatched while the writer still had the file open");
    assert!(original.exists());

    writer.write_all(b"row1\n")?;
    drop(writer);

    assert!(wait_until(|| copy.exists() && !original.exists()).await);
    assert_eq!(fs::read(&copy)?, b"header\nrow1\n");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let _ = stop_tx.send(());
    with_timeout(run).await??;

    assert_eq!(broker.published_to("wf1").len(), 1);
    Ok(())
}

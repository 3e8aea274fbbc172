// The worker pool must behave exactly like calling `detect` directly.
mod common;

use common::*;
use spot_diff::parallel_pipeline::WorkerPool;
use spot_diff::pipeline::DetectionConfig;
use spot_diff::{ErrorKind, detect};

#[tokio::test]
async fn pool_matches_direct_detection() {
    let pool = WorkerPool::with_workers(2);
    let png = square_composite(10, 255);
    let config = DetectionConfig::metadata_only(80, 35);

    let pooled = pool.process(png.clone(), config.clone()).await.unwrap();
    assert_eq!(pooled, detect(&png, &config).unwrap());
    pool.shutdown().await;
}

#[tokio::test]
async fn batch_results_keep_request_order() {
    let pool = WorkerPool::with_workers(3);
    let sizes = [10u32, 8, 12, 9, 20, 4];
    let requests = sizes
        .iter()
        .map(|&size| (square_composite(size, 255), DetectionConfig::metadata_only(80, 35)));

    let results = pool.process_batch(requests).await;
    let counts: Vec<usize> = results.into_iter().map(|r| r.unwrap().difference_count).collect();
    // 8x8 = 64 and 4x4 = 16 fall below the minimum area.
    assert_eq!(counts, vec![1, 0, 1, 1, 1, 0]);
    pool.shutdown().await;
}

#[tokio::test]
async fn failures_stay_with_their_request() {
    let pool = WorkerPool::with_workers(2);
    let config = DetectionConfig::metadata_only(80, 35);
    let results = pool
        .process_batch(vec![
            (square_composite(10, 255), config.clone()),
            (b"garbage".to_vec(), config.clone()),
            (square_composite(10, 255), DetectionConfig::metadata_only(0, 35)),
        ])
        .await;

    assert!(results[0].is_ok());
    assert_eq!(results[1].as_ref().unwrap_err().kind(), ErrorKind::Decode);
    assert_eq!(results[2].as_ref().unwrap_err().kind(), ErrorKind::Validation);
    pool.shutdown().await;
}

#[tokio::test]
async fn zero_workers_still_gets_one() {
    let pool = WorkerPool::with_workers(0);
    assert_eq!(pool.worker_count(), 1);
    let result = pool
        .process(square_composite(10, 255), DetectionConfig::metadata_only(80, 35))
        .await
        .unwrap();
    assert_eq!(result.difference_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_saves_through_the_pool_get_distinct_files() {
    let dir = tempfile::tempdir().unwrap();
    let pool = WorkerPool::with_workers(4);
    let config = DetectionConfig {
        output: spot_diff::OutputMode::saved(dir.path(), "batch"),
        ..DetectionConfig::default()
    };

    let results = pool
        .process_batch((0..4).map(|_| (square_composite(10, 255), config.clone())))
        .await;
    let mut combined: Vec<_> = results
        .into_iter()
        .map(|r| r.unwrap().marked_image.unwrap())
        .map(|image| image.as_path().unwrap().to_path_buf())
        .collect();
    combined.sort();
    combined.dedup();
    assert_eq!(combined.len(), 4);
    assert!(combined.contains(&dir.path().join("batch_combined.png")));
    pool.shutdown().await;
}

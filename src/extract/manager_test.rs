use super::*;
use crate::config::PipelineConfigBuilder;
use crate::extract::DecodeError;
use crate::metrics::PipelineMetrics;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

const SCENARIO_LINE: &str = r#"{"spins":10,"server_time":"2025-05-24 00:00:01.99999 UTC"}"#;

fn valid_line(i: usize) -> String {
    format!(
        r#"{{"spins":{},"time":"2025-01-01 00:00:00 UTC","server_time":"2025-05-24 00:00:{:02}.{:05} UTC"}}"#,
        i % 100,
        i % 60,
        i
    )
}

fn write_input(dir: &Path, lines: &[String]) -> PathBuf {
    let path = dir.join("input.jsonl");
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(&path, content).unwrap();
    path
}

fn config(
    input: &Path,
    dir: &Path,
    num_workers: usize,
    lines_per_file: usize,
    channel_size: usize,
) -> PipelineConfig {
    PipelineConfigBuilder::default()
        .input_file_name(input)
        .output_file_name(dir.join("output-%d.csv").to_string_lossy().into_owned())
        .num_workers(num_workers)
        .lines_per_file(lines_per_file)
        .lines_channel_size(channel_size)
        .results_channel_size(channel_size)
        .build()
        .unwrap()
}

fn read_rows(shards: &[PathBuf]) -> Vec<String> {
    shards
        .iter()
        .flat_map(|path| {
            fs::read_to_string(path)
                .unwrap()
                .lines()
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .collect()
}

// Multiset of rows: order across workers is not guaranteed.
fn row_counts(rows: Vec<String>) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for row in rows {
        *counts.entry(row).or_insert(0) += 1;
    }
    counts
}

async fn run(config: PipelineConfig) -> Result<ExtractionReport, ExtractError> {
    let manager = ExtractionManager::new(config).unwrap();
    manager.run(&CancellationToken::new()).await
}

#[tokio::test]
async fn test_single_record_single_shard() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), &[SCENARIO_LINE.to_string()]);

    let report = run(config(&input, dir.path(), 1, 1, 1)).await.unwrap();

    assert_eq!(report.shards, vec![dir.path().join("output-0.csv")]);
    let content = fs::read_to_string(&report.shards[0]).unwrap();
    assert_eq!(content, "10,2025-05-24 00:00:01.99999 UTC\n");
    assert!(!dir.path().join("output-1.csv").exists());
}

#[tokio::test]
async fn test_malformed_line_is_skipped() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), &[SCENARIO_LINE.to_string(), "not json".to_string()]);

    let report = run(config(&input, dir.path(), 2, 10, 4)).await.unwrap();

    assert_eq!(report.stats.successful_lines, 1);
    assert_eq!(report.stats.failed_lines, 1);
    assert_eq!(report.rows_written, 1);
    assert_eq!(read_rows(&report.shards).len(), 1);
}

#[tokio::test]
async fn test_invalid_utf8_line_is_skipped() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.jsonl");
    let mut content = Vec::new();
    content.extend_from_slice(valid_line(1).as_bytes());
    content.extend_from_slice(b"\n{\"spins\":1,\"server_time\":\"\xff\"}\n");
    content.extend_from_slice(valid_line(2).as_bytes());
    content.push(b'\n');
    fs::write(&input, content).unwrap();

    let report = run(config(&input, dir.path(), 1, 10, 1)).await.unwrap();

    assert_eq!(report.stats.lines_read, 3);
    assert_eq!(report.stats.successful_lines, 2);
    assert_eq!(report.stats.failed_lines, 1);
    assert_eq!(read_rows(&report.shards).len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rotation_produces_capped_shards() {
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = (0..250).map(valid_line).collect();
    let input = write_input(dir.path(), &lines);

    let report = run(config(&input, dir.path(), 4, 100, 16)).await.unwrap();

    let counts: Vec<usize> = report
        .shards
        .iter()
        .map(|p| fs::read_to_string(p).unwrap().lines().count())
        .collect();
    assert_eq!(counts, vec![100, 100, 50]);
    assert_eq!(report.rows_written, 250);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_line_accounting_with_mixed_input() {
    let dir = TempDir::new().unwrap();
    let mut lines = Vec::new();
    for i in 0..300 {
        lines.push(match i % 5 {
            0 => "not json".to_string(),
            1 => r#"{"spins": 1}"#.to_string(),
            2 => r#"{"spins": "1", "server_time": "t"}"#.to_string(),
            3 => String::new(),
            _ => valid_line(i),
        });
    }
    let input = write_input(dir.path(), &lines);

    let report = run(config(&input, dir.path(), 3, 7, 2)).await.unwrap();

    assert_eq!(report.stats.lines_read, 300);
    assert_eq!(report.stats.processed(), 300);
    assert_eq!(report.stats.successful_lines, 60);
    assert_eq!(report.stats.failed_lines, 240);

    // Every shard but the last is full.
    let counts: Vec<usize> = report
        .shards
        .iter()
        .map(|p| fs::read_to_string(p).unwrap().lines().count())
        .collect();
    let (last, full) = counts.split_last().unwrap();
    assert!(full.iter().all(|&c| c == 7));
    assert!((1..=7).contains(last));
    assert_eq!(counts.iter().sum::<usize>(), 60);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_worker_count_does_not_change_rows() {
    let lines: Vec<String> = (0..2000).map(valid_line).collect();

    let single_dir = TempDir::new().unwrap();
    let input = write_input(single_dir.path(), &lines);
    let single = run(config(&input, single_dir.path(), 1, 333, 8)).await.unwrap();

    let multi_dir = TempDir::new().unwrap();
    let input = write_input(multi_dir.path(), &lines);
    let multi = run(config(&input, multi_dir.path(), 8, 333, 8)).await.unwrap();

    assert_eq!(single.stats, multi.stats);
    assert_eq!(
        row_counts(read_rows(&single.shards)),
        row_counts(read_rows(&multi.shards))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unit_capacity_queues_do_not_deadlock() {
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = (0..1000).map(valid_line).collect();
    let input = write_input(dir.path(), &lines);

    let report = timeout(
        Duration::from_secs(30),
        run(config(&input, dir.path(), 4, 100, 1)),
    )
    .await
    .expect("pipeline deadlocked")
    .unwrap();

    assert_eq!(report.stats.processed(), 1000);
    assert_eq!(report.stats.successful_lines, 1000);
    assert_eq!(report.shards.len(), 10);
}

#[tokio::test]
async fn test_empty_input_writes_no_shards() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("empty.jsonl");
    fs::write(&input, "").unwrap();

    let report = run(config(&input, dir.path(), 2, 10, 4)).await.unwrap();

    assert_eq!(report.stats, Default::default());
    assert!(report.shards.is_empty());
    assert!(!dir.path().join("output-0.csv").exists());
}

#[tokio::test]
async fn test_missing_input_is_fatal() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("missing.jsonl");

    let err = run(config(&input, dir.path(), 1, 10, 4)).await.unwrap_err();

    assert!(matches!(err, ExtractError::InputOpen { .. }));
    assert!(!dir.path().join("output-0.csv").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_write_failure_aborts_run() {
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = (0..500).map(valid_line).collect();
    let input = write_input(dir.path(), &lines);

    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"file, not a directory").unwrap();
    let config = PipelineConfigBuilder::default()
        .input_file_name(input)
        .output_file_name(blocker.join("output-%d.csv").to_string_lossy().into_owned())
        .num_workers(4usize)
        .lines_per_file(10usize)
        .lines_channel_size(1usize)
        .results_channel_size(1usize)
        .build()
        .unwrap();

    let metrics = PipelineMetrics::new();
    let manager = ExtractionManager::new(config)
        .unwrap()
        .with_metrics(Arc::new(metrics.clone()));

    let err = timeout(
        Duration::from_secs(30),
        manager.run(&CancellationToken::new()),
    )
    .await
    .expect("pipeline hung after write failure")
    .unwrap_err();

    assert!(matches!(err, ExtractError::Write { .. }));
    assert_eq!(metrics.error_count("write"), 1);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = (0..100).map(valid_line).collect();
    let input = write_input(dir.path(), &lines);

    let manager = ExtractionManager::new(config(&input, dir.path(), 2, 10, 1)).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = manager.run(&cancel).await.unwrap_err();
    assert!(matches!(err, ExtractError::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancellation_mid_run_does_not_hang() {
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = (0..50_000).map(valid_line).collect();
    let input = write_input(dir.path(), &lines);

    let manager = ExtractionManager::new(config(&input, dir.path(), 4, 1000, 1)).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        trigger.cancel();
    });

    let result = timeout(Duration::from_secs(30), manager.run(&cancel))
        .await
        .expect("pipeline hung after cancellation");

    // A fast machine may finish before the cancel lands.
    match result {
        Ok(report) => assert_eq!(report.stats.processed(), 50_000),
        Err(err) => assert!(matches!(err, ExtractError::Cancelled)),
    }
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = config(Path::new("in.jsonl"), dir.path(), 1, 10, 1);
    config.output_file_name = "no-placeholder.csv".to_string();

    assert!(matches!(
        ExtractionManager::new(config),
        Err(ConfigError::InvalidTemplate { .. })
    ));
}

#[tokio::test]
async fn test_metrics_are_reported() {
    let dir = TempDir::new().unwrap();
    let input = write_input(
        dir.path(),
        &[SCENARIO_LINE.to_string(), "not json".to_string(), valid_line(1)],
    );

    let metrics = PipelineMetrics::new();
    let manager = ExtractionManager::new(config(&input, dir.path(), 2, 10, 2))
        .unwrap()
        .with_metrics(Arc::new(metrics.clone()));
    manager.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(metrics.error_count("decode"), 1);
    assert_eq!(metrics.duration_count("decode"), 3);
    assert_eq!(metrics.duration_count("extract"), 1);
    assert_eq!(metrics.active_workers(), 0);
    assert_eq!(metrics.channel_capacity("lines"), Some(2));
}

#[tokio::test]
async fn test_custom_decoder() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), &["a=1".to_string(), "b".to_string()]);

    let decoder = |line: &str| -> Result<ProjectedRow, DecodeError> {
        match line.split_once('=') {
            Some((key, value)) => Ok(ProjectedRow {
                spins: value.to_string(),
                server_time: key.to_string(),
            }),
            None => Err(DecodeError::NotAnObject),
        }
    };
    let manager = ExtractionManager::new(config(&input, dir.path(), 1, 10, 1))
        .unwrap()
        .with_decoder(decoder);
    let report = manager.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.stats.failed_lines, 1);
    assert_eq!(read_rows(&report.shards), vec!["1,a"]);
}

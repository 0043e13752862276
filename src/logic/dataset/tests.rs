use chrono::Utc;
use tempfile::tempdir;
use uuid::Uuid;

use super::{DatasetError, HistoryWriter, PromotionRecord, ReplaySource, ValidationSet};
use crate::constants::{FLOATS_PER_NOTIFICATION, SAMPLE_LEN};
use crate::logic::model::Metrics;
use crate::logic::signal::{Sample, SignalAssembler};

fn sample(id: usize, label: i32) -> Sample {
    let data = (0..SAMPLE_LEN).map(|i| (id * 10 + i % 7) as f32).collect();
    Sample::new(data, label).unwrap()
}

fn header(count: i32, dim1: i32, dim2: i32, labels: i32) -> Vec<u8> {
    [count, dim1, dim2, labels]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

#[test]
fn test_blob_with_labels() {
    let set = ValidationSet::from_samples(vec![sample(1, 0), sample(2, 1), sample(3, 1)]);
    let parsed = ValidationSet::from_bytes(&set.to_bytes()).unwrap();

    assert_eq!(parsed.len(), 3);
    assert_eq!(parsed.labeled_count(), 3);
    assert_eq!(parsed.samples()[1].label(), 1);
    assert_eq!(parsed.samples()[2].data(), set.samples()[2].data());
}

#[test]
fn test_blob_without_labels() {
    let mut bytes = header(2, 18, 1024, 0);
    for _ in 0..2 * SAMPLE_LEN {
        bytes.extend_from_slice(&0.25f32.to_le_bytes());
    }

    let parsed = ValidationSet::from_bytes(&bytes).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed.labeled_count(), 0);
    assert!(parsed.samples().iter().all(|s| s.label() == Sample::UNLABELED));
}

#[test]
fn test_blob_rejects_bad_header() {
    assert!(matches!(
        ValidationSet::from_bytes(&[0u8; 8]),
        Err(DatasetError::Truncated { section: "header", .. })
    ));
    assert!(matches!(
        ValidationSet::from_bytes(&header(1, 18, 512, 1)),
        Err(DatasetError::InvalidHeader(_))
    ));
    assert!(matches!(
        ValidationSet::from_bytes(&header(-1, 18, 1024, 1)),
        Err(DatasetError::InvalidHeader(_))
    ));
}

#[test]
fn test_blob_rejects_truncated_labels() {
    let mut bytes = ValidationSet::from_samples(vec![sample(1, 0), sample(2, 1)]).to_bytes();
    bytes.truncate(bytes.len() - 2);

    match ValidationSet::from_bytes(&bytes) {
        Err(DatasetError::Truncated { section, expected, actual }) => {
            assert_eq!(section, "labels");
            assert_eq!(expected, 8);
            assert_eq!(actual, 6);
        }
        other => panic!("unexpected: {:?}", other.map(|s| s.len())),
    }
}

#[test]
fn test_load_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("validation.bin");
    std::fs::write(&path, ValidationSet::from_samples(vec![sample(4, 1)]).to_bytes()).unwrap();

    let set = ValidationSet::load(&path).unwrap();
    assert_eq!(set.len(), 1);
    assert!(ValidationSet::load(&dir.path().join("missing.bin")).is_err());
}

#[test]
fn test_replay_reassembles_samples() {
    let set = ValidationSet::from_samples(vec![sample(1, 1), sample(2, 0)]);
    let source = ReplaySource::new(set.clone());
    assert_eq!(source.packets(0).len(), SAMPLE_LEN / FLOATS_PER_NOTIFICATION);
    assert!(source.packets(0).iter().all(|p| p.len() == FLOATS_PER_NOTIFICATION * 4));

    let mut assembler = SignalAssembler::new();
    let emitted: Vec<Sample> = source
        .notifications()
        .filter_map(|payload| assembler.on_notification(&payload))
        .collect();

    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[0].data(), set.samples()[0].data());
    assert_eq!(emitted[1].data(), set.samples()[1].data());
    assert_eq!(emitted[0].label(), Sample::UNLABELED);
}

#[test]
fn test_history_append_and_read() {
    let dir = tempdir().unwrap();
    let writer = HistoryWriter::new(dir.path()).unwrap();
    assert!(writer.read_all().unwrap().is_empty());

    let record = PromotionRecord {
        cycle_id: Uuid::new_v4(),
        timestamp: Utc::now(),
        samples: 100,
        epochs: 20,
        current: Metrics::default(),
        candidate: Metrics { f1: 0.5, ..Metrics::default() },
        promoted: true,
        generation: 1,
        artifact_sha256: Some("ab".repeat(32)),
    };

    writer.append(&record).unwrap();
    writer.append(&PromotionRecord { promoted: false, ..record.clone() }).unwrap();

    let records = writer.read_all().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0], record);
    assert!(!records[1].promoted);
}

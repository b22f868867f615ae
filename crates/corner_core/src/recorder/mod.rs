//! # Assessment Recorder
//!
//! 런 하나당 append-only 기록 하나. `observe`는 실패하지 않는다:
//! 버퍼가 가득 차면 가장 오래된 항목을 FIFO로 밀어내고 경고를 돌려준다.
//!
//! ## Export
//! - JSON: `serde_json` 스트리밍 (lease에 직접 기록)
//! - Compact: MessagePack → LZ4 → SHA-256 trailer

pub mod destination;
pub mod summary;
pub mod types;

pub use destination::{
    DestinationLease, FileDestination, MemoryDestination, RecordDestination, RecordFormat,
};
pub use summary::{InstanceSummary, Verdict};
pub use types::{AssessmentEvent, AssessmentRecord, RecordEntry, RECORD_SCHEMA_VERSION};

use std::io::Write;
use tracing::{debug, warn};

use crate::error::RecorderError;
use crate::trigger::InstanceId;

/// Raised by `observe` when the buffer was full and an old entry was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderOverflowWarning {
    /// Total entries evicted so far in this run
    pub evicted: u64,
    pub capacity: usize,
}

#[derive(Debug, Clone)]
pub struct AssessmentRecorder {
    record: AssessmentRecord,
    capacity: usize,
    next_seq: u64,
    last_time: f64,
}

impl AssessmentRecorder {
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            record: AssessmentRecord::new(seed),
            capacity: capacity.max(1),
            next_seq: 0,
            last_time: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append one entry. Timestamps never go backwards: an earlier `sim_time`
    /// is clamped to the latest one seen.
    pub fn observe(
        &mut self,
        sim_time: f64,
        frame: u64,
        instance: Option<InstanceId>,
        event: AssessmentEvent,
    ) -> Option<RecorderOverflowWarning> {
        let sim_time = if sim_time.is_finite() && sim_time >= self.last_time {
            sim_time
        } else {
            debug!("Clamping out-of-order timestamp {} to {}", sim_time, self.last_time);
            self.last_time
        };
        self.last_time = sim_time;

        let mut warning = None;
        if self.record.entries.len() >= self.capacity {
            self.record.entries.pop_front();
            self.record.evicted += 1;
            warning = Some(RecorderOverflowWarning { evicted: self.record.evicted, capacity: self.capacity });
            // first eviction and then every full buffer's worth
            if self.record.evicted == 1 || self.record.evicted % self.capacity as u64 == 0 {
                warn!(evicted = self.record.evicted, capacity = self.capacity, "Assessment buffer full, evicting oldest entries");
            }
        }

        self.record.entries.push_back(RecordEntry { seq: self.next_seq, sim_time, frame, instance, event });
        self.next_seq += 1;
        warning
    }

    pub fn record(&self) -> &AssessmentRecord {
        &self.record
    }

    pub fn into_record(self) -> AssessmentRecord {
        self.record
    }

    /// Export the current record. The destination lease is released on every
    /// path; nothing becomes visible unless the whole payload was written.
    pub fn flush(
        &self,
        dest: &mut dyn RecordDestination,
        format: RecordFormat,
    ) -> Result<usize, RecorderError> {
        log::debug!("Flushing {} entries to {} as {:?}", self.record.len(), dest.describe(), format);

        let mut lease = dest.acquire()?;
        match format {
            RecordFormat::Json => {
                serde_json::to_writer_pretty(&mut lease, &self.record)?;
            }
            RecordFormat::Compact => {
                let bytes = self.record.to_compact()?;
                lease.write_all(&bytes)?;
            }
        }
        lease.flush()?;
        lease.commit()?;

        log::info!("Flushed {} assessment entries", self.record.len());
        Ok(self.record.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fired(id: u16) -> AssessmentEvent {
        AssessmentEvent::TriggerFired { corner_case: crate::catalog::CornerCaseId(id), diagnostic: None }
    }

    #[test]
    fn test_overflow_evicts_fifo() {
        let mut recorder = AssessmentRecorder::new(3, 0);
        assert!(recorder.observe(0.0, 0, None, AssessmentEvent::RunStopped).is_none());
        recorder.observe(0.1, 2, None, fired(1));
        recorder.observe(0.2, 4, None, fired(2));

        let warning = recorder.observe(0.3, 6, None, fired(3)).unwrap();
        assert_eq!(warning, RecorderOverflowWarning { evicted: 1, capacity: 3 });

        let record = recorder.record();
        assert_eq!(record.len(), 3);
        assert_eq!(record.evicted, 1);
        assert_eq!(record.entries.front().unwrap().seq, 1);
        assert_eq!(record.entries.back().unwrap().seq, 3);
    }

    #[test]
    fn test_out_of_order_time_is_clamped() {
        let mut recorder = AssessmentRecorder::new(16, 0);
        recorder.observe(5.0, 100, None, fired(1));
        recorder.observe(4.0, 80, None, fired(2));
        recorder.observe(f64::NAN, 81, None, fired(3));

        let times: Vec<f64> = recorder.record().entries.iter().map(|e| e.sim_time).collect();
        assert_eq!(times, vec![5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_flush_json_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");
        let mut recorder = AssessmentRecorder::new(16, 9);
        recorder.observe(1.0, 20, Some(InstanceId(1)), fired(1));

        let mut dest = FileDestination::new(&path);
        assert_eq!(recorder.flush(&mut dest, RecordFormat::Json).unwrap(), 1);

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: AssessmentRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(&parsed, recorder.record());
    }

    #[test]
    fn test_flush_compact_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.bin");
        let mut recorder = AssessmentRecorder::new(16, 9);
        recorder.observe(1.0, 20, Some(InstanceId(2)), fired(4));

        let mut dest = FileDestination::new(&path);
        recorder.flush(&mut dest, RecordFormat::Compact).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&AssessmentRecord::from_compact(&bytes).unwrap(), recorder.record());
    }

    #[test]
    fn test_partial_write_is_discarded() {
        let mut recorder = AssessmentRecorder::new(64, 0);
        for i in 0..20 {
            recorder.observe(i as f64, i, None, fired(1));
        }

        let mut dest = MemoryDestination::failing_after(64);
        let result = recorder.flush(&mut dest, RecordFormat::Json);
        assert!(matches!(result, Err(RecorderError::Json(_)) | Err(RecorderError::Io(_))));
        assert!(dest.committed().is_none());
        assert_eq!(dest.open_leases(), 0);

        // a later successful flush still works against the same destination
        let mut dest = MemoryDestination::new();
        recorder.flush(&mut dest, RecordFormat::Json).unwrap();
        assert_eq!(dest.commits(), 1);
        assert_eq!(dest.open_leases(), 0);
    }

    #[test]
    fn test_partial_file_write_leaves_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");
        std::fs::write(&path, b"old").unwrap();

        // a directory in place of the temp file makes acquire fail
        std::fs::create_dir(path.with_extension("tmp")).unwrap();
        let recorder = AssessmentRecorder::new(4, 0);
        let mut dest = FileDestination::new(&path);
        assert!(matches!(recorder.flush(&mut dest, RecordFormat::Json), Err(RecorderError::Io(_))));
        assert_eq!(std::fs::read(&path).unwrap(), b"old");
    }

    proptest! {
        #[test]
        fn prop_entries_monotonic(times in proptest::collection::vec(-10.0f64..100.0, 1..60), cap in 1usize..32) {
            let mut recorder = AssessmentRecorder::new(cap, 0);
            for (i, t) in times.iter().enumerate() {
                recorder.observe(*t, i as u64, None, AssessmentEvent::RunStopped);
            }
            let record = recorder.record();
            prop_assert!(record.len() <= cap);
            prop_assert_eq!(record.len() as u64 + record.evicted, times.len() as u64);
            for pair in record.entries.iter().collect::<Vec<_>>().windows(2) {
                prop_assert!(pair[0].sim_time <= pair[1].sim_time);
                prop_assert!(pair[0].seq < pair[1].seq);
            }
        }
    }
}

//! Assessment record data model and export framing

use chrono::{DateTime, Utc};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use rmp_serde::{from_slice, to_vec_named};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::catalog::CornerCaseId;
use crate::environment::{TimeOfDay, WeatherPreset};
use crate::error::RecorderError;
use crate::sut::ControlSample;
use crate::trigger::{AbortReason, InstanceId, ResolutionCause};
use crate::world::ActorId;

/// Bumped whenever the record layout changes
pub const RECORD_SCHEMA_VERSION: u32 = 1;

const CHECKSUM_LEN: usize = 32;

/// One observable thing that happened during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssessmentEvent {
    RunStarted { weather: WeatherPreset, time_of_day: TimeOfDay, traffic_density: f64, instances: usize },
    Armed { corner_case: CornerCaseId, slug: String },
    TriggerFired { corner_case: CornerCaseId, diagnostic: Option<String> },
    /// Trigger latched but another instance holds the slot
    Deferred { blocking: InstanceId },
    SpawnFailed { attempt: u32, reason: String },
    ActorSpawned { actor: ActorId, role: String, blueprint: String },
    Activated { actors: Vec<ActorId> },
    Collision { actor: ActorId, intensity: f64 },
    ControlSample(ControlSample),
    Resolved { cause: ResolutionCause, actors: Vec<ActorId> },
    ActorSpawnTimeout { attempts: u32 },
    Aborted { reason: AbortReason },
    RunStopped,
    RunCompleted { resolved: usize, aborted: usize },
}

impl AssessmentEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AssessmentEvent::RunStarted { .. } => "run_started",
            AssessmentEvent::Armed { .. } => "armed",
            AssessmentEvent::TriggerFired { .. } => "trigger_fired",
            AssessmentEvent::Deferred { .. } => "deferred",
            AssessmentEvent::SpawnFailed { .. } => "spawn_failed",
            AssessmentEvent::ActorSpawned { .. } => "actor_spawned",
            AssessmentEvent::Activated { .. } => "activated",
            AssessmentEvent::Collision { .. } => "collision",
            AssessmentEvent::ControlSample(_) => "control_sample",
            AssessmentEvent::Resolved { .. } => "resolved",
            AssessmentEvent::ActorSpawnTimeout { .. } => "actor_spawn_timeout",
            AssessmentEvent::Aborted { .. } => "aborted",
            AssessmentEvent::RunStopped => "run_stopped",
            AssessmentEvent::RunCompleted { .. } => "run_completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub seq: u64,
    pub sim_time: f64,
    pub frame: u64,
    pub instance: Option<InstanceId>,
    pub event: AssessmentEvent,
}

/// Append-only record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub seed: u64,
    pub entries: VecDeque<RecordEntry>,
    /// Entries dropped from the front after the buffer filled up
    pub evicted: u64,
}

impl AssessmentRecord {
    pub fn new(seed: u64) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            seed,
            entries: VecDeque::new(),
            evicted: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries_for(&self, instance: InstanceId) -> impl Iterator<Item = &RecordEntry> {
        self.entries.iter().filter(move |e| e.instance == Some(instance))
    }

    pub fn count(&self, kind: &str) -> usize {
        self.entries.iter().filter(|e| e.event.kind() == kind).count()
    }

    /// SHA-256 over the ordered event stream. Run id and wall-clock time are
    /// left out so identical runs hash identically.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(self.evicted.to_le_bytes());
        for entry in &self.entries {
            // entries only hold plain data; encoding cannot fail
            if let Ok(bytes) = serde_json::to_vec(entry) {
                hasher.update(&bytes);
            }
        }
        hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn to_json_pretty(&self) -> Result<String, RecorderError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// MessagePack → LZ4 → SHA-256 trailer
    pub fn to_compact(&self) -> Result<Vec<u8>, RecorderError> {
        let msgpack = to_vec_named(self)?;
        let mut out = compress_prepend_size(&msgpack);

        let checksum = Sha256::digest(&out);
        out.extend_from_slice(&checksum);
        Ok(out)
    }

    pub fn from_compact(bytes: &[u8]) -> Result<Self, RecorderError> {
        if bytes.len() < 4 + CHECKSUM_LEN {
            return Err(RecorderError::Corrupted);
        }

        let (payload, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if Sha256::digest(payload).as_slice() != checksum {
            return Err(RecorderError::ChecksumMismatch);
        }

        let msgpack = decompress_size_prepended(payload).map_err(|_| RecorderError::Decompression)?;
        let record: AssessmentRecord = from_slice(&msgpack)?;
        if record.schema_version > RECORD_SCHEMA_VERSION {
            return Err(RecorderError::VersionMismatch {
                found: record.schema_version,
                expected: RECORD_SCHEMA_VERSION,
            });
        }
        Ok(record)
    }
}

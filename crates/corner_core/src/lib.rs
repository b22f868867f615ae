//! # corner_core - Deterministic Corner-Case Scenario Engine
//!
//! 주행 시뮬레이터 위에서 희귀한 "코너 케이스" 교통 상황을 결정적으로
//! 발생시키고, 자율주행 제어 모델의 반응을 평가 기록으로 남기는 엔진.
//!
//! ## Features
//! - 32 built-in corner cases across three taxonomy categories
//! - Per-tick trigger evaluation as pure functions over a world snapshot
//! - Bounded spawn retry, all-or-nothing actor activation
//! - Append-only assessment record with JSON / compact (MessagePack + LZ4) export
//! - Same seed + same run plan = identical event stream
//!
//! ## 사용법
//! ```rust
//! use corner_core::{Catalog, EngineConfig, KinematicSimulator, RunConfiguration, RunEntry, ScenarioRunOrchestrator};
//! use corner_core::geometry::loc;
//! use corner_core::trigger::Condition;
//!
//! let p = loc(100.0, 0.0, 0.0);
//! let plan = RunConfiguration::new(1, 1, 1.0).with_entry(RunEntry::new(
//!     "stop-sign-occluded",
//!     p,
//!     Condition::EgoWithinRadius { point: p, radius: 30.0 },
//!     Condition::EgoPassedPoint { point: p },
//! ));
//!
//! let sim = KinematicSimulator::new(0.05).with_ego(loc(0.0, 0.0, 0.0), 0.0, 10.0);
//! let catalog = Catalog::builtin().unwrap();
//! let mut run = ScenarioRunOrchestrator::new(sim, catalog, EngineConfig::default());
//! run.start(plan).unwrap();
//! let record = run.run_to_completion().unwrap();
//! assert_eq!(record.count("resolved"), 1);
//! ```

#![allow(clippy::too_many_arguments)]

pub mod batch;
pub mod catalog;
pub mod choreography;
pub mod config;
pub mod environment;
pub mod error;
pub mod geometry;
pub mod recorder;
pub mod run;
pub mod simulator;
pub mod sut;
pub mod trigger;
pub mod world;

pub use batch::{run_batch, BatchJob, BatchOutcome};
pub use catalog::{Catalog, CornerCaseDefinition, CornerCaseId, TaxonomyCategory};
pub use config::EngineConfig;
pub use environment::{EnvironmentController, TimeOfDay, WeatherPreset};
pub use error::{CatalogError, ChoreographyError, EnvironmentError, RecorderError, RunError, SimulatorError};
pub use recorder::{AssessmentEvent, AssessmentRecord, AssessmentRecorder, FileDestination, RecordFormat};
pub use run::{RunConfiguration, RunEntry, RunPhase, ScenarioRunOrchestrator, Sequencing};
pub use simulator::{KinematicSimulator, Simulator};
pub use sut::{ControlModel, ControlSample};
pub use trigger::{Condition, InstanceId, InstanceState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Parallel independent runs (dataset generation)
//!
//! 각 런은 자기 시뮬레이터(팩토리로 생성)와 카탈로그 복제본을 소유한다.
//! 런 사이에 공유되는 가변 상태는 없다.

use rayon::prelude::*;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::RunError;
use crate::recorder::AssessmentRecord;
use crate::run::{RunConfiguration, ScenarioRunOrchestrator};
use crate::simulator::Simulator;

/// One labelled run of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchJob {
    pub label: String,
    pub run: RunConfiguration,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub label: String,
    pub result: Result<AssessmentRecord, RunError>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Execute every job to completion, in parallel. Outcomes come back in job
/// order; one failing run does not affect the others.
pub fn run_batch<S, F>(jobs: &[BatchJob], catalog: &Catalog, config: &EngineConfig, factory: F) -> Vec<BatchOutcome>
where
    S: Simulator,
    F: Fn(&BatchJob) -> S + Sync,
{
    info!(jobs = jobs.len(), "batch started");
    let outcomes: Vec<BatchOutcome> = jobs
        .par_iter()
        .map(|job| {
            let sim = factory(job);
            let mut orchestrator = ScenarioRunOrchestrator::new(sim, catalog.clone(), config.clone());
            let result = orchestrator
                .start(job.run.clone())
                .and_then(|()| orchestrator.run_to_completion().map(|_| ()))
                .map(|()| orchestrator.into_record());
            if let Err(err) = &result {
                warn!(label = %job.label, error = %err, "batch run failed");
            }
            BatchOutcome { label: job.label.clone(), result }
        })
        .collect();

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    info!(jobs = outcomes.len(), failed, "batch finished");
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::sweep;
    use crate::geometry::loc;
    use crate::run::RunEntry;
    use crate::simulator::KinematicSimulator;
    use crate::trigger::Condition;

    fn base() -> RunConfiguration {
        let p = loc(60.0, 0.0, 0.0);
        RunConfiguration::new(5, 1, 1.0).with_entry(RunEntry::new(
            "unpredictable-bicycle",
            p,
            Condition::EgoWithinRadius { point: p, radius: 20.0 },
            Condition::SinceActivationAtLeast(2.0),
        ))
    }

    fn factory(_: &BatchJob) -> KinematicSimulator {
        KinematicSimulator::new(0.05).with_ego(loc(0.0, 0.0, 0.0), 0.0, 12.0)
    }

    #[test]
    fn test_batch_runs_are_independent_and_repeatable() {
        let jobs: Vec<BatchJob> = sweep(&base()).into_iter().take(6).collect();
        let catalog = Catalog::builtin().unwrap();
        let config = EngineConfig::deterministic();

        let first = run_batch(&jobs, &catalog, &config, factory);
        let second = run_batch(&jobs, &catalog, &config, factory);

        assert_eq!(first.len(), 6);
        for (job, (a, b)) in jobs.iter().zip(first.iter().zip(second.iter())) {
            assert_eq!(a.label, job.label);
            let (ra, rb) = (a.result.as_ref().unwrap(), b.result.as_ref().unwrap());
            assert_eq!(ra.count("resolved"), 1);
            assert_eq!(ra.digest(), rb.digest());
        }
    }

    #[test]
    fn test_failed_run_does_not_stop_batch() {
        let mut bad = base();
        bad.weather_preset = 12;
        let jobs = vec![
            BatchJob { label: "ok".into(), run: base() },
            BatchJob { label: "bad".into(), run: bad },
        ];
        let outcomes = run_batch(&jobs, &Catalog::builtin().unwrap(), &EngineConfig::deterministic(), factory);
        assert!(outcomes[0].is_ok());
        assert!(matches!(outcomes[1].result, Err(ref e) if e.is_validation()));
    }
}

use anyhow::Context;
use corner_core::catalog::Catalog;
use corner_core::geometry::loc;
use corner_core::recorder::{FileDestination, Verdict};
use corner_core::sut::CautiousBrakeModel;
use corner_core::trigger::Condition;
use corner_core::{EngineConfig, KinematicSimulator, RunConfiguration, RunEntry, ScenarioRunOrchestrator, TaxonomyCategory};

fn main() -> anyhow::Result<()> {
    println!("🚗 corner_core {} demo run", corner_core::VERSION);

    let catalog = Catalog::builtin().context("built-in catalog failed validation")?;
    for category in TaxonomyCategory::ALL {
        println!("  {:<9} {} corner cases", category.to_string(), catalog.list_by_category(category).count());
    }

    // three corner cases along a straight road, 150m apart
    let mut plan = RunConfiguration::new(2024, 7, 2.0);
    for (i, slug) in ["stop-sign-occluded", "unpredictable-pedestrian", "ball-boy"].iter().enumerate() {
        let anchor = loc(150.0 * (i + 1) as f64, 0.0, 0.0);
        plan = plan.with_entry(RunEntry::new(
            *slug,
            anchor,
            Condition::EgoWithinRadius { point: anchor, radius: 30.0 },
            Condition::Any(vec![Condition::EgoPassedPoint { point: anchor }, Condition::SinceActivationAtLeast(15.0)]),
        ));
    }

    let output = std::env::args().nth(1).unwrap_or_else(|| "assessment_record.json".to_string());
    let sim = KinematicSimulator::new(0.05).with_ego(loc(0.0, 0.0, 0.0), 0.0, 12.0).with_manual_control();
    let mut run = ScenarioRunOrchestrator::new(sim, catalog, EngineConfig::realistic())
        .with_control_model(CautiousBrakeModel)
        .with_destination(FileDestination::new(&output));

    run.start(plan).context("run plan rejected")?;
    let record = run.run_to_completion().context("run failed")?;
    println!("✅ {} events recorded (digest {})", record.len(), &record.digest()[..16]);

    for summary in record.summarize() {
        let mark = match summary.verdict {
            Verdict::Passed => "✅",
            Verdict::Failed => "💥",
            Verdict::Aborted => "⚠️",
            Verdict::Incomplete => "…",
        };
        println!(
            "{} {} {:?}: triggered {:?}s, ended {:?}s, {} actors, {} collisions, {} control samples",
            mark,
            summary.instance,
            summary.corner_case,
            summary.triggered_at,
            summary.ended_at,
            summary.actors.len(),
            summary.collisions,
            summary.control_samples
        );
    }

    println!("📁 Record written to {}", output);
    Ok(())
}

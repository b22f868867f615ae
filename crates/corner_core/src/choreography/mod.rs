//! Actor Choreographer
//!
//! 코너 케이스에 필요한 actor를 스폰하고, 매 틱 스크립트를 진행시키고,
//! 끝나면 시뮬레이터에 반납한다.
//!
//! - activate: 전부 성공하거나 전부 롤백 (부분 스폰 핸들을 남기지 않음)
//! - tick: 인스턴스가 Active인 동안 틱마다 한 번
//! - deactivate: 멱등. 두 번째 호출은 아무것도 하지 않음
//!
//! Spawn failures are returned as-is; retry policy lives in the trigger engine.

pub mod script;

pub use script::{BlueprintSpec, OffsetSpec, ResolvedScript, Scalar, ScriptPhase, ScriptRunner, ScriptSpec};

use fxhash::FxHashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ChoreographyError, SimulatorError};
use crate::simulator::{Simulator, SpawnRequest};
use crate::trigger::{InstanceId, ScenarioInstance};
use crate::world::{ActorId, ActorKind, WorldSnapshot};

/// Actor owned by one instance for scripting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorHandle {
    pub actor: ActorId,
    pub role: String,
    pub kind: ActorKind,
    pub blueprint: String,
}

#[derive(Debug)]
struct CastMember {
    handle: ActorHandle,
    runner: ScriptRunner,
}

pub struct ActorChoreographer {
    spawn_timeout: Duration,
    seed: u64,
    owners: FxHashMap<ActorId, InstanceId>,
    casts: BTreeMap<InstanceId, Vec<CastMember>>,
}

impl ActorChoreographer {
    pub fn new(spawn_timeout: Duration, seed: u64) -> Self {
        Self { spawn_timeout, seed, owners: FxHashMap::default(), casts: BTreeMap::new() }
    }

    /// Blueprint picks depend only on the run seed and the instance id
    fn rng_for(&self, instance: InstanceId) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed ^ (u64::from(instance.0)).wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    pub fn is_active(&self, instance: InstanceId) -> bool {
        self.casts.contains_key(&instance)
    }

    pub fn owner_of(&self, actor: ActorId) -> Option<InstanceId> {
        self.owners.get(&actor).copied()
    }

    pub fn handles(&self, instance: InstanceId) -> Vec<ActorHandle> {
        self.casts
            .get(&instance)
            .map(|cast| cast.iter().map(|m| m.handle.clone()).collect())
            .unwrap_or_default()
    }

    pub fn held_handle_count(&self) -> usize {
        self.owners.len()
    }

    /// Spawn every role of the instance's definition, then issue the
    /// scripts' opening commands.
    pub fn activate<S: Simulator + ?Sized>(
        &mut self,
        sim: &mut S,
        instance: &ScenarioInstance,
        snapshot: &WorldSnapshot,
    ) -> Result<Vec<ActorHandle>, ChoreographyError> {
        if self.casts.contains_key(&instance.id) {
            return Ok(self.handles(instance.id));
        }

        let mut rng = self.rng_for(instance.id);
        let mut cast: Vec<CastMember> = Vec::with_capacity(instance.definition.roles.len());

        for role in &instance.definition.roles {
            let Some(blueprint) = role.blueprint.resolve(&instance.params, &mut rng) else {
                self.rollback(sim, &cast);
                return Err(ChoreographyError::UnresolvedBlueprint { role: role.name.clone() });
            };
            let location = instance.anchor + role.offset.resolve(&instance.params);
            let request = SpawnRequest {
                blueprint: blueprint.clone(),
                kind: role.kind,
                location,
                yaw_deg: role.yaw_deg,
                simulate_physics: role.simulate_physics,
            };

            let actor = match sim.spawn_actor(&request, self.spawn_timeout) {
                Ok(actor) if self.owners.contains_key(&actor) || cast.iter().any(|m| m.handle.actor == actor) => {
                    // id still held by someone; leave that actor alone
                    self.rollback(sim, &cast);
                    return Err(ChoreographyError::HandleConflict { actor });
                }
                Ok(actor) => actor,
                Err(source) => {
                    self.rollback(sim, &cast);
                    return Err(ChoreographyError::ActorSpawn { role: role.name.clone(), blueprint, source });
                }
            };

            let script = role.script.resolve(&instance.params);
            cast.push(CastMember {
                handle: ActorHandle { actor, role: role.name.clone(), kind: role.kind, blueprint },
                runner: ScriptRunner::new(script, location),
            });
        }

        let opening: Vec<_> = cast
            .iter_mut()
            .flat_map(|m| {
                let actor = m.handle.actor;
                m.runner.on_activate(snapshot).into_iter().map(move |c| (actor, c))
            })
            .collect();
        for (actor, command) in opening {
            if let Err(err) = sim.command_actor(actor, &command) {
                if err.is_fatal() {
                    self.rollback(sim, &cast);
                    return Err(ChoreographyError::Simulator(err));
                }
                warn!(instance = %instance.id, %actor, error = %err, "opening command failed");
            }
        }

        let handles: Vec<ActorHandle> = cast.iter().map(|m| m.handle.clone()).collect();
        for handle in &handles {
            self.owners.insert(handle.actor, instance.id);
        }
        debug!(instance = %instance.id, actors = handles.len(), "cast spawned");
        self.casts.insert(instance.id, cast);
        Ok(handles)
    }

    /// Advance every script of an Active instance by one tick
    pub fn tick<S: Simulator + ?Sized>(
        &mut self,
        sim: &mut S,
        instance: InstanceId,
        snapshot: &WorldSnapshot,
    ) -> Result<(), ChoreographyError> {
        let Some(cast) = self.casts.get_mut(&instance) else {
            return Ok(());
        };

        for member in cast.iter_mut() {
            // destroyed actors drop out of the snapshot; nothing left to script
            let Some(state) = snapshot.actor(member.handle.actor) else {
                continue;
            };
            for command in member.runner.on_tick(state, snapshot) {
                match sim.command_actor(member.handle.actor, &command) {
                    Ok(()) => {}
                    Err(err) if err.is_fatal() => return Err(ChoreographyError::Simulator(err)),
                    Err(err) => {
                        warn!(%instance, actor = %member.handle.actor, error = %err, "script command failed")
                    }
                }
            }
        }
        Ok(())
    }

    /// Release every handle of the instance. Returns how many were released;
    /// a second call returns 0.
    pub fn deactivate<S: Simulator + ?Sized>(
        &mut self,
        sim: &mut S,
        instance: InstanceId,
    ) -> Result<usize, ChoreographyError> {
        let Some(cast) = self.casts.remove(&instance) else {
            return Ok(0);
        };

        let mut fatal = None;
        for member in &cast {
            self.owners.remove(&member.handle.actor);
            if fatal.is_some() {
                continue;
            }
            match sim.despawn_actor(member.handle.actor) {
                Ok(()) | Err(SimulatorError::UnknownActor(_)) => {}
                Err(err) if err.is_fatal() => fatal = Some(err),
                Err(err) => warn!(%instance, actor = %member.handle.actor, error = %err, "despawn failed"),
            }
        }

        match fatal {
            Some(err) => Err(ChoreographyError::Simulator(err)),
            None => {
                debug!(%instance, released = cast.len(), "cast released");
                Ok(cast.len())
            }
        }
    }

    /// Best-effort despawn of a partially spawned cast
    fn rollback<S: Simulator + ?Sized>(&self, sim: &mut S, cast: &[CastMember]) {
        for member in cast {
            if let Err(err) = sim.despawn_actor(member.handle.actor) {
                warn!(actor = %member.handle.actor, error = %err, "rollback despawn failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, CornerCaseId};
    use crate::geometry::loc;
    use crate::simulator::{FaultPlan, KinematicSimulator};
    use crate::trigger::Condition;

    fn sim() -> KinematicSimulator {
        let mut sim = KinematicSimulator::new(0.05).with_ego(loc(0.0, 0.0, 0.0), 0.0, 10.0);
        sim.connect().unwrap();
        sim
    }

    fn instance(id: u32, case: u16) -> ScenarioInstance {
        let catalog = Catalog::builtin().unwrap();
        let def = catalog.lookup(CornerCaseId(case)).unwrap();
        let params = def.schema.resolve(&Default::default()).unwrap();
        ScenarioInstance::new(InstanceId(id), 0, def, params, loc(100.0, 0.0, 0.0), Condition::Always, Condition::Never)
    }

    fn choreographer() -> ActorChoreographer {
        ActorChoreographer::new(Duration::from_millis(50), 7)
    }

    #[test]
    fn test_activate_spawns_all_roles_at_anchor_offsets() {
        let mut sim = sim();
        let mut choreo = choreographer();
        let inst = instance(1, 1);
        let snapshot = sim.snapshot().unwrap();

        let handles = choreo.activate(&mut sim, &inst, &snapshot).unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].role, "sign");
        assert_eq!(choreo.held_handle_count(), 2);

        let world = sim.snapshot().unwrap();
        let occluder = world.actor(handles[1].actor).unwrap();
        // default occluder_x_m = -8, occluder_lateral_m = 3.5
        assert!((occluder.location.x - 92.0).abs() < 1e-9);
        assert!((occluder.location.y - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let mut sim = sim();
        let mut choreo = choreographer();
        let inst = instance(1, 25);
        let snapshot = sim.snapshot().unwrap();
        choreo.activate(&mut sim, &inst, &snapshot).unwrap();

        assert_eq!(choreo.deactivate(&mut sim, inst.id).unwrap(), 5);
        assert_eq!(choreo.deactivate(&mut sim, inst.id).unwrap(), 0);
        assert_eq!(sim.stats().despawned.len(), 5);
        assert!(sim.live_actor_ids().is_empty());
        assert_eq!(choreo.held_handle_count(), 0);
    }

    #[test]
    fn test_partial_spawn_rolled_back() {
        // ball boy: ball and kid spawn, the first parked car is rejected
        let mut sim = sim().with_faults(FaultPlan {
            reject_spawn_blueprints: vec!["vehicle.tesla.cybertruck".into()],
            ..Default::default()
        });
        let mut choreo = choreographer();
        let inst = instance(3, 25);
        let snapshot = sim.snapshot().unwrap();

        let err = choreo.activate(&mut sim, &inst, &snapshot).unwrap_err();
        assert!(matches!(err, ChoreographyError::ActorSpawn { ref role, .. } if role == "parked_front"));
        assert!(!err.is_fatal());
        assert!(sim.live_actor_ids().is_empty());
        assert_eq!(sim.stats().despawned.len(), 2);
        assert!(!choreo.is_active(inst.id));
        assert_eq!(choreo.held_handle_count(), 0);
    }

    #[test]
    fn test_missing_blueprint_param_rolls_back() {
        let mut sim = sim();
        let mut choreo = choreographer();
        let def = Catalog::builtin().unwrap().lookup(CornerCaseId(25)).unwrap();
        // kid_blueprint left unbound
        let inst = ScenarioInstance::new(
            InstanceId(4),
            0,
            def,
            Default::default(),
            loc(100.0, 0.0, 0.0),
            Condition::Always,
            Condition::Never,
        );
        let snapshot = sim.snapshot().unwrap();

        let err = choreo.activate(&mut sim, &inst, &snapshot).unwrap_err();
        assert!(matches!(err, ChoreographyError::UnresolvedBlueprint { ref role } if role == "kid"));
        assert!(!err.is_fatal());
        assert_eq!(sim.stats().spawned.len(), 1, "ball only, no empty-name spawn");
        assert!(sim.live_actor_ids().is_empty());
        assert!(!choreo.is_active(inst.id));
        assert_eq!(choreo.held_handle_count(), 0);
    }

    #[test]
    fn test_opening_commands_and_tick() {
        let mut sim = sim();
        let mut choreo = choreographer();
        let inst = instance(1, 20); // falling barrel
        let snapshot = sim.snapshot().unwrap();
        let handles = choreo.activate(&mut sim, &inst, &snapshot).unwrap();

        let barrel = handles.iter().find(|h| h.role == "barrel").unwrap().actor;
        let commands: Vec<_> = sim.stats().commands.iter().filter(|(a, _)| *a == barrel).map(|(_, c)| *c).collect();
        assert_eq!(commands[0], crate::simulator::ActorCommand::SetPhysics(true));

        let snapshot = sim.advance().unwrap();
        choreo.tick(&mut sim, inst.id, &snapshot).unwrap();
        assert!(snapshot.actor(barrel).unwrap().location.x < 106.0, "barrel thrown backwards");
    }

    #[test]
    fn test_blueprint_picks_are_seeded() {
        let pick = |seed: u64| {
            let mut sim = sim();
            let mut choreo = ActorChoreographer::new(Duration::from_millis(50), seed);
            let inst = instance(4, 13);
            let snapshot = sim.snapshot().unwrap();
            choreo.activate(&mut sim, &inst, &snapshot).unwrap()[0].blueprint.clone()
        };
        assert_eq!(pick(11), pick(11));
    }

    #[test]
    fn test_fatal_spawn_error_propagates() {
        let mut sim = sim();
        let mut choreo = choreographer();
        let inst = instance(1, 4);
        let snapshot = sim.snapshot().unwrap();
        sim.disconnect();

        let err = choreo.activate(&mut sim, &inst, &snapshot).unwrap_err();
        assert!(err.is_fatal());
    }
}

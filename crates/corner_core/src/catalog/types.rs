//! Corner case definition types

use serde::{Deserialize, Serialize};
use std::fmt;

use super::params::{ParamSchema, ParamSpec};
use crate::choreography::script::{BlueprintSpec, OffsetSpec, ScriptSpec};
use crate::world::ActorKind;

// ============================================================================
// Identity & Taxonomy
// ============================================================================

/// Numeric catalog identifier. Catalog order is identifier order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CornerCaseId(pub u16);

impl fmt::Display for CornerCaseId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CC-{:02}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxonomyCategory {
    /// 정적 객체의 시각적 상태가 모호하거나 오해를 부르는 경우
    StateAnomaly,
    /// 다른 교통 참여자의 예상 밖 기동
    BehaviorAnomaly,
    /// 맥락 단서로 위험을 추론해야 하는 경우
    EvidenceBasedAnomaly,
}

impl TaxonomyCategory {
    pub const ALL: [TaxonomyCategory; 3] = [
        TaxonomyCategory::StateAnomaly,
        TaxonomyCategory::BehaviorAnomaly,
        TaxonomyCategory::EvidenceBasedAnomaly,
    ];
}

impl fmt::Display for TaxonomyCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TaxonomyCategory::StateAnomaly => "state",
            TaxonomyCategory::BehaviorAnomaly => "behavior",
            TaxonomyCategory::EvidenceBasedAnomaly => "evidence",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Category Profiles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateAnomaly {
    Occlusion,
    AlteredSignage,
    AlteredSurface,
    StaticObstacle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Maneuver {
    Crossing,
    Intercept,
    Swerving,
    WrongWay,
    SuddenStop,
    CutIn,
    FallingObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceCue {
    Ball,
    CallingPerson,
    Playground,
    Gesture,
    OccludingVehicle,
    EmergencyVehicle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateProfile {
    pub anomaly: StateAnomaly,
    /// Whether the object sits in the ego's lane
    pub blocks_lane: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub maneuver: Maneuver,
    /// Role performing the maneuver; must carry a non-static script
    pub agent_role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceProfile {
    pub cue: EvidenceCue,
    /// Role that provides the cue
    pub cue_role: String,
    /// Role the cue hints at, if it actually appears
    pub hazard_role: Option<String>,
}

/// Category tag with its category-specific data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CategoryProfile {
    State(StateProfile),
    Behavior(BehaviorProfile),
    Evidence(EvidenceProfile),
}

impl CategoryProfile {
    pub fn category(&self) -> TaxonomyCategory {
        match self {
            CategoryProfile::State(_) => TaxonomyCategory::StateAnomaly,
            CategoryProfile::Behavior(_) => TaxonomyCategory::BehaviorAnomaly,
            CategoryProfile::Evidence(_) => TaxonomyCategory::EvidenceBasedAnomaly,
        }
    }

    pub fn state(anomaly: StateAnomaly, blocks_lane: bool) -> Self {
        CategoryProfile::State(StateProfile { anomaly, blocks_lane })
    }

    pub fn behavior(maneuver: Maneuver, agent_role: &str) -> Self {
        CategoryProfile::Behavior(BehaviorProfile { maneuver, agent_role: agent_role.to_string() })
    }

    pub fn evidence(cue: EvidenceCue, cue_role: &str, hazard_role: Option<&str>) -> Self {
        CategoryProfile::Evidence(EvidenceProfile {
            cue,
            cue_role: cue_role.to_string(),
            hazard_role: hazard_role.map(str::to_string),
        })
    }
}

// ============================================================================
// Roles & Definitions
// ============================================================================

/// One actor a corner case needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorRole {
    pub name: String,
    pub kind: ActorKind,
    pub blueprint: BlueprintSpec,
    pub offset: OffsetSpec,
    pub yaw_deg: f64,
    pub script: ScriptSpec,
    pub simulate_physics: bool,
}

impl ActorRole {
    pub fn new(name: &str, kind: ActorKind, blueprint: BlueprintSpec) -> Self {
        Self {
            name: name.to_string(),
            kind,
            blueprint,
            offset: OffsetSpec::default(),
            yaw_deg: 0.0,
            script: ScriptSpec::Static,
            simulate_physics: false,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.offset = OffsetSpec::fixed(x, y);
        self
    }

    pub fn at_offset(mut self, offset: OffsetSpec) -> Self {
        self.offset = offset;
        self
    }

    pub fn facing(mut self, yaw_deg: f64) -> Self {
        self.yaw_deg = yaw_deg;
        self
    }

    pub fn script(mut self, script: ScriptSpec) -> Self {
        self.script = script;
        self
    }

    pub fn physics(mut self) -> Self {
        self.simulate_physics = true;
        self
    }
}

/// Immutable corner case definition, shared by the catalog as `Arc`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerCaseDefinition {
    pub id: CornerCaseId,
    /// Unique kebab-case name
    pub slug: String,
    pub description: String,
    pub profile: CategoryProfile,
    /// Spawn order = list order
    pub roles: Vec<ActorRole>,
    pub schema: ParamSchema,
}

impl CornerCaseDefinition {
    pub fn builder(id: u16, slug: &str, description: &str, profile: CategoryProfile) -> DefinitionBuilder {
        DefinitionBuilder {
            def: CornerCaseDefinition {
                id: CornerCaseId(id),
                slug: slug.to_string(),
                description: description.to_string(),
                profile,
                roles: Vec::new(),
                schema: ParamSchema::new(),
            },
        }
    }

    pub fn category(&self) -> TaxonomyCategory {
        self.profile.category()
    }

    pub fn role(&self, name: &str) -> Option<&ActorRole> {
        self.roles.iter().find(|r| r.name == name)
    }
}

pub struct DefinitionBuilder {
    def: CornerCaseDefinition,
}

impl DefinitionBuilder {
    pub fn role(mut self, role: ActorRole) -> Self {
        self.def.roles.push(role);
        self
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.def.schema.fields.push(spec);
        self
    }

    pub fn build(self) -> CornerCaseDefinition {
        self.def
    }
}

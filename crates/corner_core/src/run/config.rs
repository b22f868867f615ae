//! Run plan: world conditions plus the ordered corner-case entries
//!
//! 실행 계획은 호출자 입력으로부터 한 번 만들어지고 실행 중에는 읽기 전용.
//! `validate`는 start() 전에 모든 엔트리를 카탈로그 스키마와 대조한다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::catalog::{Catalog, CornerCaseDefinition, CornerCaseId, ParamBindings, ParamValue, ResolvedParams};
use crate::environment::{TimeOfDay, WeatherPreset};
use crate::error::RunError;
use crate::geometry::Location;
use crate::trigger::{Condition, Sequencing};

/// Catalog reference by numeric id or slug
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CornerCaseRef {
    Id(CornerCaseId),
    Slug(String),
}

impl From<u16> for CornerCaseRef {
    fn from(id: u16) -> Self {
        CornerCaseRef::Id(CornerCaseId(id))
    }
}

impl From<CornerCaseId> for CornerCaseRef {
    fn from(id: CornerCaseId) -> Self {
        CornerCaseRef::Id(id)
    }
}

impl From<&str> for CornerCaseRef {
    fn from(slug: &str) -> Self {
        CornerCaseRef::Slug(slug.to_string())
    }
}

impl fmt::Display for CornerCaseRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CornerCaseRef::Id(id) => write!(f, "{}", id),
            CornerCaseRef::Slug(slug) => f.write_str(slug),
        }
    }
}

/// One scheduled corner case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    pub corner_case: CornerCaseRef,
    #[serde(default)]
    pub params: ParamBindings,
    /// World point the definition's role offsets are relative to
    pub anchor: Location,
    pub trigger: Condition,
    pub completion: Condition,
}

impl RunEntry {
    pub fn new(corner_case: impl Into<CornerCaseRef>, anchor: Location, trigger: Condition, completion: Condition) -> Self {
        Self { corner_case: corner_case.into(), params: ParamBindings::new(), anchor, trigger, completion }
    }

    pub fn param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// Seeds blueprint picks; part of the replay identity
    #[serde(default)]
    pub seed: u64,
    /// 1-9
    pub weather_preset: i64,
    #[serde(default)]
    pub time_of_day: TimeOfDay,
    pub traffic_density: f64,
    #[serde(default)]
    pub allow_overlap: bool,
    #[serde(default)]
    pub sequencing: Sequencing,
    #[serde(default)]
    pub entries: Vec<RunEntry>,
}

/// Entry checked against its definition
#[derive(Debug, Clone)]
pub struct ValidatedEntry {
    pub definition: Arc<CornerCaseDefinition>,
    pub params: ResolvedParams,
    pub anchor: Location,
    pub trigger: Condition,
    pub completion: Condition,
}

impl RunConfiguration {
    pub fn new(seed: u64, weather_preset: i64, traffic_density: f64) -> Self {
        Self {
            seed,
            weather_preset,
            time_of_day: TimeOfDay::default(),
            traffic_density,
            allow_overlap: false,
            sequencing: Sequencing::default(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: RunEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn with_time_of_day(mut self, time_of_day: TimeOfDay) -> Self {
        self.time_of_day = time_of_day;
        self
    }

    pub fn with_sequencing(mut self, sequencing: Sequencing) -> Self {
        self.sequencing = sequencing;
        self
    }

    pub fn with_overlap(mut self, allow: bool) -> Self {
        self.allow_overlap = allow;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Resolve every entry against the catalog. The first problem found is
    /// returned; nothing is corrected silently.
    ///
    /// Traffic density is range-checked by the environment controller, which
    /// owns the configured range.
    pub fn validate(&self, catalog: &Catalog) -> Result<Vec<ValidatedEntry>, RunError> {
        WeatherPreset::from_id(self.weather_preset)?;

        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| Self::validate_entry(catalog, index, entry))
            .collect()
    }

    fn validate_entry(catalog: &Catalog, index: usize, entry: &RunEntry) -> Result<ValidatedEntry, RunError> {
        let definition = match &entry.corner_case {
            CornerCaseRef::Id(id) => catalog.lookup(*id)?,
            CornerCaseRef::Slug(slug) => catalog.lookup_slug(slug)?,
        };

        let params = definition.schema.resolve(&entry.params).map_err(|violation| RunError::SchemaMismatch {
            entry: index,
            corner_case: definition.id,
            violation,
        })?;

        if entry.anchor.iter().any(|c| !c.is_finite()) {
            return Err(RunError::Validation(format!("entry {}: anchor is not finite", index)));
        }
        if entry.trigger.needs_activation() {
            return Err(RunError::Validation(format!(
                "entry {}: trigger refers to activation state that cannot exist before it fires",
                index
            )));
        }
        for (which, condition) in [("trigger", &entry.trigger), ("completion", &entry.completion)] {
            if let Some(problem) = condition.numeric_problem() {
                return Err(RunError::Validation(format!("entry {}: {} has {}", index, which, problem)));
            }
            if let Some(role) = condition.roles().into_iter().find(|r| definition.role(r).is_none()) {
                return Err(RunError::Validation(format!(
                    "entry {}: {} refers to unknown role '{}' of {}",
                    index, which, role, definition.slug
                )));
            }
        }

        Ok(ValidatedEntry {
            definition,
            params,
            anchor: entry.anchor,
            trigger: entry.trigger.clone(),
            completion: entry.completion.clone(),
        })
    }
}

//! Scenario Definition Catalog
//!
//! 코너 케이스 정의 레지스트리. 프로세스 시작 시 32개 내장 정의로 채워지고
//! 이후에는 읽기 전용으로 공유된다.
//!
//! ## 사용법
//! ```rust
//! use corner_core::catalog::{Catalog, TaxonomyCategory};
//!
//! let catalog = Catalog::builtin().unwrap();
//! let stop_sign = catalog.lookup_slug("stop-sign-occluded").unwrap();
//! assert_eq!(stop_sign.category(), TaxonomyCategory::StateAnomaly);
//! assert!(catalog.list_by_category(TaxonomyCategory::BehaviorAnomaly).count() > 0);
//! ```

pub mod builtin;
pub mod params;
pub mod types;

pub use params::{
    ParamBindings, ParamKind, ParamSchema, ParamSpec, ParamValue, ResolvedParams, SchemaViolation,
};
pub use types::{
    ActorRole, BehaviorProfile, CategoryProfile, CornerCaseDefinition, CornerCaseId, EvidenceCue,
    EvidenceProfile, Maneuver, StateAnomaly, StateProfile, TaxonomyCategory,
};

use fxhash::FxHashMap;
use std::collections::{btree_map, BTreeMap, HashSet};
use std::sync::Arc;

use crate::choreography::script::BlueprintSpec;
use crate::error::CatalogError;

/// Registry of corner case definitions, ordered by identifier
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    definitions: BTreeMap<CornerCaseId, Arc<CornerCaseDefinition>>,
    slugs: FxHashMap<String, CornerCaseId>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the 32 built-in definitions
    pub fn builtin() -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for def in builtin::definitions() {
            catalog.register_shared(Arc::clone(def))?;
        }
        Ok(catalog)
    }

    pub fn register(&mut self, definition: CornerCaseDefinition) -> Result<(), CatalogError> {
        self.register_shared(Arc::new(definition))
    }

    fn register_shared(&mut self, definition: Arc<CornerCaseDefinition>) -> Result<(), CatalogError> {
        if self.definitions.contains_key(&definition.id) {
            return Err(CatalogError::DuplicateId { id: definition.id });
        }
        if self.slugs.contains_key(&definition.slug) {
            return Err(CatalogError::DuplicateSlug { slug: definition.slug.clone() });
        }
        validate_definition(&definition)?;

        self.slugs.insert(definition.slug.clone(), definition.id);
        self.definitions.insert(definition.id, definition);
        Ok(())
    }

    pub fn lookup(&self, id: CornerCaseId) -> Result<Arc<CornerCaseDefinition>, CatalogError> {
        self.definitions.get(&id).cloned().ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    pub fn lookup_slug(&self, slug: &str) -> Result<Arc<CornerCaseDefinition>, CatalogError> {
        self.slugs
            .get(slug)
            .and_then(|id| self.definitions.get(id))
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(slug.to_string()))
    }

    /// Lazy, restartable sequence in identifier order
    pub fn list_by_category(&self, category: TaxonomyCategory) -> ByCategory<'_> {
        ByCategory { inner: self.definitions.values(), category }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CornerCaseDefinition>> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Iterator returned by [`Catalog::list_by_category`]
#[derive(Clone)]
pub struct ByCategory<'a> {
    inner: btree_map::Values<'a, CornerCaseId, Arc<CornerCaseDefinition>>,
    category: TaxonomyCategory,
}

impl<'a> Iterator for ByCategory<'a> {
    type Item = &'a Arc<CornerCaseDefinition>;

    fn next(&mut self) -> Option<Self::Item> {
        let category = self.category;
        self.inner.by_ref().find(|def| def.category() == category)
    }
}

// ============================================================================
// Registration checks
// ============================================================================

fn is_kebab(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn validate_definition(def: &CornerCaseDefinition) -> Result<(), CatalogError> {
    let invalid = |reason: String| CatalogError::InvalidDefinition { id: def.id, reason };

    if def.id.0 == 0 {
        return Err(invalid("identifier 0 is reserved".into()));
    }
    if !is_kebab(&def.slug) {
        return Err(invalid(format!("slug '{}' is not kebab-case", def.slug)));
    }
    if def.roles.is_empty() {
        return Err(invalid("at least one actor role is required".into()));
    }

    let mut role_names = HashSet::new();
    for role in &def.roles {
        if !role_names.insert(role.name.as_str()) {
            return Err(invalid(format!("duplicate role '{}'", role.name)));
        }
    }

    let mut field_names = HashSet::new();
    for field in &def.schema.fields {
        if !field_names.insert(field.name.as_str()) {
            return Err(invalid(format!("duplicate parameter '{}'", field.name)));
        }
        if let Some(default) = &field.default {
            field.check(default).map_err(|v| invalid(format!("bad default: {}", v)))?;
        }
    }

    for role in &def.roles {
        let scalars = role.script.scalars().into_iter().chain(role.offset.scalars());
        for name in scalars.filter_map(|s| s.param_name()) {
            match def.schema.field(name) {
                Some(spec) if spec.kind.is_numeric() => {}
                Some(_) => return Err(invalid(format!("role '{}': parameter '{}' is not numeric", role.name, name))),
                None => return Err(invalid(format!("role '{}': unknown parameter '{}'", role.name, name))),
            }
        }

        match &role.blueprint {
            BlueprintSpec::Fixed(name) if name.is_empty() => {
                return Err(invalid(format!("role '{}': empty blueprint", role.name)));
            }
            BlueprintSpec::Pick(names) if names.is_empty() => {
                return Err(invalid(format!("role '{}': empty blueprint pick list", role.name)));
            }
            BlueprintSpec::FromParam(name) => match def.schema.field(name) {
                Some(ParamSpec { kind: ParamKind::Choice(_), .. }) => {}
                _ => {
                    return Err(invalid(format!(
                        "role '{}': blueprint parameter '{}' must be a choice",
                        role.name, name
                    )))
                }
            },
            _ => {}
        }
    }

    let require_role = |name: &str| {
        def.role(name).ok_or_else(|| invalid(format!("profile references unknown role '{}'", name)))
    };
    match &def.profile {
        CategoryProfile::State(_) => {}
        CategoryProfile::Behavior(profile) => {
            let agent = require_role(&profile.agent_role)?;
            if agent.script.is_static() {
                return Err(invalid(format!("behavior agent '{}' has a static script", agent.name)));
            }
        }
        CategoryProfile::Evidence(profile) => {
            require_role(&profile.cue_role)?;
            if let Some(hazard) = &profile.hazard_role {
                require_role(hazard)?;
            }
        }
    }

    Ok(())
}

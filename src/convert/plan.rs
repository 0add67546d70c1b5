//! Skeleton reduction planning.
//!
//! Planning reads the armature and produces the complete list of reparents,
//! removals and weight fusions as data. Nothing is mutated here; the
//! execution in `skeleton` applies the plan mechanically.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::armature::Armature;
use crate::error::ConvertError;
use crate::project::ProjectSettings;
use crate::log_warn;

use super::types::{
    BONES_TO_REMOVE, CHAIN_SEGMENTS, DOUBLE_BONES, HEIGHTS, PARENTS_TO_CLEAN, SIDES, Severity,
    ValidationIssue,
};

// ─── Request ──────────────────────────────────────────────────────────────────

/// Bone name lists driving one reduction pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReductionRequest {
    /// Bone receiving the bones listed in `reparent`.
    pub reparent_target: String,
    pub reparent: Vec<String>,
    /// Bones removed with all their descendants.
    pub remove: Vec<String>,
    /// Bones kept while all their descendants are removed.
    pub clean: Vec<String>,
    /// Split bone stems fused per side (`<stem>.<side>.001` into `<stem>.<side>`).
    pub fuse_stems: Vec<String>,
    /// Any bone whose name contains one of these joins `remove`.
    pub remove_patterns: Vec<String>,
}

impl ReductionRequest {
    /// Lists for a Rigify metarig, extended with the custom entries from settings.
    pub fn rigify(settings: &ProjectSettings) -> Self {
        let mut fuse_stems: Vec<String> = DOUBLE_BONES.iter().map(|s| s.to_string()).collect();
        let mut clean: Vec<String> = PARENTS_TO_CLEAN.iter().map(|s| s.to_string()).collect();
        let mut remove: Vec<String> = BONES_TO_REMOVE.iter().map(|s| s.to_string()).collect();
        let mut reparent = Vec::new();

        for side in SIDES {
            remove.push(format!("temple.{side}"));
            remove.push(format!("forehead.{side}"));
            remove.push(format!("heel.02.{side}"));
            reparent.push(format!("lip.T.{side}"));
            remove.push(format!("lip.T.{side}"));
            for height in HEIGHTS {
                remove.push(format!("cheek.{height}.{side}"));
                remove.push(format!("brow.{height}.{side}"));
                reparent.push(format!("lid.{height}.{side}"));
            }
            clean.push(format!("toe.{side}"));
            for segment in 1..=CHAIN_SEGMENTS {
                for height in HEIGHTS {
                    remove.push(format!("brow.{height}.{side}.{segment:03}"));
                }
                remove.push(format!("forehead.{side}.{segment:03}"));
            }
            clean.push(format!("ear.{side}.001"));
        }

        clean.extend(settings.custom_parents_to_clean.iter().cloned());
        remove.extend(settings.custom_bones_to_remove.iter().cloned());
        fuse_stems.extend(settings.custom_double_bones.iter().cloned());

        Self {
            reparent_target: settings.face_parent.clone(),
            reparent,
            remove,
            clean,
            fuse_stems,
            remove_patterns: settings.remove_name_patterns.clone(),
        }
    }
}

// ─── Plan ─────────────────────────────────────────────────────────────────────

/// One bone deletion; its weights fold onto `fold_target`, the nearest
/// ancestor that survives the whole pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Removal {
    pub bone: String,
    pub fold_target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReductionPlan {
    /// `(bone, new_parent)`, applied before any removal.
    pub reparents: Vec<(String, String)>,
    /// Descendants always precede their ancestors.
    pub removals: Vec<Removal>,
    /// `(secondary, primary)` vertex-group pairs.
    pub fuse_pairs: Vec<(String, String)>,
    pub issues: Vec<ValidationIssue>,
}

impl ReductionPlan {
    /// Removed bone → nearest surviving ancestor.
    pub fn fold_targets(&self) -> HashMap<&str, &str> {
        self.removals
            .iter()
            .map(|removal| (removal.bone.as_str(), removal.fold_target.as_str()))
            .collect()
    }

    pub fn removes(&self, bone: &str) -> bool {
        self.removals.iter().any(|removal| removal.bone == bone)
    }
}

/// Parent links as they will be once the planned reparents are applied.
struct Hierarchy<'a> {
    order: Vec<&'a str>,
    parent: HashMap<&'a str, Option<&'a str>>,
}

impl<'a> Hierarchy<'a> {
    fn new(armature: &'a Armature) -> Self {
        Self {
            order: armature.names().collect(),
            parent: armature
                .bones
                .iter()
                .map(|bone| (bone.name.as_str(), bone.parent.as_deref()))
                .collect(),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.parent.contains_key(name)
    }

    fn parent_of(&self, name: &str) -> Option<&'a str> {
        self.parent.get(name).copied().flatten()
    }

    fn is_ancestor(&self, ancestor: &str, name: &str) -> bool {
        let mut current = self.parent_of(name);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent_of(parent);
        }
        false
    }

    fn depth(&self, name: &str) -> usize {
        let mut depth = 0;
        let mut current = self.parent_of(name);
        while let Some(parent) = current {
            depth += 1;
            current = self.parent_of(parent);
        }
        depth
    }

    /// Strict descendants of `name`.
    fn descendants(&self, name: &str) -> Vec<&'a str> {
        self.order
            .iter()
            .copied()
            .filter(|candidate| self.is_ancestor(name, candidate))
            .collect()
    }
}

fn missing_bone(issues: &mut Vec<ValidationIssue>, list: &str, name: &str) {
    issues.push(ValidationIssue::new(
        Severity::Info,
        "MISSING_BONE",
        format!("{} bone '{}' not found, skipped", list, name),
    ));
}

/// Build the reduction plan for `armature`.
///
/// Absent names are recorded as diagnostics. A malformed hierarchy, or a
/// removed bone without any surviving ancestor to take its weights, is a
/// topology violation.
pub fn plan_reduction(
    armature: &Armature,
    request: &ReductionRequest,
) -> Result<ReductionPlan, ConvertError> {
    armature.validate_forest()?;

    let mut hierarchy = Hierarchy::new(armature);
    let mut plan = ReductionPlan::default();

    // ── 1. Reparents ─────────────────────────────────────────────────────
    let mut seen = HashSet::new();
    if !request.reparent.is_empty() && !hierarchy.contains(&request.reparent_target) {
        log_warn!(
            "Reparent target '{}' not found, face bones keep their parents",
            request.reparent_target
        );
        plan.issues.push(ValidationIssue::new(
            Severity::Warning,
            "MISSING_REPARENT_TARGET",
            format!("reparent target '{}' not found", request.reparent_target),
        ));
    } else if let Some(target) = armature.bone(&request.reparent_target) {
        let target = target.name.as_str();
        for name in &request.reparent {
            if !seen.insert(name.as_str()) {
                continue;
            }
            let Some(bone) = armature.bone(name) else {
                missing_bone(&mut plan.issues, "reparent", name);
                continue;
            };
            let bone = bone.name.as_str();
            if bone == target || hierarchy.is_ancestor(bone, target) {
                plan.issues.push(ValidationIssue::new(
                    Severity::Warning,
                    "REPARENT_CYCLE",
                    format!("'{}' cannot be parented under its own descendant '{}'", bone, target),
                ));
                continue;
            }
            hierarchy.parent.insert(bone, Some(target));
            plan.reparents.push((bone.to_string(), target.to_string()));
        }
    }

    // ── 2. Removal set ───────────────────────────────────────────────────
    let mut removal_roots: Vec<&str> = Vec::new();
    for name in &request.remove {
        match armature.bone(name) {
            Some(bone) => removal_roots.push(bone.name.as_str()),
            None => missing_bone(&mut plan.issues, "remove", name),
        }
    }
    for bone in &armature.bones {
        if request
            .remove_patterns
            .iter()
            .any(|pattern| !pattern.is_empty() && bone.name.contains(pattern.as_str()))
        {
            removal_roots.push(bone.name.as_str());
        }
    }

    let mut removed: HashSet<&str> = HashSet::new();
    for root in removal_roots {
        removed.insert(root);
        removed.extend(hierarchy.descendants(root));
    }
    for name in &request.clean {
        match armature.bone(name) {
            Some(bone) => removed.extend(hierarchy.descendants(&bone.name)),
            None => missing_bone(&mut plan.issues, "clean", name),
        }
    }

    // ── 3. Fold targets and ordering ─────────────────────────────────────
    let mut ordered: Vec<(usize, usize, &str)> = hierarchy
        .order
        .iter()
        .enumerate()
        .filter(|(_, name)| removed.contains(*name))
        .map(|(index, name)| (hierarchy.depth(name), index, *name))
        .collect();
    // Deeper bones first; armature order breaks ties.
    ordered.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    for (_, _, bone) in ordered {
        let mut current = hierarchy.parent_of(bone);
        while let Some(parent) = current {
            if !removed.contains(parent) {
                break;
            }
            current = hierarchy.parent_of(parent);
        }
        let Some(fold_target) = current else {
            return Err(ConvertError::TopologyViolation(format!(
                "bone '{}' is removed but has no surviving ancestor to receive its weights",
                bone
            )));
        };
        plan.removals.push(Removal {
            bone: bone.to_string(),
            fold_target: fold_target.to_string(),
        });
    }

    // ── 4. Fuse pairs ────────────────────────────────────────────────────
    let mut seen_stems = HashSet::new();
    for stem in &request.fuse_stems {
        if !seen_stems.insert(stem.as_str()) {
            continue;
        }
        for side in SIDES {
            let primary = format!("{stem}.{side}");
            let secondary = format!("{primary}.001");
            if removed.contains(primary.as_str()) {
                plan.issues.push(ValidationIssue::new(
                    Severity::Warning,
                    "FUSE_TARGET_REMOVED",
                    format!("'{}' is removed, '{}' is not fused into it", primary, secondary),
                ));
                continue;
            }
            plan.fuse_pairs.push((secondary, primary));
        }
    }

    Ok(plan)
}

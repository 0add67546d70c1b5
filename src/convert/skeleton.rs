//! Skeleton reduction execution.
//!
//! Applies a [`ReductionPlan`] to an armature and the mesh it deforms. The
//! plan already fixes every decision, so this module only mutates.

use serde::Serialize;

use crate::armature::Armature;
use crate::error::{ConvertError, EntityKind};
use crate::mesh::Mesh;
use crate::{log_debug, log_info};

use super::plan::{ReductionPlan, ReductionRequest, plan_reduction};
use super::skinning::{fuse_split_groups, transfer_weights};
use super::types::WeightTransfer;

/// What one executed reduction changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReductionOutcome {
    pub reparented: Vec<String>,
    pub removed: Vec<String>,
    pub transfers: Vec<WeightTransfer>,
    /// `(secondary, primary)` pairs whose weights were actually moved.
    pub fused: Vec<(String, String)>,
    pub fuse_transfers: Vec<WeightTransfer>,
}

/// Execute `plan`: reparents first, then removals in plan order with their
/// weights folded onto the planned target, then split-group fusion.
pub fn execute_plan(
    armature: &mut Armature,
    mesh: &mut Mesh,
    plan: &ReductionPlan,
) -> Result<ReductionOutcome, ConvertError> {
    let mut outcome = ReductionOutcome::default();

    for (bone, parent) in &plan.reparents {
        if !armature.reparent(bone, parent) {
            return Err(ConvertError::TopologyViolation(format!(
                "planned reparent of '{}' onto '{}' is no longer valid",
                bone, parent
            )));
        }
        outcome.reparented.push(bone.clone());
    }

    for removal in &plan.removals {
        if !armature.contains(&removal.fold_target) {
            return Err(ConvertError::missing(EntityKind::Bone, removal.fold_target.as_str()));
        }
        if let Some(transfer) = transfer_weights(mesh, &removal.bone, &removal.fold_target) {
            outcome.transfers.push(transfer);
        }
        if armature.remove_bone(&removal.bone).is_none() {
            return Err(ConvertError::missing(EntityKind::Bone, removal.bone.as_str()));
        }
        outcome.removed.push(removal.bone.clone());
    }

    for transfer in fuse_split_groups(mesh, &plan.fuse_pairs) {
        outcome
            .fused
            .push((transfer.source.clone(), transfer.target.clone()));
        outcome.fuse_transfers.push(transfer);
    }

    log_info!(
        "Reduced skeleton: {} reparented, {} removed, {} groups fused",
        outcome.reparented.len(),
        outcome.removed.len(),
        outcome.fused.len()
    );

    Ok(outcome)
}

/// Move `bone` under `new_parent`. Absent bones make this a no-op.
pub fn reparent_bone(armature: &mut Armature, bone: &str, new_parent: &str) -> bool {
    let moved = armature.reparent(bone, new_parent);
    if !moved {
        log_debug!("Reparent of '{}' onto '{}' skipped", bone, new_parent);
    }
    moved
}

/// Remove `bone` and its whole subtree, folding all their weights onto the
/// nearest surviving ancestor. An absent bone is skipped.
pub fn remove_bone_cascade(
    armature: &mut Armature,
    mesh: &mut Mesh,
    bone: &str,
) -> Result<ReductionOutcome, ConvertError> {
    let request = ReductionRequest {
        remove: vec![bone.to_string()],
        ..ReductionRequest::default()
    };
    let plan = plan_reduction(armature, &request)?;
    execute_plan(armature, mesh, &plan)
}

/// Remove every descendant of `bone` while keeping `bone` itself, which
/// receives their weights.
pub fn remove_children_only(
    armature: &mut Armature,
    mesh: &mut Mesh,
    bone: &str,
) -> Result<ReductionOutcome, ConvertError> {
    let request = ReductionRequest {
        clean: vec![bone.to_string()],
        ..ReductionRequest::default()
    };
    let plan = plan_reduction(armature, &request)?;
    execute_plan(armature, mesh, &plan)
}

/// Fuse the `.001` split segment of each stem into its primary segment on
/// both sides. Bones stay in place.
pub fn fuse_bone_pairs(mesh: &mut Mesh, stems: &[String]) -> Vec<WeightTransfer> {
    let pairs: Vec<(String, String)> = stems
        .iter()
        .flat_map(|stem| {
            super::types::SIDES
                .iter()
                .map(move |side| (format!("{stem}.{side}.001"), format!("{stem}.{side}")))
        })
        .collect();
    fuse_split_groups(mesh, &pairs)
}

mod diagnostic;
mod plan;
mod shape_keys;
mod skeleton;
mod skinning;
mod types;

use std::collections::HashSet;
use std::ops::ControlFlow;

use crate::error::{ConvertError, EntityKind};
use crate::modifier::{ArmatureModifier, Modifier};
use crate::project::ProjectSettings;
use crate::scene::{ObjectMode, SceneHost};
use crate::{log_info, log_warn};

// Re-export public types for callers of this module.
pub use diagnostic::{diagnostic_log_path_for_output, write_conversion_diagnostic_log};
pub use plan::{ReductionPlan, ReductionRequest, Removal, plan_reduction};
pub use shape_keys::{BakeProgress, bake_shape_keys, bake_shape_keys_with_progress};
pub use skeleton::{
    ReductionOutcome, execute_plan, fuse_bone_pairs, remove_bone_cascade, remove_children_only,
    reparent_bone,
};
pub use types::{ConversionReport, Severity, ValidationIssue, WeightTransfer};

use skinning::{limit_total_weights, remap_rigid_groups, strip_deform_prefix};

/// Per-run state threaded through the pipeline steps.
struct ConversionContext<'a> {
    settings: &'a ProjectSettings,
    report: ConversionReport,
}

impl<'a> ConversionContext<'a> {
    fn new(settings: &'a ProjectSettings) -> Self {
        Self {
            settings,
            report: ConversionReport::new(&settings.output_rig_name, &settings.output_mesh_name),
        }
    }

    fn record(&mut self, issues: Vec<ValidationIssue>) {
        for issue in issues {
            match issue.severity {
                Severity::Error | Severity::Warning => {
                    log_warn!("[{}] {}", issue.code, issue.message)
                }
                Severity::Info => log_info!("[{}] {}", issue.code, issue.message),
            }
            self.report.issues.push(issue);
        }
    }
}

// ─── Public API ───────────────────────────────────────────────────────────────

/// Build the export rig and mesh described by `settings` inside `host`.
///
/// Source objects are only read. On a fatal error the output objects built
/// so far stay in the scene for inspection.
pub fn convert_character<H>(
    host: &mut H,
    settings: &ProjectSettings,
) -> Result<ConversionReport, ConvertError>
where
    H: SceneHost + ?Sized,
{
    convert_character_with_progress(host, settings, |_| ControlFlow::Continue(()))
}

/// [`convert_character`] with a shape-key bake progress callback that may
/// cancel the bake.
pub fn convert_character_with_progress<H, F>(
    host: &mut H,
    settings: &ProjectSettings,
    on_key: F,
) -> Result<ConversionReport, ConvertError>
where
    H: SceneHost + ?Sized,
    F: FnMut(BakeProgress<'_>) -> ControlFlow<()>,
{
    let mut ctx = ConversionContext::new(settings);

    validate_sources(host, &mut ctx)?;
    duplicate_sources(host, &ctx)?;
    fix_vertex_groups(host, &mut ctx)?;
    reduce_skeleton(host, &mut ctx)?;
    if settings.limit_total_weights {
        limit_weights(host, &mut ctx)?;
    }
    bind_to_rig(host, &ctx)?;
    if settings.bake_shape_keys {
        apply_multires(host, &mut ctx, on_key)?;
    }

    let rig = host.armature(&settings.output_rig_name)?;
    let mesh = host.mesh(&settings.output_mesh_name)?;
    ctx.report.bone_count = rig.len();
    ctx.report.vertex_count = mesh.vertex_count();

    log_info!(
        "Converted '{}' into '{}' ({} -> {} bones, {} vertices)",
        settings.source_armature,
        settings.output_rig_name,
        ctx.report.source_bone_count,
        ctx.report.bone_count,
        ctx.report.vertex_count
    );

    Ok(ctx.report)
}

// ─── Private orchestration ────────────────────────────────────────────────────

fn validate_sources<H: SceneHost + ?Sized>(
    host: &H,
    ctx: &mut ConversionContext<'_>,
) -> Result<(), ConvertError> {
    let settings = ctx.settings;
    let source = host.armature(&settings.source_armature)?;
    source.validate_forest()?;
    ctx.report.source_bone_count = source.len();

    if settings.source_meshes.is_empty() {
        return Err(ConvertError::PreconditionViolation(
            "no source meshes configured".to_string(),
        ));
    }
    for name in &settings.source_meshes {
        host.mesh(name)?.validate_faces()?;
    }
    if settings.rigid_group_sources.len() != settings.rigid_group_targets.len() {
        return Err(ConvertError::PreconditionViolation(format!(
            "{} rigid source groups but {} targets",
            settings.rigid_group_sources.len(),
            settings.rigid_group_targets.len()
        )));
    }
    Ok(())
}

fn duplicate_sources<H: SceneHost + ?Sized>(
    host: &mut H,
    ctx: &ConversionContext<'_>,
) -> Result<(), ConvertError> {
    let settings = ctx.settings;
    host.duplicate_object(&settings.source_armature, &settings.output_rig_name)?;

    let Some((first, rest)) = settings.source_meshes.split_first() else {
        return Err(ConvertError::missing(EntityKind::Mesh, "<none>"));
    };
    host.duplicate_object(first, &settings.output_mesh_name)?;

    let mut parts = Vec::with_capacity(rest.len());
    for (index, name) in rest.iter().enumerate() {
        let part = format!("{}.part{:03}", settings.output_mesh_name, index + 1);
        host.duplicate_object(name, &part)?;
        parts.push(part);
    }
    host.join_meshes(&settings.output_mesh_name, &parts)?;

    log_info!(
        "Duplicated '{}' and joined {} mesh part(s) into '{}'",
        settings.source_armature,
        settings.source_meshes.len(),
        settings.output_mesh_name
    );
    Ok(())
}

fn fix_vertex_groups<H: SceneHost + ?Sized>(
    host: &mut H,
    ctx: &mut ConversionContext<'_>,
) -> Result<(), ConvertError> {
    let settings = ctx.settings;
    let mesh = host.mesh_mut(&settings.output_mesh_name)?;

    let (renamed, issues) = strip_deform_prefix(mesh, &settings.deform_prefix);
    ctx.report.renamed_groups = renamed;
    ctx.record(issues);

    let (remapped, issues) = remap_rigid_groups(
        mesh,
        &settings.rigid_group_sources,
        &settings.rigid_group_targets,
    )?;
    ctx.report.remapped_groups = remapped;
    ctx.record(issues);
    Ok(())
}

fn reduce_skeleton<H: SceneHost + ?Sized>(
    host: &mut H,
    ctx: &mut ConversionContext<'_>,
) -> Result<(), ConvertError> {
    let settings = ctx.settings;
    let request = ReductionRequest::rigify(settings);
    let mut plan = plan_reduction(host.armature(&settings.output_rig_name)?, &request)?;
    ctx.record(std::mem::take(&mut plan.issues));

    host.set_mode(&settings.output_rig_name, ObjectMode::Edit)?;
    let outcome = host
        .edit_armature(&settings.output_rig_name, &settings.output_mesh_name)
        .and_then(|(armature, mesh)| execute_plan(armature, mesh, &plan));
    host.set_mode(&settings.output_rig_name, ObjectMode::Object)?;
    let outcome = outcome?;

    ctx.report.reparented_bones = outcome.reparented;
    ctx.report.removed_bones = outcome.removed;
    ctx.report.weight_transfers = outcome.transfers;
    ctx.report.weight_transfers.extend(outcome.fuse_transfers);
    ctx.report.fused_groups = outcome.fused;
    Ok(())
}

fn limit_weights<H: SceneHost + ?Sized>(
    host: &mut H,
    ctx: &mut ConversionContext<'_>,
) -> Result<(), ConvertError> {
    let settings = ctx.settings;
    let bones: Vec<String> = host
        .armature(&settings.output_rig_name)?
        .names()
        .map(str::to_string)
        .collect();
    let bone_groups: HashSet<&str> = bones.iter().map(String::as_str).collect();

    let mesh = host.mesh_mut(&settings.output_mesh_name)?;
    let limited = limit_total_weights(mesh, &bone_groups);
    if limited > 0 {
        ctx.record(vec![ValidationIssue::new(
            Severity::Info,
            "WEIGHTS_LIMITED",
            format!("{} vertices had total bone weight above 1.0 and were scaled", limited),
        )]);
    }
    ctx.report.limited_vertices = limited;
    Ok(())
}

fn bind_to_rig<H: SceneHost + ?Sized>(
    host: &mut H,
    ctx: &ConversionContext<'_>,
) -> Result<(), ConvertError> {
    let settings = ctx.settings;
    host.set_parent(&settings.output_mesh_name, &settings.output_rig_name)?;

    let modifiers = host.modifiers_mut(&settings.output_mesh_name)?;
    if let Some(armature) = modifiers.iter_mut().find_map(|modifier| match modifier {
        Modifier::Armature(armature) if armature.name == settings.armature_modifier_name => {
            Some(armature)
        }
        _ => None,
    }) {
        armature.object = Some(settings.output_rig_name.clone());
        return Ok(());
    }

    log_info!(
        "No '{}' modifier on '{}', adding one",
        settings.armature_modifier_name,
        settings.output_mesh_name
    );
    modifiers.push(Modifier::Armature(ArmatureModifier {
        name: settings.armature_modifier_name.clone(),
        object: Some(settings.output_rig_name.clone()),
    }));
    Ok(())
}

fn apply_multires<H, F>(
    host: &mut H,
    ctx: &mut ConversionContext<'_>,
    on_key: F,
) -> Result<(), ConvertError>
where
    H: SceneHost + ?Sized,
    F: FnMut(BakeProgress<'_>) -> ControlFlow<()>,
{
    let settings = ctx.settings;
    let modifiers = host.modifiers_mut(&settings.output_mesh_name)?;
    let index = modifiers
        .iter()
        .position(|modifier| modifier.name() == settings.multires_modifier_name)
        .ok_or_else(|| {
            ConvertError::missing(EntityKind::Modifier, settings.multires_modifier_name.as_str())
        })?;
    let Modifier::Multires(multires) = &mut modifiers[index] else {
        return Err(ConvertError::PreconditionViolation(format!(
            "modifier '{}' is not a multires modifier",
            settings.multires_modifier_name
        )));
    };

    let level = multires.set_levels(settings.multires_level);
    let multires = multires.clone();
    if level != settings.multires_level {
        ctx.record(vec![ValidationIssue::new(
            Severity::Warning,
            "LEVEL_CLAMPED",
            format!(
                "multires level {} clamped to {}",
                settings.multires_level, level
            ),
        )]);
    }

    let mesh = host.mesh(&settings.output_mesh_name)?;
    ctx.report.vertex_count_before_bake = mesh.vertex_count();
    let baked = bake_shape_keys_with_progress(mesh, &multires, on_key)?;

    ctx.report.baked_shape_keys = baked
        .shape_keys
        .iter()
        .skip(1)
        .map(|key| key.name.clone())
        .collect();
    ctx.report.multires_level = Some(level);

    *host.mesh_mut(&settings.output_mesh_name)? = baked;
    host.modifiers_mut(&settings.output_mesh_name)?.remove(index);
    Ok(())
}

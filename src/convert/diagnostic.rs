use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::scene::{MemoryScene, load_scene};

use super::types::ConversionReport;

// ─── Diagnostic structs ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub(super) struct BoneDiagnostic {
    name: String,
    parent: Option<String>,
    length: f32,
    child_count: usize,
    weighted_vertices: usize,
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct GroupDiagnostic {
    name: String,
    vertices: usize,
    mass: f32,
    /// True when no bone of the output rig carries this name.
    orphan: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct MeshDiagnostic {
    object_name: String,
    parent: Option<String>,
    vertex_count: usize,
    face_count: usize,
    modifiers: Vec<String>,
    shape_keys: Vec<String>,
    unweighted_vertices: usize,
    max_total_weight: f32,
    vertex_groups: Vec<GroupDiagnostic>,
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct ConversionDiagnosticLog {
    output_path: String,
    bones: Vec<BoneDiagnostic>,
    mesh: Option<MeshDiagnostic>,
    report: ConversionReport,
}

// ─── Path helper ──────────────────────────────────────────────────────────────

pub fn diagnostic_log_path_for_output(output_path: &Path) -> PathBuf {
    output_path.with_extension("diagnostic.json")
}

// ─── Diagnostic writer ────────────────────────────────────────────────────────

fn collect_diagnostic(
    output_path: &Path,
    scene: &MemoryScene,
    report: &ConversionReport,
) -> ConversionDiagnosticLog {
    let rig = scene
        .armatures
        .get(&report.output_rig_name)
        .map(|object| &object.armature);
    let mesh_object = scene.mesh_object(&report.output_mesh_name);

    let bones = rig
        .map(|rig| {
            rig.bones
                .iter()
                .map(|bone| BoneDiagnostic {
                    name: bone.name.clone(),
                    parent: bone.parent.clone(),
                    length: bone.length(),
                    child_count: rig.children(&bone.name).len(),
                    weighted_vertices: mesh_object
                        .and_then(|object| object.mesh.vertex_group(&bone.name))
                        .map_or(0, |group| group.weights.len()),
                })
                .collect()
        })
        .unwrap_or_default();

    let mesh = mesh_object.map(|object| {
        let mesh = &object.mesh;
        let mut totals: BTreeMap<u32, f32> = BTreeMap::new();
        for group in &mesh.vertex_groups {
            for (&vertex, &weight) in &group.weights {
                *totals.entry(vertex).or_insert(0.0) += weight;
            }
        }

        MeshDiagnostic {
            object_name: report.output_mesh_name.clone(),
            parent: object.parent.clone(),
            vertex_count: mesh.vertex_count(),
            face_count: mesh.faces.len(),
            modifiers: object
                .modifiers
                .iter()
                .map(|modifier| modifier.name().to_string())
                .collect(),
            shape_keys: mesh.shape_keys.iter().map(|key| key.name.clone()).collect(),
            unweighted_vertices: mesh.vertex_count().saturating_sub(totals.len()),
            max_total_weight: totals.values().copied().fold(0.0, f32::max),
            vertex_groups: mesh
                .vertex_groups
                .iter()
                .map(|group| GroupDiagnostic {
                    name: group.name.clone(),
                    vertices: group.weights.len(),
                    mass: group.total_weight(),
                    orphan: rig.is_none_or(|rig| !rig.contains(&group.name)),
                })
                .collect(),
        }
    });

    ConversionDiagnosticLog {
        output_path: output_path.display().to_string(),
        bones,
        mesh,
        report: report.clone(),
    }
}

/// Re-read the written scene and store a structural summary of the output
/// rig and mesh next to it.
pub fn write_conversion_diagnostic_log(
    output_path: &Path,
    diagnostic_path: &Path,
    report: &ConversionReport,
) -> Result<()> {
    let scene = load_scene(output_path)
        .with_context(|| format!("failed to read output scene: {}", output_path.display()))?;
    let log = collect_diagnostic(output_path, &scene, report);

    let text = serde_json::to_string_pretty(&log)
        .context("failed to serialize conversion diagnostic log")?;
    fs::write(diagnostic_path, text).with_context(|| {
        format!(
            "failed to write conversion diagnostic log: {}",
            diagnostic_path.display()
        )
    })?;
    Ok(())
}

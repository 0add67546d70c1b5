use serde::{Deserialize, Serialize};

// ─── Rigify bone lists ────────────────────────────────────────────────────────

/// Side suffixes used by Rigify for mirrored bones.
pub(super) const SIDES: [&str; 2] = ["L", "R"];

/// Top/bottom suffixes used by Rigify face bones.
pub(super) const HEIGHTS: [&str; 2] = ["T", "B"];

/// Limb stems Rigify splits into a primary and a `.001` deform segment.
pub(super) const DOUBLE_BONES: [&str; 4] = ["upper_arm", "forearm", "thigh", "shin"];

/// Face parents whose fine control children are export noise.
pub(super) const PARENTS_TO_CLEAN: [&str; 2] = ["jaw_master", "nose_master"];

/// Unsided bones removed together with their children.
pub(super) const BONES_TO_REMOVE: [&str; 3] = ["teeth.T", "nose", "nose.004"];

/// Number of numbered segments on Rigify brow and forehead chains.
pub(super) const CHAIN_SEGMENTS: usize = 4;

// ─── Public types ─────────────────────────────────────────────────────────────

/// Severity level used by conversion diagnostics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single non-fatal event recorded during conversion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(severity: Severity, code: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Weight moved from one group into another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightTransfer {
    pub source: String,
    pub target: String,
    /// Number of vertices carried over.
    pub vertices: usize,
    /// Sum of the carried weights.
    pub mass: f32,
}

/// Full conversion report returned after the pipeline finishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionReport {
    pub output_rig_name: String,
    pub output_mesh_name: String,
    pub source_bone_count: usize,
    pub bone_count: usize,
    pub removed_bones: Vec<String>,
    pub reparented_bones: Vec<String>,
    pub renamed_groups: Vec<(String, String)>,
    pub remapped_groups: Vec<(String, String)>,
    pub weight_transfers: Vec<WeightTransfer>,
    pub fused_groups: Vec<(String, String)>,
    pub limited_vertices: usize,
    pub baked_shape_keys: Vec<String>,
    pub multires_level: Option<u32>,
    pub vertex_count_before_bake: usize,
    pub vertex_count: usize,
    pub issues: Vec<ValidationIssue>,
}

impl ConversionReport {
    pub(super) fn new(output_rig_name: &str, output_mesh_name: &str) -> Self {
        Self {
            output_rig_name: output_rig_name.to_string(),
            output_mesh_name: output_mesh_name.to_string(),
            source_bone_count: 0,
            bone_count: 0,
            removed_bones: Vec::new(),
            reparented_bones: Vec::new(),
            renamed_groups: Vec::new(),
            remapped_groups: Vec::new(),
            weight_transfers: Vec::new(),
            fused_groups: Vec::new(),
            limited_vertices: 0,
            baked_shape_keys: Vec::new(),
            multires_level: None,
            vertex_count_before_bake: 0,
            vertex_count: 0,
            issues: Vec::new(),
        }
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Warning)
    }
}

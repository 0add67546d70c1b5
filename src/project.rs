use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Per-character conversion settings, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Metarig armature object to copy.
    pub source_armature: String,
    /// Meshes skinned to the Rigify rig. The first one receives the others.
    pub source_meshes: Vec<String>,
    pub output_rig_name: String,
    pub output_mesh_name: String,
    /// Groups marking rigid parts (teeth, eyes). Paired with `rigid_group_targets`.
    pub rigid_group_sources: Vec<String>,
    pub rigid_group_targets: Vec<String>,
    /// Extra bones to keep while dropping their children.
    pub custom_parents_to_clean: Vec<String>,
    /// Extra bones to drop together with their children.
    pub custom_bones_to_remove: Vec<String>,
    /// Extra split bone stems to fuse, without the `.L`/`.R` side suffix.
    pub custom_double_bones: Vec<String>,
    /// Any bone whose name contains one of these is removed.
    pub remove_name_patterns: Vec<String>,
    /// Bone receiving the reparented face bones.
    pub face_parent: String,
    pub bake_shape_keys: bool,
    pub multires_level: u32,
    pub multires_modifier_name: String,
    pub armature_modifier_name: String,
    /// Prefix stripped from deform-bone vertex groups.
    pub deform_prefix: String,
    /// Scale down vertices whose summed bone weight exceeds 1.0.
    pub limit_total_weights: bool,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            source_armature: "metarig".to_string(),
            source_meshes: vec!["character.base".to_string(), "character.Teeth".to_string()],
            output_rig_name: "exportRig".to_string(),
            output_mesh_name: "exportBody".to_string(),
            rigid_group_sources: vec!["FIXED-teeth.T".to_string(), "FIXED-teeth.B".to_string()],
            rigid_group_targets: vec!["teeth.T".to_string(), "teeth.B".to_string()],
            custom_parents_to_clean: Vec::new(),
            custom_bones_to_remove: Vec::new(),
            custom_double_bones: Vec::new(),
            remove_name_patterns: vec!["glue".to_string()],
            face_parent: "face".to_string(),
            bake_shape_keys: true,
            multires_level: 1,
            multires_modifier_name: "Multires".to_string(),
            armature_modifier_name: "Armature".to_string(),
            deform_prefix: "DEF-".to_string(),
            limit_total_weights: false,
        }
    }
}

/// Save project settings to a JSON file.
pub fn save_project_settings(path: &Path, settings: &ProjectSettings) -> Result<()> {
    let content = serde_json::to_string_pretty(settings)
        .context("failed to serialize project settings as JSON")?;
    fs::write(path, content)
        .with_context(|| format!("failed to save project settings: {}", path.display()))?;
    Ok(())
}

/// Load project settings from a JSON file.
pub fn load_project_settings(path: &Path) -> Result<ProjectSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to load project settings: {}", path.display()))?;
    let settings: ProjectSettings =
        serde_json::from_str(&content).context("failed to parse project settings JSON")?;
    Ok(settings)
}

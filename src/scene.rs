//! Host scene abstraction and the in-memory reference host.
//!
//! The conversion core never tracks an "active object": every call names
//! the objects it touches, and armature edits require an explicit switch to
//! edit mode first.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::armature::Armature;
use crate::error::{ConvertError, EntityKind};
use crate::mesh::Mesh;
use crate::modifier::Modifier;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectMode {
    #[default]
    Object,
    Edit,
}

/// Capabilities the conversion needs from the host application.
pub trait SceneHost {
    fn has_object(&self, name: &str) -> bool;

    /// Copy an object and its data under a new name.
    fn duplicate_object(&mut self, source: &str, new_name: &str) -> Result<(), ConvertError>;

    fn delete_object(&mut self, name: &str) -> Result<(), ConvertError>;

    /// Merge `sources` into `target`; the source objects are consumed.
    fn join_meshes(&mut self, target: &str, sources: &[String]) -> Result<(), ConvertError>;

    fn set_mode(&mut self, armature: &str, mode: ObjectMode) -> Result<(), ConvertError>;

    fn armature(&self, name: &str) -> Result<&Armature, ConvertError>;

    /// Mutable access to an armature in edit mode together with the mesh it
    /// deforms.
    fn edit_armature(
        &mut self,
        armature: &str,
        mesh: &str,
    ) -> Result<(&mut Armature, &mut Mesh), ConvertError>;

    fn mesh(&self, name: &str) -> Result<&Mesh, ConvertError>;

    fn mesh_mut(&mut self, name: &str) -> Result<&mut Mesh, ConvertError>;

    fn modifiers_mut(&mut self, mesh: &str) -> Result<&mut Vec<Modifier>, ConvertError>;

    fn set_parent(&mut self, child: &str, parent: &str) -> Result<(), ConvertError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmatureObject {
    pub armature: Armature,
    #[serde(default)]
    pub mode: ObjectMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshObject {
    pub mesh: Mesh,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
}

/// Serializable scene holding armature and mesh objects by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryScene {
    #[serde(default)]
    pub armatures: BTreeMap<String, ArmatureObject>,
    #[serde(default)]
    pub meshes: BTreeMap<String, MeshObject>,
}

impl MemoryScene {
    pub fn object_count(&self) -> usize {
        self.armatures.len() + self.meshes.len()
    }

    pub fn mesh_object(&self, name: &str) -> Option<&MeshObject> {
        self.meshes.get(name)
    }

    fn ensure_free(&self, name: &str) -> Result<(), ConvertError> {
        if self.has_object(name) {
            return Err(ConvertError::PreconditionViolation(format!(
                "object name '{}' is already in use",
                name
            )));
        }
        Ok(())
    }
}

impl SceneHost for MemoryScene {
    fn has_object(&self, name: &str) -> bool {
        self.armatures.contains_key(name) || self.meshes.contains_key(name)
    }

    fn duplicate_object(&mut self, source: &str, new_name: &str) -> Result<(), ConvertError> {
        self.ensure_free(new_name)?;
        if let Some(object) = self.armatures.get(source) {
            let copy = ArmatureObject {
                armature: object.armature.clone(),
                mode: ObjectMode::Object,
            };
            self.armatures.insert(new_name.to_string(), copy);
            return Ok(());
        }
        if let Some(object) = self.meshes.get(source) {
            let copy = object.clone();
            self.meshes.insert(new_name.to_string(), copy);
            return Ok(());
        }
        Err(ConvertError::missing(EntityKind::Object, source))
    }

    fn delete_object(&mut self, name: &str) -> Result<(), ConvertError> {
        if self.armatures.remove(name).is_some() || self.meshes.remove(name).is_some() {
            return Ok(());
        }
        Err(ConvertError::missing(EntityKind::Object, name))
    }

    fn join_meshes(&mut self, target: &str, sources: &[String]) -> Result<(), ConvertError> {
        if !self.meshes.contains_key(target) {
            return Err(ConvertError::missing(EntityKind::Mesh, target));
        }
        if let Some(missing) = sources.iter().find(|name| !self.meshes.contains_key(*name)) {
            return Err(ConvertError::missing(EntityKind::Mesh, missing.as_str()));
        }
        for source in sources {
            if source == target {
                continue;
            }
            let Some(object) = self.meshes.remove(source) else {
                continue;
            };
            if let Some(target_object) = self.meshes.get_mut(target) {
                target_object.mesh.join(object.mesh);
            }
        }
        Ok(())
    }

    fn set_mode(&mut self, armature: &str, mode: ObjectMode) -> Result<(), ConvertError> {
        let object = self
            .armatures
            .get_mut(armature)
            .ok_or_else(|| ConvertError::missing(EntityKind::Armature, armature))?;
        object.mode = mode;
        Ok(())
    }

    fn armature(&self, name: &str) -> Result<&Armature, ConvertError> {
        self.armatures
            .get(name)
            .map(|object| &object.armature)
            .ok_or_else(|| ConvertError::missing(EntityKind::Armature, name))
    }

    fn edit_armature(
        &mut self,
        armature: &str,
        mesh: &str,
    ) -> Result<(&mut Armature, &mut Mesh), ConvertError> {
        let armature_object = self
            .armatures
            .get_mut(armature)
            .ok_or_else(|| ConvertError::missing(EntityKind::Armature, armature))?;
        if armature_object.mode != ObjectMode::Edit {
            return Err(ConvertError::PreconditionViolation(format!(
                "armature '{}' must be in edit mode for bone edits",
                armature
            )));
        }
        let mesh_object = self
            .meshes
            .get_mut(mesh)
            .ok_or_else(|| ConvertError::missing(EntityKind::Mesh, mesh))?;
        Ok((&mut armature_object.armature, &mut mesh_object.mesh))
    }

    fn mesh(&self, name: &str) -> Result<&Mesh, ConvertError> {
        self.meshes
            .get(name)
            .map(|object| &object.mesh)
            .ok_or_else(|| ConvertError::missing(EntityKind::Mesh, name))
    }

    fn mesh_mut(&mut self, name: &str) -> Result<&mut Mesh, ConvertError> {
        self.meshes
            .get_mut(name)
            .map(|object| &mut object.mesh)
            .ok_or_else(|| ConvertError::missing(EntityKind::Mesh, name))
    }

    fn modifiers_mut(&mut self, mesh: &str) -> Result<&mut Vec<Modifier>, ConvertError> {
        self.meshes
            .get_mut(mesh)
            .map(|object| &mut object.modifiers)
            .ok_or_else(|| ConvertError::missing(EntityKind::Mesh, mesh))
    }

    fn set_parent(&mut self, child: &str, parent: &str) -> Result<(), ConvertError> {
        if !self.has_object(parent) {
            return Err(ConvertError::missing(EntityKind::Object, parent));
        }
        let object = self
            .meshes
            .get_mut(child)
            .ok_or_else(|| ConvertError::missing(EntityKind::Mesh, child))?;
        object.parent = Some(parent.to_string());
        Ok(())
    }
}

/// Save a scene to a JSON file.
pub fn save_scene(path: &Path, scene: &MemoryScene) -> Result<()> {
    let content =
        serde_json::to_string_pretty(scene).context("failed to serialize scene as JSON")?;
    fs::write(path, content)
        .with_context(|| format!("failed to save scene: {}", path.display()))?;
    Ok(())
}

/// Load a scene from a JSON file.
pub fn load_scene(path: &Path) -> Result<MemoryScene> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to load scene: {}", path.display()))?;
    let scene: MemoryScene =
        serde_json::from_str(&content).context("failed to parse scene JSON")?;
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::armature::Bone;

    fn scene() -> MemoryScene {
        serde_json::from_value(serde_json::json!({
            "armatures": {
                "metarig": {
                    "armature": {"bones": [{"name": "spine"}, {"name": "head", "parent": "spine"}]}
                }
            },
            "meshes": {
                "body": {
                    "mesh": {"positions": [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], "faces": [[0, 1, 2]]}
                },
                "teeth": {
                    "mesh": {"positions": [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]], "faces": [[0, 1, 2]]}
                }
            }
        }))
        .expect("parse scene")
    }

    #[test]
    fn given_armature_when_duplicating_then_copy_is_independent() {
        let mut scene = scene();
        scene.duplicate_object("metarig", "exportRig").unwrap();
        scene.set_mode("exportRig", ObjectMode::Edit).unwrap();
        scene.duplicate_object("body", "exportBody").unwrap();

        let (rig, _) = scene.edit_armature("exportRig", "exportBody").unwrap();
        rig.bones.push(Bone::new("jaw", Some("head")));

        assert_eq!(scene.armature("metarig").unwrap().len(), 2);
        assert_eq!(scene.armature("exportRig").unwrap().len(), 3);
    }

    #[test]
    fn given_taken_name_when_duplicating_then_precondition_error_is_returned() {
        let mut scene = scene();
        let err = scene.duplicate_object("body", "teeth").unwrap_err();
        assert!(matches!(err, ConvertError::PreconditionViolation(_)));
    }

    #[test]
    fn given_object_mode_when_editing_armature_then_precondition_error_is_returned() {
        let mut scene = scene();
        let err = scene.edit_armature("metarig", "body").unwrap_err();
        assert!(matches!(err, ConvertError::PreconditionViolation(_)));
    }

    #[test]
    fn given_two_meshes_when_joining_then_source_is_consumed() {
        let mut scene = scene();
        scene
            .join_meshes("body", &["teeth".to_string()])
            .unwrap();

        assert!(!scene.has_object("teeth"));
        assert_eq!(scene.mesh("body").unwrap().vertex_count(), 6);
    }

    #[test]
    fn given_missing_object_when_deleting_then_missing_entity_is_returned() {
        let mut scene = scene();
        let err = scene.delete_object("ghost").unwrap_err();
        assert_eq!(err, ConvertError::missing(EntityKind::Object, "ghost"));
    }

    #[test]
    fn given_saved_scene_when_loading_then_objects_round_trip() {
        let path = std::env::temp_dir().join(format!("rigify-export-scene-{}.json", std::process::id()));
        let scene = scene();

        save_scene(&path, &scene).expect("save scene");
        let loaded = load_scene(&path).expect("load scene");
        let _ = fs::remove_file(&path);

        assert_eq!(loaded, scene);
    }
}

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ConvertError;
use crate::mesh::Mesh;
use crate::subdivide::subdivide_midpoint;

/// Destructive "apply to current shape" primitive.
///
/// Implementations must be deterministic and their output topology must
/// depend only on the input topology, never on positions.
pub trait Deformer {
    fn name(&self) -> &str;
    fn deform(&self, mesh: &Mesh) -> Result<Mesh, ConvertError>;
}

/// Multiresolution modifier: subdivision plus optional sculpted detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiresModifier {
    pub name: String,
    /// Viewport level, the one applied.
    pub levels: u32,
    pub sculpt_levels: u32,
    pub render_levels: u32,
    /// Highest level the modifier holds data for.
    pub total_levels: u32,
    /// Object-space offsets per vertex at `total_levels`. Empty when nothing
    /// was sculpted.
    #[serde(default)]
    pub detail: Vec<Vector3<f32>>,
}

impl MultiresModifier {
    pub fn new(name: impl Into<String>, total_levels: u32) -> Self {
        Self {
            name: name.into(),
            levels: total_levels,
            sculpt_levels: total_levels,
            render_levels: total_levels,
            total_levels,
            detail: Vec::new(),
        }
    }

    /// Set viewport, sculpt and render levels together. Returns the level
    /// actually used, clamped to `total_levels`.
    pub fn set_levels(&mut self, level: u32) -> u32 {
        let level = level.min(self.total_levels);
        self.levels = level;
        self.sculpt_levels = level;
        self.render_levels = level;
        level
    }
}

impl Deformer for MultiresModifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn deform(&self, mesh: &Mesh) -> Result<Mesh, ConvertError> {
        mesh.validate_faces()?;
        let mut result = subdivide_midpoint(mesh, self.levels);
        if self.levels == self.total_levels && self.detail.len() == result.positions.len() {
            for (position, offset) in result.positions.iter_mut().zip(&self.detail) {
                *position += offset;
            }
        }
        Ok(result)
    }
}

/// Skinning modifier binding a mesh to an armature object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmatureModifier {
    pub name: String,
    #[serde(default)]
    pub object: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Modifier {
    Multires(MultiresModifier),
    Armature(ArmatureModifier),
}

impl Modifier {
    pub fn name(&self) -> &str {
        match self {
            Modifier::Multires(modifier) => &modifier.name,
            Modifier::Armature(modifier) => &modifier.name,
        }
    }
}

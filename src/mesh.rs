use std::collections::BTreeMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, EntityKind};

/// How a weight assignment combines with an existing weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightMode {
    /// Sum with the existing weight.
    Add,
    /// Overwrite the existing weight.
    Replace,
}

/// Named per-vertex weight map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexGroup {
    pub name: String,
    #[serde(default)]
    pub weights: BTreeMap<u32, f32>,
}

impl VertexGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weights: BTreeMap::new(),
        }
    }

    pub fn weight(&self, vertex: u32) -> Option<f32> {
        self.weights.get(&vertex).copied()
    }

    pub fn contains(&self, vertex: u32) -> bool {
        self.weights.contains_key(&vertex)
    }

    /// Assign a weight. `Add` never clamps, so repeated transfers keep the
    /// full weight mass.
    pub fn add(&mut self, vertex: u32, weight: f32, mode: WeightMode) {
        let entry = self.weights.entry(vertex).or_insert(0.0);
        match mode {
            WeightMode::Add => *entry += weight,
            WeightMode::Replace => *entry = weight,
        }
    }

    pub fn remove(&mut self, vertex: u32) -> Option<f32> {
        self.weights.remove(&vertex)
    }

    pub fn total_weight(&self) -> f32 {
        self.weights.values().sum()
    }
}

/// A shape key stores absolute vertex positions; its morph delta is the
/// difference to the basis key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeKey {
    pub name: String,
    pub positions: Vec<Vector3<f32>>,
    #[serde(default)]
    pub value: f32,
}

impl ShapeKey {
    pub fn new(name: impl Into<String>, positions: Vec<Vector3<f32>>) -> Self {
        Self {
            name: name.into(),
            positions,
            value: 0.0,
        }
    }

    /// Per-vertex displacement from `basis`.
    pub fn displacement(&self, basis: &ShapeKey) -> Vec<Vector3<f32>> {
        self.positions
            .iter()
            .zip(&basis.positions)
            .map(|(key, base)| key - base)
            .collect()
    }
}

/// Triangle mesh with weight groups and an optional shape-key stack.
/// When present, `shape_keys[0]` is the basis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub positions: Vec<Vector3<f32>>,
    #[serde(default)]
    pub faces: Vec<[u32; 3]>,
    #[serde(default)]
    pub vertex_groups: Vec<VertexGroup>,
    #[serde(default)]
    pub shape_keys: Vec<ShapeKey>,
}

impl Mesh {
    pub fn new(positions: Vec<Vector3<f32>>, faces: Vec<[u32; 3]>) -> Self {
        Self {
            positions,
            faces,
            vertex_groups: Vec::new(),
            shape_keys: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Every face must index existing vertices.
    pub fn validate_faces(&self) -> Result<(), ConvertError> {
        let count = self.positions.len() as u32;
        match self
            .faces
            .iter()
            .position(|face| face.iter().any(|&v| v >= count))
        {
            Some(face) => Err(ConvertError::TopologyViolation(format!(
                "face {} references a vertex outside 0..{}",
                face, count
            ))),
            None => Ok(()),
        }
    }

    // ─── Vertex groups ────────────────────────────────────────────────────────

    pub fn vertex_group(&self, name: &str) -> Option<&VertexGroup> {
        self.vertex_groups.iter().find(|group| group.name == name)
    }

    pub fn vertex_group_mut(&mut self, name: &str) -> Option<&mut VertexGroup> {
        self.vertex_groups.iter_mut().find(|group| group.name == name)
    }

    pub fn has_vertex_group(&self, name: &str) -> bool {
        self.vertex_group(name).is_some()
    }

    /// Return the named group, creating an empty one if absent.
    pub fn ensure_vertex_group(&mut self, name: &str) -> &mut VertexGroup {
        let index = match self.vertex_groups.iter().position(|group| group.name == name) {
            Some(index) => index,
            None => {
                self.vertex_groups.push(VertexGroup::new(name));
                self.vertex_groups.len() - 1
            }
        };
        &mut self.vertex_groups[index]
    }

    pub fn remove_vertex_group(&mut self, name: &str) -> Option<VertexGroup> {
        let index = self.vertex_groups.iter().position(|group| group.name == name)?;
        Some(self.vertex_groups.remove(index))
    }

    /// Rename a group. Fails if the source is missing or the new name is taken.
    pub fn rename_vertex_group(&mut self, from: &str, to: &str) -> Result<(), ConvertError> {
        if from == to {
            return Ok(());
        }
        if self.has_vertex_group(to) {
            return Err(ConvertError::PreconditionViolation(format!(
                "cannot rename vertex group '{}' to '{}': name already in use",
                from, to
            )));
        }
        let group = self
            .vertex_group_mut(from)
            .ok_or_else(|| ConvertError::missing(EntityKind::VertexGroup, from))?;
        group.name = to.to_string();
        Ok(())
    }

    /// Drop a vertex from every group it belongs to.
    pub fn remove_from_all_groups(&mut self, vertex: u32) {
        for group in &mut self.vertex_groups {
            group.remove(vertex);
        }
    }

    /// Groups influencing one vertex, in group order.
    pub fn vertex_weights(&self, vertex: u32) -> Vec<(&str, f32)> {
        self.vertex_groups
            .iter()
            .filter_map(|group| group.weight(vertex).map(|w| (group.name.as_str(), w)))
            .collect()
    }

    // ─── Shape keys ───────────────────────────────────────────────────────────

    pub fn basis(&self) -> Option<&ShapeKey> {
        self.shape_keys.first()
    }

    pub fn shape_key(&self, name: &str) -> Option<&ShapeKey> {
        self.shape_keys.iter().find(|key| key.name == name)
    }

    /// Positions of the rest shape: the basis key when present, the raw
    /// vertex positions otherwise.
    pub fn basis_positions(&self) -> &[Vector3<f32>] {
        match self.basis() {
            Some(basis) if basis.positions.len() == self.positions.len() => &basis.positions,
            _ => &self.positions,
        }
    }

    /// Discard the shape-key stack, leaving the rest shape as geometry.
    pub fn clear_shape_keys(&mut self) {
        if let Some(basis) = self.shape_keys.first()
            && basis.positions.len() == self.positions.len()
        {
            self.positions = basis.positions.clone();
        }
        self.shape_keys.clear();
    }

    /// Plain copy of the mesh showing only the key at `index` at full
    /// influence. The stack is discarded.
    pub fn flatten_to_shape_key(&self, index: usize) -> Result<Mesh, ConvertError> {
        let key = self
            .shape_keys
            .get(index)
            .ok_or_else(|| ConvertError::missing(EntityKind::ShapeKey, format!("#{index}")))?;
        if key.positions.len() != self.positions.len() {
            return Err(ConvertError::TopologyViolation(format!(
                "shape key '{}' has {} positions but the mesh has {} vertices",
                key.name,
                key.positions.len(),
                self.positions.len()
            )));
        }

        Ok(Mesh {
            positions: key.positions.clone(),
            faces: self.faces.clone(),
            vertex_groups: self.vertex_groups.clone(),
            shape_keys: Vec::new(),
        })
    }

    /// Append `shape`'s geometry as a new key named `name`. A basis key is
    /// created from the current geometry first if the stack is empty.
    pub fn join_as_shape(&mut self, name: &str, shape: &Mesh) -> Result<(), ConvertError> {
        if shape.positions.len() != self.positions.len() {
            return Err(ConvertError::TopologyViolation(format!(
                "cannot join '{}' as shape: {} vertices against {}",
                name,
                shape.positions.len(),
                self.positions.len()
            )));
        }
        if self.shape_keys.is_empty() {
            self.shape_keys
                .push(ShapeKey::new("Basis", self.positions.clone()));
        }
        self.shape_keys
            .push(ShapeKey::new(name, shape.positions.clone()));
        Ok(())
    }

    /// Append another mesh into this one. Groups and shape keys are merged by
    /// name; vertices lacking a key take their own basis positions.
    pub fn join(&mut self, other: Mesh) {
        let offset = self.positions.len() as u32;
        let own_rest: Vec<Vector3<f32>> = self.basis_positions().to_vec();
        let other_rest: Vec<Vector3<f32>> = other.basis_positions().to_vec();

        if !self.shape_keys.is_empty() || !other.shape_keys.is_empty() {
            if self.shape_keys.is_empty() {
                self.shape_keys
                    .push(ShapeKey::new("Basis", own_rest.clone()));
            }
            for (index, key) in self.shape_keys.iter_mut().enumerate() {
                let extension = other
                    .shape_keys
                    .iter()
                    .skip(1)
                    .find(|other_key| index > 0 && other_key.name == key.name)
                    .filter(|other_key| other_key.positions.len() == other_rest.len())
                    .map(|other_key| other_key.positions.clone())
                    .unwrap_or_else(|| other_rest.clone());
                key.positions.extend(extension);
            }
            for (index, other_key) in other.shape_keys.iter().enumerate() {
                if index == 0
                    || other_key.positions.len() != other_rest.len()
                    || self.shape_key(&other_key.name).is_some()
                {
                    continue;
                }
                let mut positions = own_rest.clone();
                positions.extend(other_key.positions.iter().copied());
                let mut key = ShapeKey::new(other_key.name.clone(), positions);
                key.value = other_key.value;
                self.shape_keys.push(key);
            }
        }

        self.positions.extend(other.positions);
        self.faces.extend(
            other
                .faces
                .into_iter()
                .map(|[a, b, c]| [a + offset, b + offset, c + offset]),
        );

        for group in other.vertex_groups {
            let target = self.ensure_vertex_group(&group.name);
            for (vertex, weight) in group.weights {
                target.add(vertex + offset, weight, WeightMode::Replace);
            }
        }
    }
}

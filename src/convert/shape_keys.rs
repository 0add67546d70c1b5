//! Shape-key baking.
//!
//! A deform modifier can only be applied to plain geometry, so every key is
//! flattened into its own working mesh, deformed on its own, and joined back
//! onto the deformed basis as a shape. Vertex correspondence between the
//! baked basis and each baked key is checked before the key is accepted.

use std::ops::ControlFlow;

use crate::error::ConvertError;
use crate::mesh::{Mesh, ShapeKey};
use crate::modifier::Deformer;
use crate::{log_debug, log_info};

/// Reported before each key is baked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BakeProgress<'a> {
    /// Zero-based position among the non-basis keys.
    pub index: usize,
    pub total: usize,
    pub name: &'a str,
}

/// Apply `deformer` to the rest shape and to every shape key of `mesh`.
pub fn bake_shape_keys(mesh: &Mesh, deformer: &dyn Deformer) -> Result<Mesh, ConvertError> {
    bake_shape_keys_with_progress(mesh, deformer, |_| ControlFlow::Continue(()))
}

/// Like [`bake_shape_keys`], with a callback that may stop the bake by
/// returning `ControlFlow::Break`, which yields `ConvertError::Cancelled`.
///
/// `mesh` is only read. The result carries the deformed basis (keeping the
/// original basis name) followed by every key in its original order, each
/// at value 0.
pub fn bake_shape_keys_with_progress<F>(
    mesh: &Mesh,
    deformer: &dyn Deformer,
    mut on_key: F,
) -> Result<Mesh, ConvertError>
where
    F: FnMut(BakeProgress<'_>) -> ControlFlow<()>,
{
    let Some(basis) = mesh.basis() else {
        log_debug!("No shape keys, applying '{}' once", deformer.name());
        return deformer.deform(mesh);
    };

    let mut baked = deformer.deform(&mesh.flatten_to_shape_key(0)?)?;
    baked.shape_keys = vec![ShapeKey::new(basis.name.clone(), baked.positions.clone())];

    let keys = &mesh.shape_keys[1..];
    for (index, key) in keys.iter().enumerate() {
        let progress = BakeProgress {
            index,
            total: keys.len(),
            name: &key.name,
        };
        if on_key(progress).is_break() {
            log_info!("Shape-key bake cancelled before '{}'", key.name);
            return Err(ConvertError::Cancelled);
        }

        let shape = deformer.deform(&mesh.flatten_to_shape_key(index + 1)?)?;
        check_correspondence(&baked, &shape, &key.name)?;
        baked.join_as_shape(&key.name, &shape)?;
        log_debug!(
            "Baked shape key '{}' ({}/{})",
            key.name,
            index + 1,
            keys.len()
        );
    }

    for key in &mut baked.shape_keys {
        key.value = 0.0;
    }

    log_info!(
        "Baked {} shape keys with '{}': {} -> {} vertices",
        keys.len(),
        deformer.name(),
        mesh.vertex_count(),
        baked.vertex_count()
    );

    Ok(baked)
}

fn check_correspondence(basis: &Mesh, shape: &Mesh, name: &str) -> Result<(), ConvertError> {
    if shape.vertex_count() != basis.vertex_count() {
        return Err(ConvertError::TopologyViolation(format!(
            "baked shape key '{}' has {} vertices but the baked basis has {}",
            name,
            shape.vertex_count(),
            basis.vertex_count()
        )));
    }
    if shape.faces != basis.faces {
        return Err(ConvertError::TopologyViolation(format!(
            "baked shape key '{}' does not share the baked basis faces",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;

    use super::*;
    use crate::mesh::WeightMode;
    use crate::modifier::MultiresModifier;

    const EPSILON: f32 = 1e-5;

    struct Identity;

    impl Deformer for Identity {
        fn name(&self) -> &str {
            "identity"
        }

        fn deform(&self, mesh: &Mesh) -> Result<Mesh, ConvertError> {
            let mut result = mesh.clone();
            result.shape_keys.clear();
            Ok(result)
        }
    }

    /// Drops the last vertex whenever any vertex sits above y = 1.5, which
    /// makes the output topology depend on positions.
    struct PositionDependent;

    impl Deformer for PositionDependent {
        fn name(&self) -> &str {
            "position-dependent"
        }

        fn deform(&self, mesh: &Mesh) -> Result<Mesh, ConvertError> {
            let mut result = Mesh::new(mesh.positions.clone(), mesh.faces.clone());
            if mesh.positions.iter().any(|p| p.y > 1.5) {
                result.positions.pop();
            }
            Ok(result)
        }
    }

    /// `columns` x `rows` vertex grid in the XY plane.
    fn grid(columns: u32, rows: u32) -> Mesh {
        let mut positions = Vec::new();
        for row in 0..rows {
            for column in 0..columns {
                positions.push(Vector3::new(column as f32, row as f32 * 0.01, 0.0));
            }
        }
        let mut faces = Vec::new();
        for row in 0..rows - 1 {
            for column in 0..columns - 1 {
                let v = row * columns + column;
                faces.push([v, v + 1, v + columns]);
                faces.push([v + 1, v + columns + 1, v + columns]);
            }
        }
        Mesh::new(positions, faces)
    }

    fn with_key(mut mesh: Mesh, name: &str, offset: Vector3<f32>, value: f32) -> Mesh {
        let mut shape = mesh.clone();
        shape.shape_keys.clear();
        shape.positions = mesh
            .basis_positions()
            .iter()
            .enumerate()
            .map(|(i, p)| if i % 3 == 0 { p + offset } else { *p })
            .collect();
        mesh.join_as_shape(name, &shape).unwrap();
        if let Some(key) = mesh.shape_keys.last_mut() {
            key.value = value;
        }
        mesh
    }

    #[test]
    fn given_identity_deform_when_baking_then_smile_delta_is_unchanged() {
        let mesh = with_key(grid(4, 4), "Smile", Vector3::new(0.0, 0.2, 0.05), 0.7);
        let before = mesh.shape_keys[1].displacement(&mesh.shape_keys[0]);

        let baked = bake_shape_keys(&mesh, &Identity).unwrap();

        let smile = baked.shape_key("Smile").unwrap();
        assert_eq!(smile.displacement(&baked.shape_keys[0]), before);
        assert_eq!(smile.value, 0.0);
    }

    #[test]
    fn given_two_keys_when_baking_with_multires_then_counts_match_new_basis() {
        let mut mesh = grid(10, 100);
        mesh = with_key(mesh, "Blink_L", Vector3::new(0.0, 0.0, -0.1), 1.0);
        mesh = with_key(mesh, "Smile", Vector3::new(0.1, 0.0, 0.0), 0.5);
        assert_eq!(mesh.vertex_count(), 1000);

        let baked = bake_shape_keys(&mesh, &MultiresModifier::new("Multires", 1)).unwrap();

        let names: Vec<&str> = baked.shape_keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["Basis", "Blink_L", "Smile"]);
        assert!(baked.vertex_count() > 1000);
        for key in &baked.shape_keys {
            assert_eq!(key.positions.len(), baked.vertex_count());
            assert_eq!(key.value, 0.0);
        }
    }

    #[test]
    fn given_identity_deform_when_baking_thousand_vertices_then_count_is_preserved() {
        let mesh = with_key(grid(10, 100), "Blink_L", Vector3::new(0.0, 0.0, -0.1), 1.0);
        let baked = bake_shape_keys(&mesh, &Identity).unwrap();
        assert_eq!(baked.vertex_count(), 1000);
        assert_eq!(baked.shape_keys[1].positions.len(), 1000);
    }

    #[test]
    fn given_linear_subdivision_when_baking_then_original_vertex_deltas_survive() {
        let offset = Vector3::new(0.0, 0.3, 0.0);
        let mesh = with_key(grid(3, 3), "Smile", offset, 0.0);
        let original = mesh.shape_keys[1].displacement(&mesh.shape_keys[0]);

        let baked = bake_shape_keys(&mesh, &MultiresModifier::new("Multires", 2)).unwrap();
        let delta = baked.shape_keys[1].displacement(&baked.shape_keys[0]);

        for (vertex, expected) in original.iter().enumerate() {
            assert!((delta[vertex] - expected).norm() < EPSILON);
        }
    }

    #[test]
    fn given_weighted_mesh_when_baking_then_groups_follow_the_new_basis() {
        let mut mesh = grid(3, 3);
        mesh.ensure_vertex_group("jaw").add(0, 1.0, WeightMode::Add);
        mesh.ensure_vertex_group("jaw").add(1, 1.0, WeightMode::Add);
        let mesh = with_key(mesh, "Smile", Vector3::new(0.0, 0.1, 0.0), 0.0);

        let baked = bake_shape_keys(&mesh, &MultiresModifier::new("Multires", 1)).unwrap();

        let jaw = baked.vertex_group("jaw").unwrap();
        assert!(jaw.weights.len() > 2);
        assert_eq!(jaw.weight(0), Some(1.0));
    }

    #[test]
    fn given_callback_break_when_baking_then_cancelled_is_returned() {
        let mut mesh = with_key(grid(3, 3), "Blink_L", Vector3::new(0.0, 0.0, 0.1), 0.0);
        mesh = with_key(mesh, "Smile", Vector3::new(0.1, 0.0, 0.0), 0.0);
        let mut seen = Vec::new();

        let err = bake_shape_keys_with_progress(&mesh, &Identity, |progress| {
            seen.push((progress.index, progress.total, progress.name.to_string()));
            if progress.name == "Smile" {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap_err();

        assert_eq!(err, ConvertError::Cancelled);
        assert_eq!(
            seen,
            vec![(0, 2, "Blink_L".to_string()), (1, 2, "Smile".to_string())]
        );
    }

    #[test]
    fn given_position_dependent_deform_when_baking_then_topology_violation_is_returned() {
        let mesh = with_key(grid(3, 3), "Raise", Vector3::new(0.0, 2.0, 0.0), 0.0);

        let err = bake_shape_keys(&mesh, &PositionDependent).unwrap_err();

        assert!(matches!(err, ConvertError::TopologyViolation(ref message) if message.contains("Raise")));
    }

    #[test]
    fn given_mesh_without_keys_when_baking_then_geometry_is_deformed_once() {
        let mesh = grid(3, 3);
        let baked = bake_shape_keys(&mesh, &MultiresModifier::new("Multires", 1)).unwrap();

        assert!(baked.shape_keys.is_empty());
        assert_eq!(baked.faces.len(), mesh.faces.len() * 4);
    }

    #[test]
    fn given_custom_basis_name_when_baking_then_name_is_kept() {
        let mut mesh = with_key(grid(3, 3), "Smile", Vector3::new(0.0, 0.1, 0.0), 0.0);
        mesh.shape_keys[0].name = "Rest".to_string();

        let baked = bake_shape_keys(&mesh, &Identity).unwrap();
        assert_eq!(baked.shape_keys[0].name, "Rest");
    }
}

//! Midpoint subdivision used by the Multires deform.
//!
//! Edge vertices are allocated in face order, so the output topology is a
//! function of the face list alone. Two meshes that share faces but differ in
//! positions always subdivide into meshes with identical vertex indexing.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::mesh::{Mesh, VertexGroup};

/// Split every triangle into four, `iterations` times. Shape keys are not
/// carried over; vertex-group weights of new edge vertices are the mean of
/// the edge endpoints.
pub fn subdivide_midpoint(mesh: &Mesh, iterations: u32) -> Mesh {
    let mut current = Mesh {
        positions: mesh.positions.clone(),
        faces: mesh.faces.clone(),
        vertex_groups: mesh.vertex_groups.clone(),
        shape_keys: Vec::new(),
    };
    for _ in 0..iterations {
        current = subdivide_once(&current);
    }
    current
}

fn subdivide_once(mesh: &Mesh) -> Mesh {
    let mut positions = mesh.positions.clone();
    let mut faces = Vec::with_capacity(mesh.faces.len() * 4);
    let mut edge_midpoints: HashMap<(u32, u32), u32> = HashMap::new();
    // New vertex index → the edge it was created on, in creation order.
    let mut new_edges: Vec<(u32, u32)> = Vec::new();

    for &[v0, v1, v2] in &mesh.faces {
        let mut midpoint = |a: u32, b: u32| -> u32 {
            let edge = normalize_edge(a, b);
            if let Some(&index) = edge_midpoints.get(&edge) {
                return index;
            }
            let pa = mesh.positions[a as usize];
            let pb = mesh.positions[b as usize];
            let index = positions.len() as u32;
            positions.push((pa + pb) * 0.5);
            edge_midpoints.insert(edge, index);
            new_edges.push(edge);
            index
        };

        let m01 = midpoint(v0, v1);
        let m12 = midpoint(v1, v2);
        let m20 = midpoint(v2, v0);

        faces.push([v0, m01, m20]);
        faces.push([v1, m12, m01]);
        faces.push([v2, m20, m12]);
        faces.push([m01, m12, m20]);
    }

    let base = mesh.positions.len() as u32;
    let vertex_groups = mesh
        .vertex_groups
        .iter()
        .map(|group| interpolate_group(group, base, &new_edges))
        .collect();

    Mesh {
        positions,
        faces,
        vertex_groups,
        shape_keys: Vec::new(),
    }
}

fn interpolate_group(group: &VertexGroup, base: u32, new_edges: &[(u32, u32)]) -> VertexGroup {
    let mut weights: BTreeMap<u32, f32> = group.weights.clone();
    for (offset, &(a, b)) in new_edges.iter().enumerate() {
        let wa = group.weight(a);
        let wb = group.weight(b);
        if wa.is_none() && wb.is_none() {
            continue;
        }
        let mean = (wa.unwrap_or(0.0) + wb.unwrap_or(0.0)) * 0.5;
        weights.insert(base + offset as u32, mean);
    }
    VertexGroup {
        name: group.name.clone(),
        weights,
    }
}

/// Normalize edge so smaller vertex index comes first.
const fn normalize_edge(v0: u32, v1: u32) -> (u32, u32) {
    if v0 <= v1 { (v0, v1) } else { (v1, v0) }
}

/// Number of distinct edges in a face list. One subdivision round adds
/// exactly this many vertices.
pub fn edge_count(faces: &[[u32; 3]]) -> usize {
    let mut edges = HashSet::new();
    for &[a, b, c] in faces {
        edges.insert(normalize_edge(a, b));
        edges.insert(normalize_edge(b, c));
        edges.insert(normalize_edge(c, a));
    }
    edges.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::WeightMode;
    use nalgebra::Vector3;

    fn quad() -> Mesh {
        Mesh::new(
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(1.0, 1.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn given_quad_when_subdividing_once_then_shared_edge_gets_one_vertex() {
        let result = subdivide_midpoint(&quad(), 1);
        assert_eq!(result.faces.len(), 8);
        assert_eq!(result.positions.len(), 4 + edge_count(&quad().faces));
        assert_eq!(result.positions.len(), 9);
    }

    #[test]
    fn given_zero_iterations_when_subdividing_then_geometry_is_unchanged() {
        let mesh = quad();
        let result = subdivide_midpoint(&mesh, 0);
        assert_eq!(result.positions, mesh.positions);
        assert_eq!(result.faces, mesh.faces);
    }

    #[test]
    fn given_moved_vertex_when_subdividing_then_indexing_matches_original() {
        let mesh = quad();
        let mut moved = mesh.clone();
        moved.positions[2] = Vector3::new(3.0, 2.0, 1.0);

        let a = subdivide_midpoint(&mesh, 2);
        let b = subdivide_midpoint(&moved, 2);
        assert_eq!(a.positions.len(), b.positions.len());
        assert_eq!(a.faces, b.faces);
    }

    #[test]
    fn given_weighted_edge_when_subdividing_then_midpoint_weight_is_mean() {
        let mut mesh = quad();
        let group = mesh.ensure_vertex_group("jaw");
        group.add(0, 1.0, WeightMode::Replace);
        group.add(1, 0.5, WeightMode::Replace);

        let result = subdivide_midpoint(&mesh, 1);
        let jaw = result.vertex_group("jaw").unwrap();
        // First face edge (0, 1) creates vertex 4.
        assert!((jaw.weight(4).unwrap() - 0.75).abs() < 1e-6);
        assert!((result.positions[4] - Vector3::new(0.5, 0.0, 0.0)).norm() < 1e-6);
    }
}

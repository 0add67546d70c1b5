use std::collections::{BTreeMap, HashSet};

use crate::error::ConvertError;
use crate::mesh::{Mesh, WeightMode};
use crate::{log_debug, log_info, log_warn};

use super::types::{Severity, ValidationIssue, WeightTransfer};

// ─── Weight transfer ──────────────────────────────────────────────────────────

/// Add every weight of `source` into `target` and delete `source`.
///
/// The target group is created when absent. Returns `None` (and changes
/// nothing) when `source` has no group, which is normal for bones that never
/// deformed anything.
pub(crate) fn transfer_weights(mesh: &mut Mesh, source: &str, target: &str) -> Option<WeightTransfer> {
    if source == target {
        return None;
    }
    let source_group = mesh.remove_vertex_group(source)?;

    let target_group = mesh.ensure_vertex_group(target);
    let mut mass = 0.0;
    for (&vertex, &weight) in &source_group.weights {
        target_group.add(vertex, weight, WeightMode::Add);
        mass += weight;
    }

    log_debug!(
        "Moved {} weights ({:.4}) from '{}' to '{}'",
        source_group.weights.len(),
        mass,
        source,
        target
    );

    Some(WeightTransfer {
        source: source.to_string(),
        target: target.to_string(),
        vertices: source_group.weights.len(),
        mass,
    })
}

// ─── Deform prefix ────────────────────────────────────────────────────────────

/// Strip the deform-bone prefix from group names so they match the metarig
/// bones. A stripped name that is already taken is merged into that group.
pub(super) fn strip_deform_prefix(
    mesh: &mut Mesh,
    prefix: &str,
) -> (Vec<(String, String)>, Vec<ValidationIssue>) {
    let mut renamed = Vec::new();
    let mut issues = Vec::new();
    if prefix.is_empty() {
        return (renamed, issues);
    }

    let prefixed: Vec<String> = mesh
        .vertex_groups
        .iter()
        .filter(|group| group.name.starts_with(prefix))
        .map(|group| group.name.clone())
        .collect();

    for name in prefixed {
        let stripped = name[prefix.len()..].to_string();
        if stripped.is_empty() {
            continue;
        }
        if mesh.has_vertex_group(&stripped) {
            transfer_weights(mesh, &name, &stripped);
            log_warn!("Vertex group '{}' merged into existing '{}'", name, stripped);
            issues.push(ValidationIssue::new(
                Severity::Warning,
                "GROUP_MERGED",
                format!("vertex group '{}' merged into existing '{}'", name, stripped),
            ));
        } else if mesh.rename_vertex_group(&name, &stripped).is_err() {
            continue;
        }
        renamed.push((name, stripped));
    }

    (renamed, issues)
}

// ─── Rigid part remap ─────────────────────────────────────────────────────────

/// Pin rigid parts to a single group: every vertex of a source group leaves
/// all groups and joins its target at full weight.
pub(super) fn remap_rigid_groups(
    mesh: &mut Mesh,
    sources: &[String],
    targets: &[String],
) -> Result<(Vec<(String, String)>, Vec<ValidationIssue>), ConvertError> {
    if sources.len() != targets.len() {
        return Err(ConvertError::PreconditionViolation(format!(
            "rigid group remap needs paired lists: {} sources, {} targets",
            sources.len(),
            targets.len()
        )));
    }

    let mut remapped = Vec::new();
    let mut issues = Vec::new();

    for (source, target) in sources.iter().zip(targets) {
        let Some(group) = mesh.vertex_group(source) else {
            log_warn!("Rigid group '{}' not found, skipping", source);
            issues.push(ValidationIssue::new(
                Severity::Info,
                "MISSING_GROUP",
                format!("rigid group '{}' not found", source),
            ));
            continue;
        };
        let vertices: Vec<u32> = group.weights.keys().copied().collect();

        for &vertex in &vertices {
            mesh.remove_from_all_groups(vertex);
        }
        let target_group = mesh.ensure_vertex_group(target);
        for &vertex in &vertices {
            target_group.add(vertex, 1.0, WeightMode::Replace);
        }

        log_info!(
            "Pinned {} vertices of '{}' to '{}'",
            vertices.len(),
            source,
            target
        );
        remapped.push((source.clone(), target.clone()));
    }

    Ok((remapped, issues))
}

// ─── Split bone fusion ────────────────────────────────────────────────────────

/// Fold each secondary segment's weights into its primary segment. Bones are
/// left alone; only the secondary influence disappears.
pub(super) fn fuse_split_groups(mesh: &mut Mesh, pairs: &[(String, String)]) -> Vec<WeightTransfer> {
    pairs
        .iter()
        .filter_map(|(secondary, primary)| transfer_weights(mesh, secondary, primary))
        .collect()
}

// ─── Total weight limit ───────────────────────────────────────────────────────

/// Scale down every vertex whose summed weight over `bone_groups` exceeds
/// 1.0. Returns the number of adjusted vertices.
pub(super) fn limit_total_weights(mesh: &mut Mesh, bone_groups: &HashSet<&str>) -> usize {
    let mut totals: BTreeMap<u32, f32> = BTreeMap::new();
    for group in mesh
        .vertex_groups
        .iter()
        .filter(|group| bone_groups.contains(group.name.as_str()))
    {
        for (&vertex, &weight) in &group.weights {
            *totals.entry(vertex).or_insert(0.0) += weight;
        }
    }

    let over: BTreeMap<u32, f32> = totals
        .into_iter()
        .filter(|&(_, total)| total > 1.0 + 1e-6)
        .collect();
    if over.is_empty() {
        return 0;
    }

    for group in mesh
        .vertex_groups
        .iter_mut()
        .filter(|group| bone_groups.contains(group.name.as_str()))
    {
        for (vertex, weight) in group.weights.iter_mut() {
            if let Some(total) = over.get(vertex) {
                *weight /= total;
            }
        }
    }

    over.len()
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;

    use super::*;

    fn total_vertex_weight(mesh: &Mesh, vertex: u32) -> f32 {
        mesh.vertex_weights(vertex).iter().map(|(_, w)| w).sum()
    }

    fn mesh_with_groups(groups: &[(&str, &[(u32, f32)])]) -> Mesh {
        let mut mesh = Mesh::new(vec![Vector3::zeros(); 8], Vec::new());
        for (name, weights) in groups {
            let group = mesh.ensure_vertex_group(name);
            for &(vertex, weight) in *weights {
                group.add(vertex, weight, WeightMode::Replace);
            }
        }
        mesh
    }

    #[test]
    fn given_source_group_when_transferring_then_weights_are_added_and_source_removed() {
        let mut mesh = mesh_with_groups(&[("B", &[(5, 0.4)]), ("A", &[(5, 0.3), (1, 1.0)])]);

        let transfer = transfer_weights(&mut mesh, "B", "A").expect("transfer happens");

        assert!(!mesh.has_vertex_group("B"));
        let a = mesh.vertex_group("A").unwrap();
        assert!((a.weight(5).unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(a.weight(1), Some(1.0));
        assert_eq!(transfer.vertices, 1);
        assert!((transfer.mass - 0.4).abs() < 1e-6);
    }

    #[test]
    fn given_missing_target_when_transferring_then_target_is_created() {
        let mut mesh = mesh_with_groups(&[("nose.004", &[(2, 0.5)])]);
        transfer_weights(&mut mesh, "nose.004", "nose_master");
        assert_eq!(mesh.vertex_group("nose_master").unwrap().weight(2), Some(0.5));
    }

    #[test]
    fn given_unweighted_bone_when_transferring_then_nothing_happens() {
        let mut mesh = mesh_with_groups(&[("A", &[(0, 1.0)])]);
        let before = mesh.clone();
        assert!(transfer_weights(&mut mesh, "heel.02.L", "A").is_none());
        assert_eq!(mesh, before);
    }

    #[test]
    fn given_def_groups_when_stripping_prefix_then_names_match_bones() {
        let mut mesh = mesh_with_groups(&[
            ("DEF-spine", &[(0, 1.0)]),
            ("DEF-upper_arm.L.001", &[(1, 0.5)]),
            ("FIXED-teeth.T", &[(2, 1.0)]),
        ]);

        let (renamed, issues) = strip_deform_prefix(&mut mesh, "DEF-");

        assert_eq!(renamed.len(), 2);
        assert!(issues.is_empty());
        assert!(mesh.has_vertex_group("spine"));
        assert!(mesh.has_vertex_group("upper_arm.L.001"));
        assert!(mesh.has_vertex_group("FIXED-teeth.T"));
    }

    #[test]
    fn given_colliding_name_when_stripping_prefix_then_groups_are_merged() {
        let mut mesh = mesh_with_groups(&[("DEF-jaw", &[(0, 0.25)]), ("jaw", &[(0, 0.5)])]);

        let (_, issues) = strip_deform_prefix(&mut mesh, "DEF-");

        assert!(!mesh.has_vertex_group("DEF-jaw"));
        assert!((mesh.vertex_group("jaw").unwrap().weight(0).unwrap() - 0.75).abs() < 1e-6);
        assert_eq!(issues[0].code, "GROUP_MERGED");
    }

    #[test]
    fn given_teeth_blended_with_jaw_when_remapping_then_only_target_keeps_them() {
        let mut mesh = mesh_with_groups(&[
            ("FIXED-teeth.T", &[(1, 1.0), (2, 1.0), (3, 1.0)]),
            ("jaw", &[(1, 0.4), (2, 0.6), (3, 0.2), (4, 1.0)]),
            ("head", &[(3, 0.3)]),
        ]);

        let (remapped, issues) = remap_rigid_groups(
            &mut mesh,
            &["FIXED-teeth.T".to_string()],
            &["teeth.T".to_string()],
        )
        .unwrap();

        assert_eq!(remapped, vec![("FIXED-teeth.T".to_string(), "teeth.T".to_string())]);
        assert!(issues.is_empty());
        for vertex in [1, 2, 3] {
            assert_eq!(mesh.vertex_weights(vertex), vec![("teeth.T", 1.0)]);
        }
        assert_eq!(mesh.vertex_group("jaw").unwrap().weight(4), Some(1.0));
    }

    #[test]
    fn given_missing_rigid_group_when_remapping_then_pair_is_skipped() {
        let mut mesh = mesh_with_groups(&[("jaw", &[(0, 1.0)])]);
        let (remapped, issues) = remap_rigid_groups(
            &mut mesh,
            &["FIXED-teeth.B".to_string()],
            &["teeth.B".to_string()],
        )
        .unwrap();

        assert!(remapped.is_empty());
        assert_eq!(issues[0].code, "MISSING_GROUP");
        assert!(!mesh.has_vertex_group("teeth.B"));
    }

    #[test]
    fn given_unpaired_lists_when_remapping_then_precondition_error_is_returned() {
        let mut mesh = Mesh::default();
        let err = remap_rigid_groups(&mut mesh, &["a".to_string()], &[]).unwrap_err();
        assert!(matches!(err, ConvertError::PreconditionViolation(_)));
    }

    #[test]
    fn given_split_limb_when_fusing_then_primary_holds_total_mass() {
        let mut mesh = mesh_with_groups(&[
            ("upper_arm.L", &[(0, 0.6), (1, 0.3)]),
            ("upper_arm.L.001", &[(1, 0.7), (2, 1.0)]),
        ]);
        let before: f32 = mesh.vertex_groups.iter().map(|g| g.total_weight()).sum();

        let transfers = fuse_split_groups(
            &mut mesh,
            &[
                ("upper_arm.L.001".to_string(), "upper_arm.L".to_string()),
                ("upper_arm.R.001".to_string(), "upper_arm.R".to_string()),
            ],
        );

        assert_eq!(transfers.len(), 1);
        let primary = mesh.vertex_group("upper_arm.L").unwrap();
        assert!((primary.total_weight() - before).abs() < 1e-6);
        assert!(!mesh.has_vertex_group("upper_arm.L.001"));
        assert!(!mesh.has_vertex_group("upper_arm.R"));
    }

    #[test]
    fn given_overweighted_vertex_when_limiting_then_total_is_one() {
        let mut mesh = mesh_with_groups(&[
            ("spine", &[(0, 0.9), (1, 0.5)]),
            ("chest", &[(0, 0.6), (1, 0.5)]),
            ("FIXED-teeth.T", &[(0, 1.0)]),
        ]);
        let bones: HashSet<&str> = ["spine", "chest"].into_iter().collect();

        let adjusted = limit_total_weights(&mut mesh, &bones);

        assert_eq!(adjusted, 1);
        let spine = mesh.vertex_group("spine").unwrap().weight(0).unwrap();
        let chest = mesh.vertex_group("chest").unwrap().weight(0).unwrap();
        assert!((spine + chest - 1.0).abs() < 1e-6);
        assert!((total_vertex_weight(&mesh, 1) - 1.0).abs() < 1e-6);
        assert_eq!(mesh.vertex_group("FIXED-teeth.T").unwrap().weight(0), Some(1.0));
    }
}

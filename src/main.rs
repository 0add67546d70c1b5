use std::{env, ops::ControlFlow, path::PathBuf, process};

use anyhow::Context;
use rigify_export::convert::{
    Severity, convert_character_with_progress, diagnostic_log_path_for_output,
    write_conversion_diagnostic_log,
};
use rigify_export::logging::{ResultExt, init_logging};
use rigify_export::project::load_project_settings;
use rigify_export::scene::{load_scene, save_scene};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        eprintln!("Usage: rigify-export <scene.json> <settings.json> <output.json>");
        process::exit(2);
    }

    let scene_path = PathBuf::from(&args[1]);
    let settings_path = PathBuf::from(&args[2]);
    let output = PathBuf::from(&args[3]);

    init_logging(|record| eprintln!("{record}"));

    let mut scene = load_scene(&scene_path)?;
    let settings = load_project_settings(&settings_path)?;

    let report = convert_character_with_progress(&mut scene, &settings, |progress| {
        println!(
            "Baking shape key {}/{}: {}",
            progress.index + 1,
            progress.total,
            progress.name
        );
        ControlFlow::Continue(())
    })
    .log_error(Some("conversion failed"))
    .with_context(|| format!("failed to convert {}", scene_path.display()))?;

    save_scene(&output, &scene)?;
    let diagnostic_path = diagnostic_log_path_for_output(&output);
    write_conversion_diagnostic_log(&output, &diagnostic_path, &report)?;

    println!(
        "Rig: {} ({} -> {} bones)",
        report.output_rig_name, report.source_bone_count, report.bone_count
    );
    println!(
        "Mesh: {} ({} vertices, {} shape keys)",
        report.output_mesh_name,
        report.vertex_count,
        report.baked_shape_keys.len()
    );
    println!(
        "Removed bones: {}, fused groups: {}, remapped groups: {}",
        report.removed_bones.len(),
        report.fused_groups.len(),
        report.remapped_groups.len()
    );
    if let Some(level) = report.multires_level {
        println!("Multires applied at level {level}");
    }
    for issue in report.issues.iter().filter(|issue| issue.severity != Severity::Info) {
        println!("[{:?}] {}", issue.severity, issue.message);
    }
    println!("Diagnostic log: {}", diagnostic_path.display());

    Ok(())
}

//! Validate an edit document.

use std::path::PathBuf;

use montage_edit_model::EditProject;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating document at: {}", path.display());

    let project =
        EditProject::load(&path).map_err(|e| anyhow::anyhow!("Failed to load document: {e}"))?;

    println!("  Name: {}", project.name);
    println!("  Version: {}", project.version);
    println!("  Items: {}", project.item_count());

    let missing: Vec<String> = project
        .video_clips
        .iter()
        .map(|c| &c.path)
        .chain(project.audio_tracks.iter().map(|t| &t.path))
        .filter(|p| !source_path(&path, p).exists())
        .map(|p| format!("Missing media file: {}", p.display()))
        .collect();

    let issues = project.validate();
    if issues.is_empty() && missing.is_empty() {
        println!("  Sources: All present");
        println!("\nDocument is valid.");
        return Ok(());
    }

    println!("\nValidation issues:");
    for issue in issues.iter().chain(&missing) {
        println!("  - {issue}");
    }
    println!(
        "\n{} issue(s) found. Document may not render.",
        issues.len() + missing.len()
    );

    if issues.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("document has {} validation issue(s)", issues.len())
    }
}

/// Media paths are resolved against the document's directory.
fn source_path(document: &std::path::Path, media: &std::path::Path) -> PathBuf {
    match document.parent() {
        Some(dir) if media.is_relative() => dir.join(media),
        _ => media.to_path_buf(),
    }
}

use crate::artifact::ArtifactFormat;
use crate::definition::TestDefinition;
use std::path::{Path, PathBuf};

/// Lower-cases `name`, collapses every run of characters outside `[a-z0-9]`
/// into one underscore and trims underscores from both ends.
pub fn resolve_base_name(name: &str) -> String {
    let mut resolved = String::with_capacity(name.len());
    let mut pending_separator = false;

    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_separator && !resolved.is_empty() {
                resolved.push('_');
            }
            pending_separator = false;
            resolved.push(ch);
        } else {
            pending_separator = true;
        }
    }

    resolved
}

pub fn technique_dir(output_root: &Path, technique_id: &str) -> PathBuf {
    output_root.join(technique_id)
}

pub fn artifact_path(
    output_root: &Path,
    definition: &TestDefinition,
    format: ArtifactFormat,
) -> Option<PathBuf> {
    format
        .file_name(&definition.base_name(), definition.language)
        .map(|file_name| technique_dir(output_root, &definition.technique_id).join(file_name))
}

pub fn relative_artifact_path(definition: &TestDefinition, format: ArtifactFormat) -> Option<String> {
    format
        .file_name(&definition.base_name(), definition.language)
        .map(|file_name| format!("{}/{}", definition.technique_id, file_name))
}

pub fn bundle_identifier(technique_id: &str, base_name: &str) -> String {
    let technique = technique_id.to_ascii_lowercase().replace('.', "-");
    let base = base_name.replace('_', "-");
    format!("io.loas.{technique}.{base}")
}

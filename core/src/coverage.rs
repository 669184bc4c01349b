use crate::artifact::ArtifactFormat;
use crate::config::LayerConfig;
use crate::definition::{DefinitionKey, Language, TestDefinition};
use crate::naming::relative_artifact_path;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

pub const LAYER_FORMAT_VERSION: &str = "4.5";
pub const LAYER_DOMAIN: &str = "enterprise-attack";
pub const LAYER_PLATFORM: &str = "macOS";

/// Score buckets, lowest first: (minimum definition count, color, legend label).
const PALETTE: [(usize, &str, &str); 4] = [
    (1, "#c6dbef", "1 test"),
    (2, "#6baed6", "2 tests"),
    (3, "#3182bd", "3-4 tests"),
    (5, "#08519c", "5+ tests"),
];

#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("duplicate definition {key}: {first} and {second}")]
    DuplicateKey {
        key: DefinitionKey,
        first: String,
        second: String,
    },
    #[error("failed to serialize {what}: {reason}")]
    Serialize { what: &'static str, reason: String },
    #[error("failed to write {path}: {reason}")]
    Io { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageEntry {
    pub technique_id: String,
    pub technique_name: String,
    pub definitions: Vec<DefinitionKey>,
    pub unique_names: BTreeSet<String>,
    pub languages: BTreeMap<Language, usize>,
    pub elevation_required: usize,
    pub tcc_required: usize,
}

impl CoverageEntry {
    pub fn count(&self) -> usize {
        self.definitions.len()
    }

    fn language_summary(&self) -> String {
        self.languages
            .iter()
            .map(|(language, count)| format!("{count} {language}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub techniques: BTreeMap<String, CoverageEntry>,
}

impl Coverage {
    pub fn definition_count(&self) -> usize {
        self.techniques.values().map(CoverageEntry::count).sum()
    }

    pub fn max_count(&self) -> usize {
        self.techniques
            .values()
            .map(CoverageEntry::count)
            .max()
            .unwrap_or(0)
    }
}

/// Groups definitions by technique; a repeated (technique, test number) is fatal.
///
/// Input order does not matter: definitions are visited by key, so a
/// technique takes its name from its lowest-numbered test.
pub fn aggregate(definitions: &[TestDefinition]) -> Result<Coverage, AggregationError> {
    let mut ordered: Vec<&TestDefinition> = definitions.iter().collect();
    ordered.sort_by_key(|definition| definition.key());

    let mut seen: BTreeMap<DefinitionKey, &Path> = BTreeMap::new();
    let mut coverage = Coverage::default();

    for definition in ordered {
        let key = definition.key();
        if let Some(first) = seen.get(&key) {
            return Err(AggregationError::DuplicateKey {
                key,
                first: first.display().to_string(),
                second: definition.source.display().to_string(),
            });
        }
        seen.insert(key.clone(), &definition.source);

        let entry = coverage
            .techniques
            .entry(definition.technique_id.clone())
            .or_insert_with(|| CoverageEntry {
                technique_id: definition.technique_id.clone(),
                technique_name: definition.technique_name.clone(),
                definitions: Vec::new(),
                unique_names: BTreeSet::new(),
                languages: BTreeMap::new(),
                elevation_required: 0,
                tcc_required: 0,
            });
        if entry.technique_name != definition.technique_name {
            log::warn!(
                "{key}: technique name '{}' differs from '{}'; keeping the latter",
                definition.technique_name,
                entry.technique_name
            );
        }
        entry.definitions.push(key);
        entry.unique_names.insert(definition.name.clone());
        *entry.languages.entry(definition.language).or_insert(0) += 1;
        entry.elevation_required += usize::from(definition.elevation_required);
        entry.tcc_required += usize::from(definition.tcc_required);
    }

    Ok(coverage)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptIndexEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    pub description: String,
    pub command: String,
    pub language: Language,
    pub elevation_required: bool,
    pub tcc_required: bool,
    pub technique_id: String,
    pub technique_name: String,
    pub test_number: u32,
    pub base_name: String,
    pub artifacts: BTreeMap<ArtifactFormat, String>,
}

pub fn script_index(
    definitions: &[TestDefinition],
    formats: &[ArtifactFormat],
) -> Vec<ScriptIndexEntry> {
    let mut entries: Vec<ScriptIndexEntry> = definitions
        .iter()
        .map(|definition| ScriptIndexEntry {
            name: definition.name.clone(),
            guid: definition.guid.clone(),
            description: definition.description.clone(),
            command: definition.command.clone(),
            language: definition.language,
            elevation_required: definition.elevation_required,
            tcc_required: definition.tcc_required,
            technique_id: definition.technique_id.clone(),
            technique_name: definition.technique_name.clone(),
            test_number: definition.test_number,
            base_name: definition.base_name(),
            artifacts: formats
                .iter()
                .filter_map(|&format| {
                    relative_artifact_path(definition, format).map(|path| (format, path))
                })
                .collect(),
        })
        .collect();
    entries.sort_by(|a, b| {
        (a.technique_id.as_str(), a.test_number).cmp(&(b.technique_id.as_str(), b.test_number))
    });
    entries
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatorLayer {
    pub name: String,
    pub versions: LayerVersions,
    pub domain: String,
    pub description: String,
    pub filters: LayerFilters,
    pub sorting: u8,
    pub layout: LayerLayout,
    pub hide_disabled: bool,
    pub techniques: Vec<LayerTechnique>,
    pub gradient: LayerGradient,
    pub legend_items: Vec<LegendItem>,
    pub metadata: Vec<LayerMetadata>,
    pub links: Vec<LayerLink>,
    pub show_tactic_row_background: bool,
    pub tactic_row_background: String,
    pub select_techniques_across_tactics: bool,
    pub select_subtechniques_with_parent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerVersions {
    pub attack: String,
    pub navigator: String,
    pub layer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerFilters {
    pub platforms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerLayout {
    pub layout: String,
    pub aggregate_function: String,
    #[serde(rename = "showID")]
    pub show_id: bool,
    pub show_name: bool,
    pub show_aggregate_scores: bool,
    pub count_unscored: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerTechnique {
    #[serde(rename = "techniqueID")]
    pub technique_id: String,
    pub score: usize,
    pub color: String,
    pub comment: String,
    pub enabled: bool,
    pub metadata: Vec<LayerMetadata>,
    pub links: Vec<LayerLink>,
    pub show_subtechniques: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerMetadata {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerGradient {
    pub colors: Vec<String>,
    pub min_value: usize,
    pub max_value: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendItem {
    pub label: String,
    pub color: String,
}

pub fn bucket_color(count: usize) -> &'static str {
    PALETTE
        .iter()
        .rev()
        .find(|(minimum, _, _)| count >= *minimum)
        .map(|(_, color, _)| *color)
        .unwrap_or("#ffffff")
}

pub fn navigator_layer(coverage: &Coverage, config: &LayerConfig) -> NavigatorLayer {
    let techniques = coverage
        .techniques
        .values()
        .map(|entry| {
            let prefix = format!("{}.", entry.technique_id);
            let has_subtechniques = coverage.techniques.keys().any(|id| id.starts_with(&prefix));
            let count = entry.count();
            LayerTechnique {
                technique_id: entry.technique_id.clone(),
                score: count,
                color: bucket_color(count).to_string(),
                comment: format!(
                    "{count} test definition{} ({})",
                    if count == 1 { "" } else { "s" },
                    entry.language_summary()
                ),
                enabled: true,
                metadata: vec![
                    LayerMetadata {
                        name: "technique".to_string(),
                        value: entry.technique_name.clone(),
                    },
                    LayerMetadata {
                        name: "definitions".to_string(),
                        value: count.to_string(),
                    },
                    LayerMetadata {
                        name: "tests".to_string(),
                        value: entry
                            .unique_names
                            .iter()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join("; "),
                    },
                    LayerMetadata {
                        name: "languages".to_string(),
                        value: entry.language_summary(),
                    },
                    LayerMetadata {
                        name: "elevation required".to_string(),
                        value: entry.elevation_required.to_string(),
                    },
                    LayerMetadata {
                        name: "tcc required".to_string(),
                        value: entry.tcc_required.to_string(),
                    },
                ],
                links: Vec::new(),
                show_subtechniques: has_subtechniques,
            }
        })
        .collect();

    NavigatorLayer {
        name: config.name.clone(),
        versions: LayerVersions {
            attack: config.attack_version.clone(),
            navigator: config.navigator_version.clone(),
            layer: LAYER_FORMAT_VERSION.to_string(),
        },
        domain: LAYER_DOMAIN.to_string(),
        description: config.description.clone(),
        filters: LayerFilters {
            platforms: vec![LAYER_PLATFORM.to_string()],
        },
        sorting: 0,
        layout: LayerLayout {
            layout: "side".to_string(),
            aggregate_function: "average".to_string(),
            show_id: true,
            show_name: true,
            show_aggregate_scores: false,
            count_unscored: false,
        },
        hide_disabled: false,
        techniques,
        gradient: LayerGradient {
            colors: vec!["#ffffff".to_string(), PALETTE[PALETTE.len() - 1].1.to_string()],
            min_value: 0,
            max_value: coverage.max_count().max(1),
        },
        legend_items: PALETTE
            .iter()
            .map(|(_, color, label)| LegendItem {
                label: label.to_string(),
                color: color.to_string(),
            })
            .collect(),
        metadata: vec![
            LayerMetadata {
                name: "techniques".to_string(),
                value: coverage.techniques.len().to_string(),
            },
            LayerMetadata {
                name: "definitions".to_string(),
                value: coverage.definition_count().to_string(),
            },
        ],
        links: Vec::new(),
        show_tactic_row_background: false,
        tactic_row_background: "#dddddd".to_string(),
        select_techniques_across_tactics: true,
        select_subtechniques_with_parent: false,
    }
}

pub fn render_json<T: Serialize>(what: &'static str, value: &T) -> Result<String, AggregationError> {
    let mut text = serde_json::to_string_pretty(value).map_err(|err| AggregationError::Serialize {
        what,
        reason: err.to_string(),
    })?;
    text.push('\n');
    Ok(text)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportsWritten {
    pub scripts: usize,
    pub techniques: usize,
}

pub fn write_reports(
    definitions: &[TestDefinition],
    formats: &[ArtifactFormat],
    index_path: &Path,
    layer_path: &Path,
    config: &LayerConfig,
) -> Result<ReportsWritten, AggregationError> {
    let coverage = aggregate(definitions)?;
    let index = script_index(definitions, formats);
    let layer = navigator_layer(&coverage, config);

    write_file(index_path, &render_json("script index", &index)?)?;
    write_file(layer_path, &render_json("navigator layer", &layer)?)?;
    log::info!(
        "wrote {} scripts to {} and {} techniques to {}",
        index.len(),
        index_path.display(),
        coverage.techniques.len(),
        layer_path.display()
    );

    Ok(ReportsWritten {
        scripts: index.len(),
        techniques: coverage.techniques.len(),
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), AggregationError> {
    let io_error = |err: std::io::Error| AggregationError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, contents).map_err(io_error)
}

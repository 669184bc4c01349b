use crate::artifact::{ArtifactFormat, DefinitionBuild, FormatOutcome, FormatStatus};
use crate::compiler::Compiler;
use crate::config::BuildConfig;
use crate::coverage::{self, AggregationError, ReportsWritten};
use crate::definition::{parse_definition_file, DefinitionKey, Language, TestDefinition};
use crate::naming::artifact_path;
use crate::toolchain::Toolchain;
use crate::validation::{
    invalid_record_count, lint_record, validate_definition, KeyRegistry, ValidationError,
};
use comfy_table::{presets::ASCII_FULL, Table};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use time::OffsetDateTime;
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("definitions directory '{0}' does not exist")]
    MissingDefinitions(String),
    #[error("failed to walk {path}: {reason}")]
    Discovery { path: String, reason: String },
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error("failed to remove {path}: {reason}")]
    Clean { path: String, reason: String },
}

pub fn discover(root: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    if !root.is_dir() {
        return Err(PipelineError::MissingDefinitions(root.display().to_string()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| PipelineError::Discovery {
            path: root.display().to_string(),
            reason: err.to_string(),
        })?;
        let is_yaml = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if entry.file_type().is_file() && is_yaml {
            files.push(entry.into_path());
        }
    }
    files.sort();
    log::info!("discovered {} definition files under {}", files.len(), root.display());
    Ok(files)
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub files: usize,
    pub definitions: Vec<TestDefinition>,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            writeln!(f, "  - [error] {error}")?;
        }
        for warning in &self.warnings {
            writeln!(f, "  - [warn] {warning}")?;
        }
        write!(
            f,
            "Validated {} definitions from {} files: {} errors, {} warnings",
            self.definitions.len(),
            self.files,
            self.errors.len(),
            self.warnings.len()
        )
    }
}

pub fn validate_corpus(root: &Path) -> Result<ValidationReport, PipelineError> {
    let files = discover(root)?;
    let mut report = ValidationReport {
        files: files.len(),
        ..ValidationReport::default()
    };
    let mut registry = KeyRegistry::new();

    for path in &files {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                report.errors.push(ValidationError {
                    location: path.display().to_string(),
                    field: "<file>".to_string(),
                    reason: format!("unreadable: {err}"),
                });
                continue;
            }
        };
        let records = match parse_definition_file(path, &source) {
            Ok(records) => records,
            Err(err) => {
                report.errors.push(ValidationError::for_file(path, &err));
                continue;
            }
        };
        for record in &records {
            match validate_definition(record, &mut registry) {
                Ok(definition) => {
                    for warning in lint_record(record, &definition) {
                        log::warn!("{warning}");
                        report.warnings.push(warning);
                    }
                    report.definitions.push(definition);
                }
                Err(errors) => report.errors.extend(errors),
            }
        }
    }

    log::info!(
        "validation: {} valid definitions, {} errors",
        report.definitions.len(),
        report.errors.len()
    );
    Ok(report)
}

pub fn compile_all(
    compiler: &Compiler<'_>,
    definitions: &[TestDefinition],
    workers: usize,
    fail_fast: bool,
) -> Vec<DefinitionBuild> {
    let workers = workers.clamp(1, definitions.len().max(1));
    let cursor = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    let results: Mutex<Vec<(usize, DefinitionBuild)>> = Mutex::new(Vec::new());

    log::info!(
        "compiling {} definitions with {workers} workers",
        definitions.len()
    );
    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let index = cursor.fetch_add(1, Ordering::SeqCst);
                let Some(definition) = definitions.get(index) else {
                    break;
                };
                let build = compiler.compile(definition);
                if fail_fast && build.failures().next().is_some() {
                    log::warn!("{}: failed, not dispatching further definitions", build.key);
                    stop.store(true, Ordering::SeqCst);
                }
                if let Ok(mut results) = results.lock() {
                    results.push((index, build));
                }
            });
        }
    });

    let mut finished: Vec<Option<DefinitionBuild>> = vec![None; definitions.len()];
    for (index, build) in results.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()) {
        finished[index] = Some(build);
    }
    let mut builds: Vec<DefinitionBuild> = finished
        .into_iter()
        .zip(definitions)
        .map(|(build, definition)| build.unwrap_or_else(|| not_attempted(compiler, definition)))
        .collect();
    builds.sort_by(|a, b| a.key.cmp(&b.key));
    builds
}

fn not_attempted(compiler: &Compiler<'_>, definition: &TestDefinition) -> DefinitionBuild {
    DefinitionBuild {
        key: definition.key(),
        name: definition.name.clone(),
        base_name: definition.base_name(),
        outcomes: compiler
            .formats()
            .iter()
            .map(|&format| FormatOutcome::not_attempted(format))
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub started_at: String,
    pub finished_at: String,
    pub files: usize,
    pub valid_definitions: usize,
    pub validation_errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    pub aborted: bool,
    pub builds: Vec<DefinitionBuild>,
    pub reports: Option<ReportsWritten>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormatTally {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_attempted: usize,
}

impl BuildReport {
    /// Non-zero exit: any invalid definition, or a definition whose every attempt failed.
    pub fn has_failures(&self) -> bool {
        !self.validation_errors.is_empty()
            || self.builds.iter().any(DefinitionBuild::every_attempt_failed)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&DefinitionKey, &FormatOutcome)> {
        self.builds
            .iter()
            .flat_map(|build| build.failures().map(move |outcome| (&build.key, outcome)))
    }

    pub fn tally(&self) -> BTreeMap<ArtifactFormat, FormatTally> {
        let mut tally: BTreeMap<ArtifactFormat, FormatTally> = BTreeMap::new();
        for outcome in self.builds.iter().flat_map(|build| &build.outcomes) {
            let entry = tally.entry(outcome.format).or_default();
            match outcome.status {
                FormatStatus::Succeeded => entry.succeeded += 1,
                FormatStatus::Failed => entry.failed += 1,
                FormatStatus::Skipped => entry.skipped += 1,
                FormatStatus::NotAttempted => entry.not_attempted += 1,
            }
        }
        tally
    }

    pub fn summary_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(ASCII_FULL);
        table.set_header(vec![
            "format",
            "succeeded",
            "failed",
            "skipped",
            "not attempted",
        ]);
        for (format, counts) in self.tally() {
            table.add_row(vec![
                format.to_string(),
                counts.succeeded.to_string(),
                counts.failed.to_string(),
                counts.skipped.to_string(),
                counts.not_attempted.to_string(),
            ]);
        }
        table
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.validation_errors {
            writeln!(f, "  - [invalid] {error}")?;
        }
        if self.aborted {
            writeln!(
                f,
                "Build aborted: {} definitions failed validation (strict mode).",
                invalid_record_count(&self.validation_errors)
            )?;
            return Ok(());
        }
        if self.builds.is_empty() {
            writeln!(f, "No definitions to build.")?;
            return Ok(());
        }

        writeln!(f, "Build results:")?;
        let mut failures = self.failures().peekable();
        if failures.peek().is_none() {
            writeln!(f, "  all attempted formats succeeded")?;
        }
        for (key, outcome) in failures {
            writeln!(
                f,
                "  - [failed] {key} {}: {}",
                outcome.format,
                outcome.message.as_deref().unwrap_or("unknown error")
            )?;
        }
        writeln!(f, "{}", self.summary_table())?;
        if let Some(reports) = &self.reports {
            writeln!(
                f,
                "Indexed {} scripts across {} techniques.",
                reports.scripts, reports.techniques
            )?;
        }
        Ok(())
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

pub fn run_build(
    config: &BuildConfig,
    toolchain: &dyn Toolchain,
) -> Result<BuildReport, PipelineError> {
    let started_at = now_rfc3339();
    let validation = validate_corpus(&config.definitions_dir)?;

    let mut report = BuildReport {
        started_at,
        finished_at: String::new(),
        files: validation.files,
        valid_definitions: validation.definitions.len(),
        validation_errors: validation.errors,
        warnings: validation.warnings,
        aborted: false,
        builds: Vec::new(),
        reports: None,
    };

    if config.strict && !report.validation_errors.is_empty() {
        log::error!("strict mode: aborting after validation failures");
        report.aborted = true;
        report.finished_at = now_rfc3339();
        return Ok(report);
    }

    let compiler = Compiler::new(toolchain, &config.output_dir, &config.formats);
    report.builds = compile_all(
        &compiler,
        &validation.definitions,
        config.worker_count(),
        config.fail_fast,
    );

    report.reports = Some(coverage::write_reports(
        &validation.definitions,
        compiler.formats(),
        &config.index_path,
        &config.layer_path,
        &config.layer,
    )?);
    report.finished_at = now_rfc3339();
    Ok(report)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub files: usize,
    pub definitions: usize,
    pub invalid: usize,
    pub techniques: BTreeSet<String>,
    pub languages: BTreeMap<Language, usize>,
    pub artifacts: BTreeMap<ArtifactFormat, usize>,
}

impl CorpusStats {
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(ASCII_FULL);
        table.set_header(vec!["category", "count", "details"]);
        table.add_row(vec![
            "definition files".to_string(),
            self.files.to_string(),
            format!("across {} techniques", self.techniques.len()),
        ]);
        let languages = self
            .languages
            .iter()
            .map(|(language, count)| format!("{count} {language}"))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            "definitions".to_string(),
            self.definitions.to_string(),
            format!("{languages}; {} invalid", self.invalid),
        ]);
        for format in ArtifactFormat::ALL {
            table.add_row(vec![
                format!("{format} artifacts"),
                self.artifacts.get(&format).copied().unwrap_or(0).to_string(),
                "present in output".to_string(),
            ]);
        }
        table
    }
}

pub fn corpus_stats(definitions_dir: &Path, output_dir: &Path) -> Result<CorpusStats, PipelineError> {
    let validation = validate_corpus(definitions_dir)?;
    let mut stats = CorpusStats {
        files: validation.files,
        definitions: validation.definitions.len(),
        invalid: invalid_record_count(&validation.errors),
        ..CorpusStats::default()
    };
    for definition in &validation.definitions {
        stats.techniques.insert(definition.technique_id.clone());
        *stats.languages.entry(definition.language).or_insert(0) += 1;
        for format in ArtifactFormat::ALL {
            let present = artifact_path(output_dir, definition, format).is_some_and(|p| p.is_file());
            if present {
                *stats.artifacts.entry(format).or_insert(0) += 1;
            }
        }
    }
    Ok(stats)
}

pub fn clean(paths: &[&Path]) -> Result<Vec<PathBuf>, PipelineError> {
    let mut removed = Vec::new();
    for path in paths {
        if !path.exists() {
            continue;
        }
        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|err| PipelineError::Clean {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        log::info!("removed {}", path.display());
        removed.push(path.to_path_buf());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::fake::{Behavior, FakeToolchain};
    use crate::toolchain::Tool;
    use tempfile::{tempdir, TempDir};

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent");
        }
        fs::write(path, contents).expect("write");
    }

    fn record(name: &str, technique: &str, number: u32, language: &str) -> String {
        format!(
            "name: {name}\nlanguage: {language}\ndescription: {name} test\ncommand: return \"{name}\"\n\
             technique_id: \"{technique}\"\ntechnique_name: {technique} name\ntest_number: {number}\n"
        )
    }

    fn workspace() -> (TempDir, BuildConfig) {
        let dir = tempdir().expect("tempdir");
        let mut config = BuildConfig {
            definitions_dir: dir.path().join("yaml"),
            output_dir: dir.path().join("releases"),
            index_path: dir.path().join("data/scripts.json"),
            layer_path: dir.path().join("data/layer.json"),
            docs_dir: dir.path().join("docs"),
            jobs: Some(3),
            ..BuildConfig::default()
        };
        config.tool_timeout_secs = 5;
        (dir, config)
    }

    #[test]
    fn discovery_is_recursive_and_sorted() {
        let (dir, config) = workspace();
        let root = &config.definitions_dir;
        write(root, "T1115/b.yml", "x: 1");
        write(root, "T1005/a.yaml", "x: 1");
        write(root, "T1005/notes.txt", "ignored");
        write(root, "T1005/nested/c.yaml", "x: 1");

        let files = discover(root).expect("discover");
        let relative: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(root).expect("under root").display().to_string())
            .collect();
        assert_eq!(relative, ["T1005/a.yaml", "T1005/nested/c.yaml", "T1115/b.yml"]);

        assert!(matches!(
            discover(&dir.path().join("missing")),
            Err(PipelineError::MissingDefinitions(_))
        ));
    }

    #[test]
    fn validation_collects_errors_and_keeps_valid_records() {
        let (_dir, config) = workspace();
        let root = &config.definitions_dir;
        write(root, "T1005/one.yaml", &record("One", "T1005", 1, "AppleScript"));
        write(root, "T1005/dup.yaml", &record("Other", "T1005", 1, "AppleScript"));
        write(root, "T1005/broken.yaml", "name: [unclosed");
        write(
            root,
            "T1115/group.yaml",
            "name: Clipboard Data\ntests:\n  - name: Read\n    language: AppleScript\n    description: r\n    command: return the clipboard\n    colour: blue\n",
        );

        let report = validate_corpus(root).expect("validate");
        assert_eq!(report.files, 4);
        assert_eq!(report.definitions.len(), 2);
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.errors.iter().any(|e| e.field == "<file>"));
        assert!(report.errors.iter().any(|e| e.field == "test_number"));
        assert!(report.warnings.iter().any(|w| w.contains("unknown field 'colour'")));
        let grouped = report
            .definitions
            .iter()
            .find(|d| d.technique_id == "T1115")
            .expect("grouped record");
        assert_eq!(grouped.technique_name, "Clipboard Data");
        assert_eq!(grouped.test_number, 1);
    }

    #[test]
    fn build_reports_per_format_and_writes_aggregates() {
        let (_dir, config) = workspace();
        let root = &config.definitions_dir;
        write(root, "T1005/a.yaml", &record("Alpha", "T1005", 1, "AppleScript"));
        write(root, "T1005/b.yaml", &record("Beta", "T1005", 2, "JavaScript"));
        write(root, "T1115/c.yaml", &record("Gamma", "T1115", 1, "AppleScript"));

        let toolchain = FakeToolchain::new().with(Tool::NativeCompiler, Behavior::Fail);
        let report = run_build(&config, &toolchain).expect("build");

        assert!(!report.has_failures());
        assert_eq!(report.builds.len(), 3);
        let keys: Vec<String> = report.builds.iter().map(|b| b.key.to_string()).collect();
        assert_eq!(keys, ["T1005#1", "T1005#2", "T1115#1"]);

        let tally = report.tally();
        assert_eq!(tally[&ArtifactFormat::Binary].failed, 3);
        assert_eq!(tally[&ArtifactFormat::CompiledObject].succeeded, 2);
        assert_eq!(tally[&ArtifactFormat::CompiledObject].skipped, 1);
        assert_eq!(tally[&ArtifactFormat::ScriptFile].succeeded, 3);
        assert_eq!(report.failures().count(), 3);
        assert_eq!(
            report.reports,
            Some(ReportsWritten {
                scripts: 3,
                techniques: 2
            })
        );
        assert!(config.index_path.is_file());
        assert!(config.layer_path.is_file());

        let rendered = report.to_string();
        assert!(rendered.contains("[failed] T1005#1 binary:"));
        assert!(rendered.contains("compiled-object"));
    }

    #[test]
    fn every_attempt_failing_fails_the_run_and_strict_aborts() {
        let (_dir, mut config) = workspace();
        let root = &config.definitions_dir;
        write(root, "T1005/a.yaml", &record("Alpha", "T1005", 1, "AppleScript"));

        let toolchain = FakeToolchain::new()
            .with(Tool::ScriptCompiler, Behavior::Timeout)
            .with(Tool::Archiver, Behavior::Fail)
            .with(Tool::NativeCompiler, Behavior::Fail);
        let report = run_build(&config, &toolchain).expect("build");
        // The script file and the Swift source still succeed.
        assert!(!report.has_failures());
        assert_eq!(report.failures().count(), 3);

        // An output root that is a regular file fails every format.
        fs::remove_dir_all(&config.output_dir).expect("previous release tree");
        fs::write(&config.output_dir, "not a directory").expect("blocker");
        let report = run_build(&config, &FakeToolchain::new()).expect("build");
        assert!(report.builds[0].every_attempt_failed());
        assert!(report.has_failures());
        fs::remove_file(&config.output_dir).expect("unblock");

        write(root, "T1005/bad.yaml", "name: 42\nlanguage: Python\ntest_number: 0\n");
        config.strict = true;
        let report = run_build(&config, &FakeToolchain::new()).expect("build");
        assert!(report.aborted);
        assert!(report.validation_errors.len() > 1);
        assert!(report
            .to_string()
            .contains("Build aborted: 1 definitions failed validation"));
        assert!(report.builds.is_empty());
        assert!(report.reports.is_none());
        assert!(report.has_failures());
        assert!(report.to_string().contains("strict mode"));
    }

    #[test]
    fn index_keeps_elevation_and_tcc_flags() {
        let (_dir, mut config) = workspace();
        let root = &config.definitions_dir;
        write(
            root,
            "T1548/sudo.yaml",
            "name: Sudo Prompt\nlanguage: AppleScript\ndescription: Asks for a password\n\
             command: do shell script \"id\" with administrator privileges\n\
             technique_id: T1548\ntechnique_name: Abuse Elevation Control Mechanism\n\
             test_number: 1\nelevation_required: true\ntcc_required: false\n",
        );
        write(
            root,
            "T1115/read.yaml",
            "name: Read Clipboard\nlanguage: JavaScript\ndescription: Reads it\n\
             command: \"ObjC.import('AppKit')\"\ntechnique_id: T1115\n\
             technique_name: Clipboard Data\ntest_number: 1\ntcc_required: true\n",
        );
        config.formats = vec![ArtifactFormat::ScriptFile];
        run_build(&config, &FakeToolchain::new()).expect("build");

        let index: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&config.index_path).expect("index"))
                .expect("index is JSON");
        let entries = index.as_array().expect("index is an array");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["technique_id"], "T1115");
        assert_eq!(entries[0]["elevation_required"], false);
        assert_eq!(entries[0]["tcc_required"], true);
        assert_eq!(entries[1]["technique_id"], "T1548");
        assert_eq!(entries[1]["elevation_required"], true);
        assert_eq!(entries[1]["tcc_required"], false);
    }

    #[test]
    fn fail_fast_leaves_remaining_definitions_unattempted() {
        let (_dir, mut config) = workspace();
        let root = &config.definitions_dir;
        for number in 1..=4 {
            write(
                root,
                &format!("T1005/{number}.yaml"),
                &record(&format!("Test {number}"), "T1005", number, "AppleScript"),
            );
        }
        config.jobs = Some(1);
        config.fail_fast = true;

        let toolchain = FakeToolchain::new().with(Tool::Archiver, Behavior::Fail);
        let report = run_build(&config, &toolchain).expect("build");
        assert_eq!(report.builds.len(), 4);
        assert_eq!(report.builds[0].failures().count(), 1);
        for build in &report.builds[1..] {
            assert!(build
                .outcomes
                .iter()
                .all(|o| o.status == FormatStatus::NotAttempted));
        }
        assert_eq!(report.tally()[&ArtifactFormat::ScriptFile].not_attempted, 3);
    }

    #[test]
    fn parallel_results_do_not_depend_on_scheduling() {
        let (dir, mut config) = workspace();
        let root = &config.definitions_dir;
        for number in 1..=12 {
            write(
                root,
                &format!("T{:04}/{number}.yaml", 1000 + number % 3),
                &record(&format!("Test {number}"), &format!("T{:04}", 1000 + number % 3), number, "AppleScript"),
            );
        }
        config.formats = vec![ArtifactFormat::ScriptFile, ArtifactFormat::TranspiledSource];

        config.jobs = Some(1);
        let serial = run_build(&config, &FakeToolchain::new()).expect("serial");
        let serial_index = fs::read(&config.index_path).expect("index");

        config.jobs = Some(6);
        config.output_dir = dir.path().join("parallel");
        let parallel = run_build(&config, &FakeToolchain::new()).expect("parallel");
        let parallel_index = fs::read(&config.index_path).expect("index");

        let keys = |report: &BuildReport| -> Vec<DefinitionKey> {
            report.builds.iter().map(|b| b.key.clone()).collect()
        };
        assert_eq!(keys(&serial), keys(&parallel));
        assert_eq!(serial.tally(), parallel.tally());
        assert_eq!(serial_index, parallel_index);
    }

    #[test]
    fn stats_count_present_artifacts_and_clean_removes_trees() {
        let (_dir, mut config) = workspace();
        let root = &config.definitions_dir;
        write(root, "T1005/a.yaml", &record("Alpha", "T1005", 1, "AppleScript"));
        write(root, "T1115/b.yaml", &record("Beta", "T1115", 1, "JavaScript"));
        write(root, "T1115/broken.yaml", "name: 42\nlanguage: Python\n");
        config.formats = vec![ArtifactFormat::ScriptFile];
        run_build(&config, &FakeToolchain::new()).expect("build");

        let stats = corpus_stats(root, &config.output_dir).expect("stats");
        assert_eq!(stats.files, 3);
        assert_eq!(stats.definitions, 2);
        assert_eq!(stats.invalid, 1);
        assert_eq!(stats.techniques.len(), 2);
        assert_eq!(stats.artifacts.get(&ArtifactFormat::ScriptFile), Some(&2));
        assert_eq!(stats.artifacts.get(&ArtifactFormat::Binary), None);
        assert!(stats.table().to_string().contains("definition files"));

        let removed = clean(&[config.output_dir.as_path(), Path::new("/nonexistent/loas")])
            .expect("clean");
        assert_eq!(removed, vec![config.output_dir.clone()]);
        assert!(!config.output_dir.exists());
    }
}

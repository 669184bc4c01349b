use crate::artifact::ArtifactFormat;
use crate::definition::{Language, TestDefinition};
use crate::naming::relative_artifact_path;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const LANGUAGE_GUIDE: &str = "https://developer.apple.com/library/archive/documentation/AppleScript/Conceptual/AppleScriptLangGuide/introduction/ASLR_intro.html";

#[derive(Debug, thiserror::Error)]
#[error("failed to write {path}: {reason}")]
pub struct DocsError {
    pub path: String,
    pub reason: String,
}

pub fn write_docs(definitions: &[TestDefinition], docs_dir: &Path) -> Result<Vec<PathBuf>, DocsError> {
    let io_error = |path: &Path| {
        let path = path.display().to_string();
        move |err: std::io::Error| DocsError {
            path,
            reason: err.to_string(),
        }
    };

    let mut grouped: BTreeMap<&str, Vec<&TestDefinition>> = BTreeMap::new();
    for definition in definitions {
        grouped
            .entry(definition.technique_id.as_str())
            .or_default()
            .push(definition);
    }

    fs::create_dir_all(docs_dir).map_err(io_error(docs_dir))?;
    let mut written = Vec::with_capacity(grouped.len());
    for (technique_id, mut tests) in grouped {
        tests.sort_by_key(|definition| definition.test_number);
        let path = docs_dir.join(format!("{technique_id}.mdx"));
        fs::write(&path, technique_page(&tests)).map_err(io_error(&path))?;
        log::debug!("wrote {}", path.display());
        written.push(path);
    }
    log::info!("generated {} technique pages in {}", written.len(), docs_dir.display());
    Ok(written)
}

pub fn technique_page(tests: &[&TestDefinition]) -> String {
    let Some(first) = tests.first() else {
        return String::new();
    };
    let technique_id = &first.technique_id;
    let mut lines: Vec<String> = vec![
        "---".to_string(),
        format!("title: {technique_id}"),
        format!(
            "description: \"{}\"",
            first.technique_name.replace(':', " ").replace('"', "'")
        ),
        "---".to_string(),
        String::new(),
        "## Description".to_string(),
        String::new(),
        format!(
            "{} ({technique_id}) on macOS, exercised with {} AppleScript/JXA test{}.",
            first.technique_name,
            tests.len(),
            if tests.len() == 1 { "" } else { "s" }
        ),
        String::new(),
        "## Atomic Tests".to_string(),
        String::new(),
    ];

    for (position, test) in tests.iter().enumerate() {
        lines.push(format!("### Atomic Test #{} - {}", test.test_number, test.name));
        lines.push(String::new());
        lines.push(test.description.trim().to_string());
        lines.push(String::new());
        if let Some(guid) = &test.guid {
            lines.push(format!("**GUID:** `{guid}`"));
            lines.push(String::new());
        }

        if test.elevation_required || test.tcc_required {
            lines.push("**Requirements:**".to_string());
            lines.push(String::new());
            if test.elevation_required {
                lines.push("- Elevation Required: Yes".to_string());
            }
            if test.tcc_required {
                lines.push("- TCC Required: Yes".to_string());
            }
            lines.push(String::new());
        }

        if !test.args.is_empty() {
            lines.push("**Input Arguments:**".to_string());
            lines.push(String::new());
            lines.push("| Argument | Type | Default Value |".to_string());
            lines.push("|----------|------|---------------|".to_string());
            for arg in &test.args {
                lines.push(format!(
                    "| {} | {} | `{}` |",
                    arg.name,
                    arg.default.type_name(),
                    arg.default
                ));
            }
            lines.push(String::new());
        }

        let display = display_command(test);
        let fence = match test.language {
            Language::AppleScript => "applescript",
            Language::JavaScript => "javascript",
        };
        lines.push(format!("```{fence} tab=\"<Code /> Script\""));
        lines.push(display.trim_end().to_string());
        lines.push("```".to_string());
        lines.push(String::new());

        lines.push("```bash tab=\"<Terminal /> Execution\"".to_string());
        lines.extend(execution_lines(test, &display));
        lines.push("```".to_string());
        lines.push(String::new());

        if position + 1 < tests.len() {
            lines.push("---".to_string());
            lines.push(String::new());
        }
    }

    lines.push("## References".to_string());
    lines.push(String::new());
    lines.push(format!(
        "- [MITRE ATT&CK {technique_id}](https://attack.mitre.org/techniques/{}/)",
        technique_id.replace('.', "/")
    ));
    lines.push(format!("- [AppleScript Language Guide]({LANGUAGE_GUIDE})"));
    lines.push(String::new());
    lines.join("\n")
}

fn display_command(test: &TestDefinition) -> String {
    test.args.iter().fold(test.command.clone(), |command, arg| {
        command.replace(&format!("#{{{}}}", arg.name), &arg.default.to_string())
    })
}

fn execution_lines(test: &TestDefinition, display: &str) -> Vec<String> {
    let flags = test
        .language
        .osa_flags()
        .iter()
        .map(|flag| format!("{flag} "))
        .collect::<String>();
    let inline = display
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("-e {}", shell_quote(line)))
        .collect::<Vec<_>>()
        .join(" ");

    if test.args.is_empty() {
        return vec![format!("osascript {flags}{inline}")];
    }

    let script = relative_artifact_path(test, ArtifactFormat::ScriptFile).unwrap_or_default();
    let custom = test
        .args
        .iter()
        .map(|arg| shell_quote(&arg.default.to_string()))
        .collect::<Vec<_>>()
        .join(" ");
    vec![
        "# Execute with default arguments".to_string(),
        format!("osascript {flags}{inline}"),
        String::new(),
        "# Or run the release script, optionally with custom arguments".to_string(),
        format!("osascript {script}"),
        format!("osascript {script} {custom}"),
        format!("osascript {script} -h"),
    ]
}

fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}

use crate::compiler::CompilationError;
use crate::definition::{DefinitionKey, Language};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactFormat {
    ScriptFile,
    CompiledObject,
    TranspiledSource,
    AppBundle,
    Binary,
}

impl ArtifactFormat {
    pub const ALL: [ArtifactFormat; 5] = [
        ArtifactFormat::ScriptFile,
        ArtifactFormat::CompiledObject,
        ArtifactFormat::TranspiledSource,
        ArtifactFormat::AppBundle,
        ArtifactFormat::Binary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactFormat::ScriptFile => "script-file",
            ArtifactFormat::CompiledObject => "compiled-object",
            ArtifactFormat::TranspiledSource => "transpiled-source",
            ArtifactFormat::AppBundle => "app-bundle",
            ArtifactFormat::Binary => "binary",
        }
    }

    pub fn is_eligible(&self, language: Language) -> bool {
        !matches!(
            (self, language),
            (ArtifactFormat::CompiledObject, Language::JavaScript)
        )
    }

    /// Suffix appended to the base name; `None` when the format is not legal for the dialect.
    pub fn extension(&self, language: Language) -> Option<&'static str> {
        if !self.is_eligible(language) {
            return None;
        }
        let extension = match (self, language) {
            (ArtifactFormat::ScriptFile, Language::AppleScript) => ".applescript",
            (ArtifactFormat::ScriptFile, Language::JavaScript) => ".js",
            (ArtifactFormat::CompiledObject, _) => ".scpt",
            (ArtifactFormat::TranspiledSource, _) => ".swift",
            (ArtifactFormat::AppBundle, _) => ".app.zip",
            (ArtifactFormat::Binary, _) => "",
        };
        Some(extension)
    }

    pub fn file_name(&self, base_name: &str, language: Language) -> Option<String> {
        self.extension(language)
            .map(|extension| format!("{base_name}{extension}"))
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == value)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(ArtifactFormat::as_str).collect();
                format!("unknown format '{value}' (expected one of {})", known.join(", "))
            })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FormatStatus {
    Succeeded,
    Failed,
    Skipped,
    NotAttempted,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatOutcome {
    pub format: ArtifactFormat,
    pub status: FormatStatus,
    pub output_path: Option<String>,
    pub message: Option<String>,
    #[serde(skip)]
    pub error: Option<CompilationError>,
}

impl FormatOutcome {
    pub fn succeeded(format: ArtifactFormat, output_path: String, message: Option<String>) -> Self {
        Self {
            format,
            status: FormatStatus::Succeeded,
            output_path: Some(output_path),
            message,
            error: None,
        }
    }

    pub fn failed(format: ArtifactFormat, error: CompilationError) -> Self {
        Self {
            format,
            status: FormatStatus::Failed,
            output_path: None,
            message: Some(error.to_string()),
            error: Some(error),
        }
    }

    pub fn skipped(format: ArtifactFormat, reason: impl Into<String>) -> Self {
        Self {
            format,
            status: FormatStatus::Skipped,
            output_path: None,
            message: Some(reason.into()),
            error: None,
        }
    }

    pub fn not_attempted(format: ArtifactFormat) -> Self {
        Self {
            format,
            status: FormatStatus::NotAttempted,
            output_path: None,
            message: Some("not attempted (fail-fast)".to_string()),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FormatStatus::Succeeded
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DefinitionBuild {
    pub key: DefinitionKey,
    pub name: String,
    pub base_name: String,
    pub outcomes: Vec<FormatOutcome>,
}

impl DefinitionBuild {
    pub fn outcome(&self, format: ArtifactFormat) -> Option<&FormatOutcome> {
        self.outcomes.iter().find(|outcome| outcome.format == format)
    }

    pub fn failures(&self) -> impl Iterator<Item = &FormatOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == FormatStatus::Failed)
    }

    pub fn every_attempt_failed(&self) -> bool {
        let mut attempted = self
            .outcomes
            .iter()
            .filter(|outcome| {
                matches!(outcome.status, FormatStatus::Succeeded | FormatStatus::Failed)
            })
            .peekable();
        attempted.peek().is_some() && attempted.all(|outcome| !outcome.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn javascript_cannot_be_compiled_to_an_object() {
        assert!(!ArtifactFormat::CompiledObject.is_eligible(Language::JavaScript));
        assert_eq!(
            ArtifactFormat::CompiledObject.file_name("x", Language::JavaScript),
            None
        );
        assert_eq!(
            ArtifactFormat::ScriptFile.file_name("x", Language::JavaScript),
            Some("x.js".to_string())
        );
        assert_eq!(
            ArtifactFormat::Binary.file_name("x", Language::AppleScript),
            Some("x".to_string())
        );
    }

    #[test]
    fn parses_kebab_case_names() {
        assert_eq!(
            "app-bundle".parse::<ArtifactFormat>(),
            Ok(ArtifactFormat::AppBundle)
        );
        assert!("zip".parse::<ArtifactFormat>().is_err());
    }

    #[test]
    fn every_attempt_failed_ignores_skipped_formats() {
        let key = DefinitionKey {
            technique_id: "T1005".to_string(),
            test_number: 1,
        };
        let mut build = DefinitionBuild {
            key,
            name: "x".to_string(),
            base_name: "x".to_string(),
            outcomes: vec![
                FormatOutcome::skipped(ArtifactFormat::CompiledObject, "ineligible"),
                FormatOutcome::failed(
                    ArtifactFormat::Binary,
                    CompilationError::DependencyFailed {
                        dependency: ArtifactFormat::TranspiledSource,
                    },
                ),
            ],
        };
        assert!(build.every_attempt_failed());

        build.outcomes.push(FormatOutcome::succeeded(
            ArtifactFormat::ScriptFile,
            "T1005/x.applescript".to_string(),
            None,
        ));
        assert!(!build.every_attempt_failed());
    }
}

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Language {
    AppleScript,
    JavaScript,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::AppleScript, Language::JavaScript];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::AppleScript => "AppleScript",
            Language::JavaScript => "JavaScript",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|language| language.as_str() == value)
    }

    pub fn osa_flags(&self) -> &'static [&'static str] {
        match self {
            Language::AppleScript => &[],
            Language::JavaScript => &["-l", "JavaScript"],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

impl ArgValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ArgValue::Bool(_) => "bool",
            ArgValue::Integer(_) => "int",
            ArgValue::String(_) => "str",
        }
    }

    pub fn applescript_literal(&self) -> String {
        match self {
            ArgValue::Bool(value) => value.to_string(),
            ArgValue::Integer(value) => value.to_string(),
            ArgValue::String(value) => format!("\"{}\"", escape_applescript(value)),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(value) => write!(f, "{value}"),
            ArgValue::Integer(value) => write!(f, "{value}"),
            ArgValue::String(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: String,
    pub default: ArgValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DefinitionKey {
    pub technique_id: String,
    pub test_number: u32,
}

impl fmt::Display for DefinitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.technique_id, self.test_number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestDefinition {
    pub name: String,
    pub language: Language,
    pub description: String,
    pub command: String,
    pub technique_id: String,
    pub technique_name: String,
    pub elevation_required: bool,
    pub tcc_required: bool,
    pub test_number: u32,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    #[serde(default)]
    pub guid: Option<String>,
    pub source: PathBuf,
}

impl TestDefinition {
    pub fn key(&self) -> DefinitionKey {
        DefinitionKey {
            technique_id: self.technique_id.clone(),
            test_number: self.test_number,
        }
    }

    pub fn base_name(&self) -> String {
        crate::naming::resolve_base_name(&self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDefaults {
    pub technique_id: Option<String>,
    pub technique_name: Option<String>,
    pub test_number: Option<u32>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RawRecord {
    pub source: PathBuf,
    /// Human-readable position, e.g. `yaml/T1005/clipboard.yaml > tests[1]`.
    pub location: String,
    pub fields: Mapping,
    pub defaults: RecordDefaults,
}

impl RawRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn directory_name(&self) -> Option<String> {
        directory_name(&self.source)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("invalid YAML: {0}")]
    InvalidYaml(String),
    #[error("invalid definition file: {0}")]
    InvalidShape(String),
}

pub fn parse_definition_file(path: &Path, source: &str) -> Result<Vec<RawRecord>, ParseError> {
    let document: Value =
        serde_yaml::from_str(source).map_err(|err| ParseError::InvalidYaml(err.to_string()))?;
    let display = path.display().to_string();

    let mapping = match document {
        Value::Mapping(mapping) => mapping,
        Value::Null => return Err(ParseError::InvalidShape("file is empty".to_string())),
        other => {
            return Err(ParseError::InvalidShape(format!(
                "expected a mapping at the top level, found {}",
                value_kind(&other)
            )))
        }
    };

    let tests = match mapping.get("tests") {
        None => {
            return Ok(vec![RawRecord {
                source: path.to_path_buf(),
                location: display,
                fields: mapping,
                defaults: RecordDefaults::default(),
            }])
        }
        Some(Value::Sequence(tests)) => tests,
        Some(other) => {
            return Err(ParseError::InvalidShape(format!(
                "'tests' must be a list, found {}",
                value_kind(other)
            )))
        }
    };

    if tests.is_empty() {
        return Err(ParseError::InvalidShape("'tests' list is empty".to_string()));
    }

    let technique_id = mapping
        .get("technique_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| directory_name(path));
    let technique_name = mapping
        .get("technique_name")
        .or_else(|| mapping.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut records = Vec::with_capacity(tests.len());
    for (index, test) in tests.iter().enumerate() {
        let location = format!("{display} > tests[{index}]");
        let fields = match test {
            Value::Mapping(fields) => fields.clone(),
            other => {
                return Err(ParseError::InvalidShape(format!(
                    "{location} must be a mapping, found {}",
                    value_kind(other)
                )))
            }
        };
        let description = generated_description(&fields);
        records.push(RawRecord {
            source: path.to_path_buf(),
            location,
            fields,
            defaults: RecordDefaults {
                technique_id: technique_id.clone(),
                technique_name: technique_name.clone(),
                test_number: u32::try_from(index + 1).ok(),
                description,
            },
        });
    }

    Ok(records)
}

fn generated_description(fields: &Mapping) -> Option<String> {
    let name = fields.get("name").and_then(Value::as_str)?;
    let language = fields.get("language").and_then(Value::as_str)?;
    Some(format!("This test {} using {language}.", name.to_lowercase()))
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn directory_name(path: &Path) -> Option<String> {
    path.parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

pub(crate) fn escape_applescript(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

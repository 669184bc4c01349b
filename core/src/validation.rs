use crate::definition::{
    value_kind, ArgSpec, ArgValue, DefinitionKey, Language, ParseError, RawRecord, TestDefinition,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::LazyLock;

static TECHNIQUE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^T\d{4}(\.\d{3})?$").expect("technique id pattern"));

pub(crate) static GUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("guid pattern")
});

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"));

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\{([^}]*)\}").expect("placeholder pattern"));

const KNOWN_FIELDS: &[&str] = &[
    "name",
    "language",
    "description",
    "command",
    "technique_id",
    "technique_name",
    "elevation_required",
    "tcc_required",
    "test_number",
    "args",
    "guid",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("{location}: {field}: {reason}")]
pub struct ValidationError {
    pub location: String,
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(location: &str, field: &str, reason: impl Into<String>) -> Self {
        Self {
            location: location.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn for_file(path: &Path, err: &ParseError) -> Self {
        Self::new(&path.display().to_string(), "<file>", err.to_string())
    }
}

/// Number of records (or whole files) with at least one violation.
pub fn invalid_record_count(errors: &[ValidationError]) -> usize {
    errors
        .iter()
        .map(|error| error.location.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

#[derive(Debug, Default)]
pub struct KeyRegistry {
    keys: BTreeMap<DefinitionKey, String>,
    names: BTreeMap<(String, String), String>,
    guids: BTreeMap<String, String>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn claim(&mut self, definition: &TestDefinition, location: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let key = definition.key();
        let name_key = (definition.technique_id.clone(), definition.base_name());

        if let Some(first) = self.keys.get(&key) {
            errors.push(ValidationError::new(
                location,
                "test_number",
                format!(
                    "duplicate test number {} for technique {} (first defined at {first})",
                    key.test_number, key.technique_id
                ),
            ));
        } else if let Some(first) = self.names.get(&name_key) {
            // A full duplicate is reported once, against its key.
            errors.push(ValidationError::new(
                location,
                "name",
                format!(
                    "resolves to artifact name '{}' already used under {} (first defined at {first})",
                    name_key.1, name_key.0
                ),
            ));
        }

        if let Some(guid) = &definition.guid {
            if let Some(first) = self.guids.get(guid) {
                errors.push(ValidationError::new(
                    location,
                    "guid",
                    format!("duplicate guid {guid} (first defined at {first})"),
                ));
            }
        }

        if errors.is_empty() {
            self.keys.insert(key, location.to_string());
            self.names.insert(name_key, location.to_string());
            if let Some(guid) = &definition.guid {
                self.guids.insert(guid.clone(), location.to_string());
            }
        }

        errors
    }
}

pub fn validate_definition(
    record: &RawRecord,
    registry: &mut KeyRegistry,
) -> Result<TestDefinition, Vec<ValidationError>> {
    let definition = validate_record(record)?;
    let collisions = registry.claim(&definition, &record.location);
    if collisions.is_empty() {
        Ok(definition)
    } else {
        Err(collisions)
    }
}

pub fn validate_record(record: &RawRecord) -> Result<TestDefinition, Vec<ValidationError>> {
    let mut ctx = RecordContext::new(record);

    let name = ctx.required_string("name", None);
    let language = ctx.language();
    let description = ctx.required_string("description", record.defaults.description.as_deref());
    let command = ctx.required_string("command", None);
    let technique_id = ctx.required_string("technique_id", record.defaults.technique_id.as_deref());
    let technique_name =
        ctx.required_string("technique_name", record.defaults.technique_name.as_deref());
    let elevation_required = ctx.optional_bool("elevation_required");
    let tcc_required = ctx.optional_bool("tcc_required");
    let test_number = ctx.test_number();
    let args = ctx.args();
    let guid = ctx.guid();

    if let Some(name) = &name {
        if name.trim().is_empty() {
            ctx.error("name", "cannot be empty");
        } else if crate::naming::resolve_base_name(name).is_empty() {
            ctx.error(
                "name",
                format!("'{name}' resolves to an empty artifact name; include letters or digits"),
            );
        }
    }

    if let Some(id) = &technique_id {
        if !TECHNIQUE_ID_RE.is_match(id) {
            ctx.error(
                "technique_id",
                format!("'{id}' is not an ATT&CK technique id (expected T#### or T####.###)"),
            );
        }
    }

    if let Some(command) = &command {
        if command.trim().is_empty() {
            ctx.error("command", "cannot be empty");
        } else if let Some(args) = &args {
            let declared: HashSet<&str> = args.iter().map(|arg| arg.name.as_str()).collect();
            for capture in PLACEHOLDER_RE.captures_iter(command) {
                let placeholder = capture.get(1).map_or("", |m| m.as_str());
                if !declared.contains(placeholder) {
                    ctx.error(
                        "command",
                        format!("placeholder '#{{{placeholder}}}' does not match a declared argument"),
                    );
                }
            }
        }
    }

    if !ctx.errors.is_empty() {
        return Err(ctx.errors);
    }

    match (
        name,
        language,
        description,
        command,
        technique_id,
        technique_name,
        test_number,
        args,
    ) {
        (
            Some(name),
            Some(language),
            Some(description),
            Some(command),
            Some(technique_id),
            Some(technique_name),
            Some(test_number),
            Some(args),
        ) => Ok(TestDefinition {
            name,
            language,
            description,
            command,
            technique_id,
            technique_name,
            elevation_required,
            tcc_required,
            test_number,
            args,
            guid,
            source: record.source.clone(),
        }),
        _ => Err(vec![ValidationError::new(
            &record.location,
            "<record>",
            "incomplete record",
        )]),
    }
}

pub fn lint_record(record: &RawRecord, definition: &TestDefinition) -> Vec<String> {
    let mut warnings = Vec::new();

    for key in record.fields.keys() {
        match key.as_str() {
            Some(field) if KNOWN_FIELDS.contains(&field) => {}
            Some(field) => warnings.push(format!(
                "{}: unknown field '{field}'; it will be ignored",
                record.location
            )),
            None => warnings.push(format!("{}: non-string field name", record.location)),
        }
    }

    for arg in &definition.args {
        if !definition.command.contains(&format!("#{{{}}}", arg.name)) {
            warnings.push(format!(
                "{}: argument '{}' is never referenced by the command",
                record.location, arg.name
            ));
        }
    }

    if let Some(directory) = record.directory_name() {
        if TECHNIQUE_ID_RE.is_match(&directory) && directory != definition.technique_id {
            warnings.push(format!(
                "{}: technique_id {} does not match directory {directory}",
                record.location, definition.technique_id
            ));
        }
    }

    warnings
}

struct RecordContext<'a> {
    record: &'a RawRecord,
    errors: Vec<ValidationError>,
}

impl<'a> RecordContext<'a> {
    fn new(record: &'a RawRecord) -> Self {
        Self {
            record,
            errors: Vec::new(),
        }
    }

    fn error(&mut self, field: &str, reason: impl Into<String>) {
        let err = ValidationError::new(&self.record.location, field, reason);
        self.errors.push(err);
    }

    fn required_string(&mut self, field: &str, fallback: Option<&str>) -> Option<String> {
        match self.record.get(field) {
            Some(Value::String(value)) => Some(value.clone()),
            Some(Value::Null) | None => match fallback {
                Some(value) => Some(value.to_string()),
                None => {
                    self.error(field, "is required");
                    None
                }
            },
            Some(other) => {
                let kind = value_kind(other);
                self.error(field, format!("must be a string, found {kind}"));
                None
            }
        }
    }

    fn optional_bool(&mut self, field: &str) -> bool {
        match self.record.get(field) {
            Some(Value::Bool(value)) => *value,
            Some(Value::Null) | None => false,
            Some(other) => {
                let kind = value_kind(other);
                self.error(field, format!("must be a boolean, found {kind}"));
                false
            }
        }
    }

    fn language(&mut self) -> Option<Language> {
        let raw = self.required_string("language", None)?;
        let parsed = Language::parse(&raw);
        if parsed.is_none() {
            let known: Vec<&str> = Language::ALL.iter().map(Language::as_str).collect();
            self.error(
                "language",
                format!("must be one of {}, found '{raw}'", known.join(", ")),
            );
        }
        parsed
    }

    fn test_number(&mut self) -> Option<u32> {
        let record = self.record;
        let value = match record.get("test_number") {
            Some(Value::Null) | None => {
                if record.defaults.test_number.is_none() {
                    self.error("test_number", "is required");
                }
                return record.defaults.test_number;
            }
            Some(value) => value,
        };

        let parsed = match value {
            Value::Number(number) => number.as_i64(),
            _ => None,
        };
        match parsed {
            Some(number) if number > 0 => match u32::try_from(number) {
                Ok(number) => Some(number),
                Err(_) => {
                    self.error("test_number", format!("{number} is out of range"));
                    None
                }
            },
            Some(number) => {
                self.error(
                    "test_number",
                    format!("must be a positive integer, found {number}"),
                );
                None
            }
            None => {
                let kind = value_kind(value);
                let reason = if matches!(value, Value::Number(_)) {
                    "must be a positive integer, found a fractional number".to_string()
                } else {
                    format!("must be a positive integer, found {kind}")
                };
                self.error("test_number", reason);
                None
            }
        }
    }

    fn args(&mut self) -> Option<Vec<ArgSpec>> {
        let record = self.record;
        let mapping = match record.get("args") {
            Some(Value::Null) | None => return Some(Vec::new()),
            Some(Value::Mapping(mapping)) => mapping,
            Some(other) => {
                let kind = value_kind(other);
                self.error("args", format!("must be a mapping, found {kind}"));
                return None;
            }
        };

        let mut specs = Vec::with_capacity(mapping.len());
        let mut ok = true;
        for (key, value) in mapping {
            let name = match key.as_str() {
                Some(name) if IDENTIFIER_RE.is_match(name) => name.to_string(),
                Some(name) => {
                    self.error("args", format!("argument name '{name}' is not an identifier"));
                    ok = false;
                    continue;
                }
                None => {
                    self.error("args", "argument names must be strings");
                    ok = false;
                    continue;
                }
            };
            let field = format!("args.{name}");
            let default = match value {
                Value::Bool(value) => ArgValue::Bool(*value),
                Value::String(value) => ArgValue::String(value.clone()),
                Value::Number(number) => match number.as_i64() {
                    Some(value) => ArgValue::Integer(value),
                    None => {
                        self.error(&field, "numeric defaults must be integers");
                        ok = false;
                        continue;
                    }
                },
                other => {
                    let kind = value_kind(other);
                    self.error(
                        &field,
                        format!("default must be a string, boolean or integer, found {kind}"),
                    );
                    ok = false;
                    continue;
                }
            };
            specs.push(ArgSpec { name, default });
        }

        ok.then_some(specs)
    }

    fn guid(&mut self) -> Option<String> {
        match self.record.get("guid") {
            Some(Value::Null) | None => None,
            Some(Value::String(value)) if GUID_RE.is_match(value.trim()) => {
                Some(value.trim().to_ascii_lowercase())
            }
            Some(Value::String(value)) => {
                self.error("guid", format!("'{value}' is not a UUID"));
                None
            }
            Some(other) => {
                let kind = value_kind(other);
                self.error("guid", format!("must be a string, found {kind}"));
                None
            }
        }
    }
}

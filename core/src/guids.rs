use crate::definition::parse_definition_file;
use crate::pipeline::{discover, PipelineError};
use crate::validation::GUID_RE;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use uuid::Uuid;

static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*-[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*:").expect("list item pattern")
});

static KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*([A-Za-z_][A-Za-z0-9_]*)[ \t]*:").expect("key pattern"));

static GUID_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*(?:-[ \t]+)?guid[ \t]*:").expect("guid line pattern"));

#[derive(Debug, thiserror::Error)]
pub enum GuidError {
    #[error(transparent)]
    Discovery(#[from] PipelineError),
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },
    #[error("{path}: adding guids would leave the file unparsable: {reason}")]
    Unparsable { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidLocation {
    pub path: PathBuf,
    /// 1-based.
    pub line: usize,
}

impl fmt::Display for GuidLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GuidReport {
    pub files: usize,
    pub assigned: usize,
        pub updated: Vec<PathBuf>,
    pub duplicates: BTreeMap<String, Vec<GuidLocation>>,
}

impl GuidReport {
    pub fn changed(&self) -> bool {
        !self.updated.is_empty()
    }

    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }
}

impl fmt::Display for GuidReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for path in &self.updated {
            writeln!(f, "  - [updated] {}", path.display())?;
        }
        for (guid, locations) in &self.duplicates {
            writeln!(f, "  - [duplicate] {guid}")?;
            for location in locations {
                writeln!(f, "      {location}")?;
            }
        }
        write!(
            f,
            "Assigned {} guids in {} of {} files; {} duplicate guids",
            self.assigned,
            self.updated.len(),
            self.files,
            self.duplicates.len()
        )
    }
}

pub fn new_guid() -> String {
    Uuid::now_v7().to_string()
}

/// Fills in missing guids under `root` using `generate`, then reports guids
/// used more than once. With `dry_run` nothing is written.
pub fn assign_guids(
    root: &Path,
    dry_run: bool,
    generate: &mut dyn FnMut() -> String,
) -> Result<GuidReport, GuidError> {
    let files = discover(root)?;
    let mut sources = Vec::with_capacity(files.len());
    for path in files {
        let source = fs::read_to_string(&path).map_err(|err| GuidError::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        sources.push((path, source));
    }

    let mut in_use: HashSet<String> = sources
        .iter()
        .flat_map(|(_, source)| guid_lines(source))
        .map(|(_, guid)| guid)
        .collect();
    let mut next = || loop {
        let guid = generate().to_ascii_lowercase();
        if in_use.insert(guid.clone()) {
            break guid;
        }
        log::warn!("generated guid {guid} is already in use; drawing another");
    };

    let mut report = GuidReport {
        files: sources.len(),
        ..GuidReport::default()
    };
    for entry in &mut sources {
        let (path, source) = (&entry.0, &mut entry.1);
        if let Err(err) = parse_definition_file(path, source) {
            log::warn!("{}: skipped, {err}", path.display());
            continue;
        }
        let (text, assigned) = fill_guids(source, &mut next);
        if assigned == 0 {
            continue;
        }

        let records = parse_definition_file(path, &text).map_err(|err| GuidError::Unparsable {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        let missing = records
            .iter()
            .filter(|record| record.get("guid").and_then(|value| value.as_str()).is_none())
            .count();
        if missing > 0 {
            log::warn!(
                "{}: {missing} records still lack a guid (layout not recognised)",
                path.display()
            );
        }

        if !dry_run {
            fs::write(path, &text).map_err(|err| GuidError::Write {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;
        }
        log::info!("{}: assigned {assigned} guids", path.display());
        report.assigned += assigned;
        report.updated.push(path.clone());
        *source = text;
    }

    let mut seen: BTreeMap<String, Vec<GuidLocation>> = BTreeMap::new();
    for (path, source) in &sources {
        for (line, guid) in guid_lines(source) {
            seen.entry(guid).or_default().push(GuidLocation {
                path: path.clone(),
                line,
            });
        }
    }
    report.duplicates = seen
        .into_iter()
        .filter(|(_, locations)| locations.len() > 1)
        .collect();
    Ok(report)
}

fn guid_lines(source: &str) -> Vec<(usize, String)> {
    source
        .lines()
        .enumerate()
        .filter(|(_, line)| GUID_LINE_RE.is_match(line))
        .filter_map(|(index, line)| {
            let value = guid_value(line)?;
            GUID_RE
                .is_match(value)
                .then(|| (index + 1, value.to_ascii_lowercase()))
        })
        .collect()
}

fn guid_value(line: &str) -> Option<&str> {
    let (_, rest) = line.split_once("guid")?;
    let rest = rest.trim_start().strip_prefix(':')?;
    let rest = rest.split(" #").next().unwrap_or_default().trim();
    Some(rest.trim_matches(|c| c == '"' || c == '\''))
}

struct RecordSlot {
    field_indent: usize,
    guid_line: Option<usize>,
    /// A new `guid:` line goes after this line.
    insert_after: usize,
}

fn fill_guids(source: &str, next: &mut dyn FnMut() -> String) -> (String, usize) {
    let slots = {
        let lines: Vec<&str> = source.split_inclusive('\n').collect();
        record_slots(&lines)
    };
    let mut lines: Vec<String> = source.split_inclusive('\n').map(str::to_string).collect();

    let mut edits = Vec::new();
    for slot in &slots {
        let needs_guid = match slot.guid_line {
            Some(index) => matches!(guid_value(&lines[index]), Some("" | "~" | "null")),
            None => true,
        };
        if needs_guid {
            edits.push((slot, next()));
        }
    }

    // Bottom-up so earlier line numbers stay valid.
    for (slot, guid) in edits.iter().rev() {
        match slot.guid_line {
            Some(index) => {
                let line = &lines[index];
                let key_end = line.find(':').map_or(line.len(), |position| position + 1);
                let ending = if line.ends_with('\n') { "\n" } else { "" };
                lines[index] = format!("{} {guid}{ending}", &line[..key_end]);
            }
            None => {
                let after = slot.insert_after;
                if !lines[after].ends_with('\n') {
                    lines[after].push('\n');
                }
                let indent = " ".repeat(slot.field_indent);
                lines.insert(after + 1, format!("{indent}guid: {guid}\n"));
            }
        }
    }
    (lines.concat(), edits.len())
}

fn record_slots(lines: &[&str]) -> Vec<RecordSlot> {
    match lines.iter().position(|line| key_at(line, 0) == Some("tests")) {
        Some(tests_line) => grouped_slots(lines, tests_line),
        None => match lines.iter().rposition(|line| !line.trim().is_empty()) {
            Some(last) => vec![record_slot(lines, 0, last + 1, 0, false)],
            None => Vec::new(),
        },
    }
}

fn grouped_slots(lines: &[&str], tests_line: usize) -> Vec<RecordSlot> {
    let Some(first) = (tests_line + 1..lines.len()).find(|&i| !is_blank(lines[i])) else {
        return Vec::new();
    };
    let item_indent = indent(lines[first]);

    let mut slots = Vec::new();
    let mut index = first;
    while index < lines.len() {
        if is_blank(lines[index]) {
            index += 1;
            continue;
        }
        if indent(lines[index]) != item_indent {
            break;
        }
        let Some(key) = ITEM_RE.captures(lines[index]).and_then(|c| c.get(1)) else {
            break;
        };
        let end = (index + 1..lines.len())
            .find(|&i| !is_blank(lines[i]) && indent(lines[i]) <= item_indent)
            .unwrap_or(lines.len());
        slots.push(record_slot(lines, index, end, key.start(), true));
        index = end;
    }
    slots
}

fn record_slot(
    lines: &[&str],
    start: usize,
    end: usize,
    field_indent: usize,
    list_item: bool,
) -> RecordSlot {
    let mut guid_line = None;
    let mut name_line = None;
    for index in start..end {
        let key = if list_item && index == start {
            ITEM_RE
                .captures(lines[index])
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
        } else {
            key_at(lines[index], field_indent)
        };
        match key {
            Some("guid") if guid_line.is_none() => guid_line = Some(index),
            Some("name") if name_line.is_none() => name_line = Some(index),
            _ => {}
        }
    }

    let insert_after = match name_line {
        Some(line) => value_end(lines, line, end, field_indent),
        None => (start..end)
            .rev()
            .find(|&i| !lines[i].trim().is_empty())
            .unwrap_or(start),
    };
    RecordSlot {
        field_indent,
        guid_line,
        insert_after,
    }
}

/// Last line of the value starting on `line`; deeper-indented lines continue it.
fn value_end(lines: &[&str], line: usize, end: usize, field_indent: usize) -> usize {
    let mut last = line;
    for (index, text) in lines.iter().enumerate().take(end).skip(line + 1) {
        if text.trim().is_empty() {
            continue;
        }
        if indent(text) > field_indent {
            last = index;
        } else {
            break;
        }
    }
    last
}

fn key_at(line: &str, column: usize) -> Option<&str> {
    if indent(line) != column {
        return None;
    }
    KEY_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn indent(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

fn is_blank(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

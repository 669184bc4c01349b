use crate::artifact::{ArtifactFormat, DefinitionBuild, FormatOutcome};
use crate::bundle;
use crate::definition::{escape_applescript, ArgSpec, ArgValue, Language, TestDefinition};
use crate::naming::{artifact_path, relative_artifact_path, technique_dir};
use crate::toolchain::{Tool, ToolRequest, Toolchain, ToolchainError};
use crate::transpile::transpile;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompilationError {
    #[error("{tool} timed out after {timeout_ms}ms")]
    Timeout { tool: Tool, timeout_ms: u64 },
    #[error("{tool} failed: {source}")]
    Toolchain { tool: Tool, source: ToolchainError },
    #[error("{tool} reported success but {path} was not written")]
    MissingOutput { tool: Tool, path: String },
    #[error("requires the {dependency} artifact, which was not produced")]
    DependencyFailed { dependency: ArtifactFormat },
    #[error("i/o error at {path}: {reason}")]
    Io { path: String, reason: String },
}

impl CompilationError {
    fn from_toolchain(tool: Tool, err: ToolchainError) -> Self {
        match err {
            ToolchainError::Timeout { timeout_ms, .. } => Self::Timeout { tool, timeout_ms },
            source => Self::Toolchain { tool, source },
        }
    }

    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |err| Self::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

pub struct Compiler<'a> {
    toolchain: &'a dyn Toolchain,
    output_root: PathBuf,
    formats: Vec<ArtifactFormat>,
}

impl<'a> Compiler<'a> {
    pub fn new(
        toolchain: &'a dyn Toolchain,
        output_root: impl Into<PathBuf>,
        formats: &[ArtifactFormat],
    ) -> Self {
        Self {
            toolchain,
            output_root: output_root.into(),
            formats: with_dependencies(formats),
        }
    }

    pub fn formats(&self) -> &[ArtifactFormat] {
        &self.formats
    }

    pub fn compile(&self, definition: &TestDefinition) -> DefinitionBuild {
        let dir = technique_dir(&self.output_root, &definition.technique_id);
        let script_text = render_script_file(definition);
        let mut produced: BTreeMap<ArtifactFormat, PathBuf> = BTreeMap::new();
        let mut outcomes = Vec::with_capacity(self.formats.len());

        for &format in &self.formats {
            let (Some(path), Some(relative)) = (
                artifact_path(&self.output_root, definition, format),
                relative_artifact_path(definition, format),
            ) else {
                outcomes.push(FormatOutcome::skipped(
                    format,
                    format!("not available for {}", definition.language),
                ));
                continue;
            };

            let result = fs::create_dir_all(&dir)
                .map_err(CompilationError::io(&dir))
                .and_then(|()| {
                    self.produce(format, definition, &dir, &path, &script_text, &produced)
                });
            match result {
                Ok(message) => {
                    log::debug!("{} {format}: wrote {}", definition.key(), path.display());
                    produced.insert(format, path);
                    outcomes.push(FormatOutcome::succeeded(format, relative, message));
                }
                Err(err) => {
                    log::warn!("{} {format}: {err}", definition.key());
                    outcomes.push(FormatOutcome::failed(format, err));
                }
            }
        }

        DefinitionBuild {
            key: definition.key(),
            name: definition.name.clone(),
            base_name: definition.base_name(),
            outcomes,
        }
    }

    fn produce(
        &self,
        format: ArtifactFormat,
        definition: &TestDefinition,
        dir: &Path,
        path: &Path,
        script_text: &str,
        produced: &BTreeMap<ArtifactFormat, PathBuf>,
    ) -> Result<Option<String>, CompilationError> {
        match format {
            ArtifactFormat::ScriptFile => {
                fs::write(path, script_text).map_err(CompilationError::io(path))?;
                mark_executable(path).map_err(CompilationError::io(path))?;
                Ok(None)
            }
            ArtifactFormat::CompiledObject => {
                let script = require(produced, ArtifactFormat::ScriptFile)?;
                self.run_tool(Tool::ScriptCompiler, definition.language, script, path)?;
                Ok(None)
            }
            ArtifactFormat::TranspiledSource => {
                let program = transpile(definition, script_text);
                fs::write(path, &program.source).map_err(CompilationError::io(path))?;
                Ok(Some(program.mode.to_string()))
            }
            ArtifactFormat::AppBundle => {
                let (script, embedded) = match produced.get(&ArtifactFormat::CompiledObject) {
                    Some(compiled) => (compiled, "compiled script"),
                    None => (require(produced, ArtifactFormat::ScriptFile)?, "script file"),
                };
                let staged =
                    bundle::stage(definition, dir, script).map_err(CompilationError::io(dir))?;
                let archived =
                    self.run_tool(Tool::Archiver, definition.language, &staged.root, path);
                if let Err(err) = fs::remove_dir_all(&staged.root) {
                    log::warn!(
                        "failed to remove staging directory {}: {err}",
                        staged.root.display()
                    );
                }
                archived?;
                Ok(Some(format!("embeds the {embedded}")))
            }
            ArtifactFormat::Binary => {
                let source = require(produced, ArtifactFormat::TranspiledSource)?;
                self.run_tool(Tool::NativeCompiler, definition.language, source, path)?;
                mark_executable(path).map_err(CompilationError::io(path))?;
                Ok(None)
            }
        }
    }

    fn run_tool(
        &self,
        tool: Tool,
        language: Language,
        input: &Path,
        output: &Path,
    ) -> Result<(), CompilationError> {
        remove_stale(output).map_err(CompilationError::io(output))?;
        let request = ToolRequest {
            tool,
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            language,
        };
        let result = self
            .toolchain
            .run(&request)
            .map_err(|err| CompilationError::from_toolchain(tool, err))?;
        log::debug!("{tool} finished in {:?}", result.duration);

        if output.exists() {
            Ok(())
        } else {
            Err(CompilationError::MissingOutput {
                tool,
                path: output.display().to_string(),
            })
        }
    }
}

fn require(
    produced: &BTreeMap<ArtifactFormat, PathBuf>,
    dependency: ArtifactFormat,
) -> Result<&PathBuf, CompilationError> {
    produced
        .get(&dependency)
        .ok_or(CompilationError::DependencyFailed { dependency })
}

fn remove_stale(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

pub fn with_dependencies(formats: &[ArtifactFormat]) -> Vec<ArtifactFormat> {
    let mut selected: Vec<ArtifactFormat> = formats.to_vec();
    for format in formats {
        let needs: &[ArtifactFormat] = match format {
            ArtifactFormat::CompiledObject | ArtifactFormat::AppBundle => {
                &[ArtifactFormat::ScriptFile]
            }
            ArtifactFormat::Binary => &[ArtifactFormat::TranspiledSource],
            ArtifactFormat::ScriptFile | ArtifactFormat::TranspiledSource => &[],
        };
        selected.extend_from_slice(needs);
    }
    ArtifactFormat::ALL
        .into_iter()
        .filter(|format| selected.contains(format))
        .collect()
}

#[cfg(unix)]
pub(crate) fn mark_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
pub(crate) fn mark_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

pub fn render_script_file(definition: &TestDefinition) -> String {
    match definition.language {
        Language::JavaScript => {
            let mut text = String::from("#!/usr/bin/osascript -l JavaScript\n");
            text.push_str(definition.command.trim_end());
            text.push('\n');
            text
        }
        Language::AppleScript => render_applescript(definition),
    }
}

fn render_applescript(definition: &TestDefinition) -> String {
    let args = &definition.args;
    let mut frameworks = Vec::new();
    let mut body = Vec::new();
    for line in definition.command.lines() {
        if line.trim().starts_with("use framework") {
            frameworks.push(line.trim().to_string());
        } else {
            body.push(line);
        }
    }
    let command = substitute_placeholders(&body.join("\n"), args);

    let mut lines: Vec<String> = vec!["#!/usr/bin/osascript".to_string()];
    if !frameworks.is_empty() {
        lines.extend(frameworks);
        lines.push("use scripting additions".to_string());
    }
    lines.push(String::new());

    lines.push("on show_help()".to_string());
    lines.push(format!("    log \"{}\"", escape_applescript(&definition.name)));
    lines.push("    log \"\"".to_string());
    lines.push("    log \"Usage: Run this script to execute the command.\"".to_string());
    if !args.is_empty() {
        lines.push("    log \"\"".to_string());
        lines.push("    log \"Available arguments (in order):\"".to_string());
        for (index, arg) in args.iter().enumerate() {
            lines.push(format!(
                "    log \"  {}. {}: {} (default: {})\"",
                index + 1,
                arg.name,
                arg.default.type_name(),
                escape_applescript(&arg.default.to_string())
            ));
        }
    }
    lines.push("end show_help".to_string());
    lines.push(String::new());

    let params: Vec<&str> = args.iter().map(|arg| arg.name.as_str()).collect();
    lines.push(format!("on main({})", params.join(", ")));
    for line in command.lines() {
        if !line.trim().is_empty() {
            lines.push(format!("    {}", line.trim_end()));
        }
    }
    lines.push("end main".to_string());
    lines.push(String::new());

    lines.push("on run argv".to_string());
    lines.push("    if (count of argv) > 0 and item 1 of argv is \"-h\" then".to_string());
    lines.push("        show_help()".to_string());
    lines.push("        return".to_string());
    lines.push("    end if".to_string());
    for (index, arg) in args.iter().enumerate() {
        let item = format!("item {} of argv", index + 1);
        let from_argv = match arg.default {
            ArgValue::Bool(_) => format!("({item}) is \"true\""),
            ArgValue::Integer(_) => format!("({item}) as integer"),
            ArgValue::String(_) => item,
        };
        lines.push(format!("    if (count of argv) > {index} then"));
        lines.push(format!("        set {} to {from_argv}", arg.name));
        lines.push("    else".to_string());
        lines.push(format!(
            "        set {} to {}",
            arg.name,
            arg.default.applescript_literal()
        ));
        lines.push("    end if".to_string());
    }
    lines.push(format!("    return main({})", params.join(", ")));
    lines.push("end run".to_string());

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Replaces `#{name}` placeholders with handler parameters.
///
/// A placeholder that is a whole string literal (`"#{name}"`) becomes the
/// bare parameter; one inside a literal is spliced in with `&`.
fn substitute_placeholders(command: &str, args: &[ArgSpec]) -> String {
    let mut out = String::with_capacity(command.len());
    let mut in_string = false;
    let mut string_start = 0;
    let mut index = 0;

    while index < command.len() {
        let rest = &command[index..];

        if !in_string {
            if let Some(arg) = rest.strip_prefix('"').and_then(|r| leading_placeholder(r, args)) {
                let token = arg.name.len() + 3;
                if rest[1 + token..].starts_with('"') {
                    out.push_str(&arg.name);
                    index += token + 2;
                    continue;
                }
            }
        }

        if let Some(arg) = leading_placeholder(rest, args) {
            index += arg.name.len() + 3;
            if !in_string {
                out.push_str(&arg.name);
                continue;
            }
            let spliced = match arg.default {
                ArgValue::String(_) => arg.name.clone(),
                _ => format!("({} as text)", arg.name),
            };
            if out.len() == string_start {
                // Placeholder opens the literal: drop the empty `"" &` prefix.
                out.pop();
                out.push_str(&spliced);
            } else {
                out.push_str("\" & ");
                out.push_str(&spliced);
            }
            if command[index..].starts_with('"') {
                index += 1;
                in_string = false;
            } else {
                out.push_str(" & \"");
                string_start = out.len();
            }
            continue;
        }

        let Some(ch) = rest.chars().next() else { break };
        index += ch.len_utf8();
        out.push(ch);
        if in_string && ch == '\\' {
            if let Some(escaped) = command[index..].chars().next() {
                index += escaped.len_utf8();
                out.push(escaped);
            }
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            string_start = out.len();
        }
    }
    out
}

fn leading_placeholder<'a>(text: &str, args: &'a [ArgSpec]) -> Option<&'a ArgSpec> {
    let inner = text.strip_prefix("#{")?;
    let end = inner.find('}')?;
    let name = &inner[..end];
    args.iter().find(|arg| arg.name == name)
}

#[cfg(test)]
pub(crate) mod fake {
    use crate::toolchain::{Tool, ToolOutput, ToolRequest, Toolchain, ToolchainError};
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Behavior {
        Succeed,
        SucceedWithoutOutput,
        Fail,
        Timeout,
    }

    #[derive(Debug, Default)]
    pub struct FakeToolchain {
        behaviors: HashMap<Tool, Behavior>,
        requests: Mutex<Vec<ToolRequest>>,
    }

    impl FakeToolchain {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, tool: Tool, behavior: Behavior) -> Self {
            self.behaviors.insert(tool, behavior);
            self
        }

        pub fn requests(&self) -> Vec<ToolRequest> {
            self.requests.lock().map(|r| r.clone()).unwrap_or_default()
        }
    }

    impl Toolchain for FakeToolchain {
        fn run(&self, request: &ToolRequest) -> Result<ToolOutput, ToolchainError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            let behavior = self
                .behaviors
                .get(&request.tool)
                .copied()
                .unwrap_or(Behavior::Succeed);
            let program = format!("fake-{}", request.tool.as_str().replace(' ', "-"));
            match behavior {
                Behavior::Succeed => {
                    fs::write(&request.output, format!("built from {}", request.input.display()))
                        .map_err(|err| ToolchainError::Spawn {
                            program: program.clone(),
                            reason: err.to_string(),
                        })?;
                }
                Behavior::SucceedWithoutOutput => {}
                Behavior::Fail => {
                    return Err(ToolchainError::Failed {
                        program,
                        exit_code: Some(1),
                        stderr: "syntax error".to_string(),
                    })
                }
                Behavior::Timeout => {
                    return Err(ToolchainError::Timeout {
                        program,
                        timeout_ms: 50,
                    })
                }
            }
            Ok(ToolOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(0),
                duration: Duration::from_millis(1),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{Behavior, FakeToolchain};
    use super::*;
    use crate::artifact::FormatStatus;
    use tempfile::tempdir;

    fn definition(name: &str, language: Language, command: &str) -> TestDefinition {
        TestDefinition {
            name: name.to_string(),
            language,
            description: "d".to_string(),
            command: command.to_string(),
            technique_id: "T1115".to_string(),
            technique_name: "Clipboard Data".to_string(),
            elevation_required: false,
            tcc_required: false,
            test_number: 1,
            args: Vec::new(),
            guid: None,
            source: PathBuf::from("yaml/T1115/a.yaml"),
        }
    }

    fn arg(name: &str, default: ArgValue) -> ArgSpec {
        ArgSpec {
            name: name.to_string(),
            default,
        }
    }

    fn status(build: &DefinitionBuild, format: ArtifactFormat) -> FormatStatus {
        build.outcome(format).map(|o| o.status).expect("outcome present")
    }

    #[test]
    fn script_file_wraps_applescript_with_help_and_argv() {
        let mut def = definition(
            "Say \"Hello\"",
            Language::AppleScript,
            "use framework \"Foundation\"\ndo shell script \"echo #{word} \" & \"#{times}\"\nlog \"#{loud}\"",
        );
        def.args = vec![
            arg("word", ArgValue::String("hi".to_string())),
            arg("times", ArgValue::Integer(3)),
            arg("loud", ArgValue::Bool(false)),
        ];
        let text = render_script_file(&def);

        assert!(text.starts_with("#!/usr/bin/osascript\nuse framework \"Foundation\"\n"));
        assert_eq!(text.matches("use framework").count(), 1);
        assert!(text.contains("    log \"Say \\\"Hello\\\"\""));
        assert!(text.contains("    log \"  2. times: int (default: 3)\""));
        assert!(text.contains("on main(word, times, loud)"));
        assert!(text.contains("    do shell script \"echo \" & word & \" \" & times"));
        assert!(text.contains("    log loud"));
        assert!(text.contains("    if (count of argv) > 0 and item 1 of argv is \"-h\" then"));
        assert!(text.contains("        set word to item 1 of argv"));
        assert!(text.contains("        set word to \"hi\""));
        assert!(text.contains("        set times to (item 2 of argv) as integer"));
        assert!(text.contains("        set loud to (item 3 of argv) is \"true\""));
        assert!(text.contains("        set loud to false"));
        assert!(text.contains("    return main(word, times, loud)"));
        assert!(text.ends_with("end run\n"));
    }

    #[test]
    fn placeholders_inside_literals_are_spliced() {
        let args = vec![
            arg("path", ArgValue::String("/tmp".to_string())),
            arg("n", ArgValue::Integer(2)),
        ];
        assert_eq!(
            substitute_placeholders("do shell script \"ls #{path}\"", &args),
            "do shell script \"ls \" & path"
        );
        assert_eq!(
            substitute_placeholders("do shell script \"#{path}/x\"", &args),
            "do shell script path & \"/x\""
        );
        assert_eq!(
            substitute_placeholders("delay #{n}", &args),
            "delay n"
        );
        assert_eq!(
            substitute_placeholders("log \"a \\\"#{n}\\\" b\"", &args),
            "log \"a \\\"\" & (n as text) & \"\\\" b\""
        );
        assert_eq!(
            substitute_placeholders("log \"#{other}\"", &args),
            "log \"#{other}\""
        );
    }

    #[test]
    fn javascript_is_emitted_verbatim_after_shebang() {
        let def = definition("JXA", Language::JavaScript, "Application('Finder').name()\n");
        assert_eq!(
            render_script_file(&def),
            "#!/usr/bin/osascript -l JavaScript\nApplication('Finder').name()\n"
        );
    }

    #[test]
    fn dependencies_are_added_in_build_order() {
        assert_eq!(
            with_dependencies(&[ArtifactFormat::Binary, ArtifactFormat::AppBundle]),
            vec![
                ArtifactFormat::ScriptFile,
                ArtifactFormat::TranspiledSource,
                ArtifactFormat::AppBundle,
                ArtifactFormat::Binary,
            ]
        );
    }

    #[test]
    fn every_format_is_produced_under_the_technique_directory() {
        let dir = tempdir().expect("tempdir");
        let toolchain = FakeToolchain::new();
        let compiler = Compiler::new(&toolchain, dir.path(), &ArtifactFormat::ALL);
        let def = definition("Get Clipboard (v2)!", Language::AppleScript, "return the clipboard");

        let build = compiler.compile(&def);
        assert_eq!(build.outcomes.len(), 5);
        assert!(build.outcomes.iter().all(FormatOutcome::is_success), "{build:?}");

        let technique = dir.path().join("T1115");
        for name in [
            "get_clipboard_v2.applescript",
            "get_clipboard_v2.scpt",
            "get_clipboard_v2.swift",
            "get_clipboard_v2.app.zip",
            "get_clipboard_v2",
        ] {
            assert!(technique.join(name).is_file(), "{name} missing");
        }
        assert!(!technique.join("get_clipboard_v2.app").exists());
        assert_eq!(
            build
                .outcome(ArtifactFormat::TranspiledSource)
                .and_then(|o| o.message.as_deref()),
            Some("native")
        );
        assert_eq!(
            build
                .outcome(ArtifactFormat::AppBundle)
                .and_then(|o| o.output_path.as_deref()),
            Some("T1115/get_clipboard_v2.app.zip")
        );

        let requests = toolchain.requests();
        let tools: Vec<Tool> = requests.iter().map(|r| r.tool).collect();
        assert_eq!(
            tools,
            vec![Tool::ScriptCompiler, Tool::Archiver, Tool::NativeCompiler]
        );
        assert_eq!(requests[0].input, technique.join("get_clipboard_v2.applescript"));
    }

    #[test]
    fn javascript_skips_compiled_object_and_bundles_the_script_file() {
        let dir = tempdir().expect("tempdir");
        let toolchain = FakeToolchain::new();
        let compiler = Compiler::new(&toolchain, dir.path(), &ArtifactFormat::ALL);
        let def = definition("Finder Name", Language::JavaScript, "Application('Finder').name()");

        let build = compiler.compile(&def);
        assert_eq!(status(&build, ArtifactFormat::CompiledObject), FormatStatus::Skipped);
        assert_eq!(status(&build, ArtifactFormat::AppBundle), FormatStatus::Succeeded);
        assert_eq!(
            build
                .outcome(ArtifactFormat::AppBundle)
                .and_then(|o| o.message.as_deref()),
            Some("embeds the script file")
        );
        assert!(dir.path().join("T1115/finder_name.js").is_file());
        assert!(toolchain
            .requests()
            .iter()
            .all(|request| request.tool != Tool::ScriptCompiler));
    }

    #[test]
    fn failures_are_isolated_per_format() {
        let dir = tempdir().expect("tempdir");
        let toolchain = FakeToolchain::new()
            .with(Tool::ScriptCompiler, Behavior::Fail)
            .with(Tool::NativeCompiler, Behavior::Timeout);
        let compiler = Compiler::new(&toolchain, dir.path(), &ArtifactFormat::ALL);
        let def = definition("Broken", Language::AppleScript, "tell application \"Finder\" to quit");

        let build = compiler.compile(&def);
        assert_eq!(status(&build, ArtifactFormat::ScriptFile), FormatStatus::Succeeded);
        assert_eq!(status(&build, ArtifactFormat::CompiledObject), FormatStatus::Failed);
        assert_eq!(status(&build, ArtifactFormat::TranspiledSource), FormatStatus::Succeeded);
        assert_eq!(status(&build, ArtifactFormat::AppBundle), FormatStatus::Succeeded);
        assert_eq!(status(&build, ArtifactFormat::Binary), FormatStatus::Failed);
        assert!(!build.every_attempt_failed());

        let binary = build.outcome(ArtifactFormat::Binary).expect("binary");
        assert_eq!(
            binary.error,
            Some(CompilationError::Timeout {
                tool: Tool::NativeCompiler,
                timeout_ms: 50
            })
        );
        assert_eq!(
            build
                .outcome(ArtifactFormat::AppBundle)
                .and_then(|o| o.message.as_deref()),
            Some("embeds the script file")
        );
    }

    #[test]
    fn silent_tools_are_missing_output_and_dependents_fail() {
        let dir = tempdir().expect("tempdir");
        let technique = dir.path().join("T1115");
        fs::create_dir_all(&technique).expect("dir");
        fs::write(technique.join("silent"), b"stale").expect("stale binary");

        let toolchain = FakeToolchain::new().with(Tool::NativeCompiler, Behavior::SucceedWithoutOutput);
        let compiler = Compiler::new(&toolchain, dir.path(), &[ArtifactFormat::Binary]);
        let def = definition("Silent", Language::AppleScript, "delay 1");

        let build = compiler.compile(&def);
        assert!(matches!(
            build.outcome(ArtifactFormat::Binary).and_then(|o| o.error.clone()),
            Some(CompilationError::MissingOutput { tool: Tool::NativeCompiler, .. })
        ));
        assert!(!technique.join("silent").exists());

        assert_eq!(
            require(&BTreeMap::new(), ArtifactFormat::TranspiledSource).unwrap_err(),
            CompilationError::DependencyFailed {
                dependency: ArtifactFormat::TranspiledSource
            }
        );
    }

    #[test]
    fn rebuilding_overwrites_in_place() {
        let dir = tempdir().expect("tempdir");
        let toolchain = FakeToolchain::new();
        let compiler = Compiler::new(&toolchain, dir.path(), &[ArtifactFormat::ScriptFile]);
        let def = definition("Again", Language::AppleScript, "return 1");

        compiler.compile(&def);
        let first = fs::read_to_string(dir.path().join("T1115/again.applescript")).expect("first");
        let build = compiler.compile(&def);
        let second = fs::read_to_string(dir.path().join("T1115/again.applescript")).expect("second");
        assert_eq!(first, second);
        assert_eq!(build.outcomes.len(), 1);
    }
}

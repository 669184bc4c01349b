use crate::definition::{Language, TestDefinition};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranspileMode {
    Native,
    Bridge,
}

impl fmt::Display for TranspileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranspileMode::Native => f.write_str("native"),
            TranspileMode::Bridge => f.write_str("osascript bridge"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwiftProgram {
    pub mode: TranspileMode,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Primitive {
    Shell(String),
    SetClipboard(String),
    ReadClipboard,
    Log(String),
    Delay(f64),
}

pub fn transpile(definition: &TestDefinition, script_text: &str) -> SwiftProgram {
    match native_primitives(definition) {
        Some(primitives) => SwiftProgram {
            mode: TranspileMode::Native,
            source: render_native(definition, &primitives),
        },
        None => SwiftProgram {
            mode: TranspileMode::Bridge,
            source: render_bridge(definition, script_text),
        },
    }
}

fn native_primitives(definition: &TestDefinition) -> Option<Vec<Primitive>> {
    if definition.language != Language::AppleScript
        || !definition.args.is_empty()
        || definition.command.contains("use framework")
    {
        return None;
    }

    let statements: Vec<&str> = definition
        .command
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--"))
        .collect();
    let last = statements.len().checked_sub(1)?;

    let mut primitives = Vec::with_capacity(statements.len());
    for (index, line) in statements.into_iter().enumerate() {
        // `return` ends the script, so only the final statement may carry it.
        let statement = match line.strip_prefix("return ") {
            Some(_) if index != last => return None,
            Some(rest) => rest.trim(),
            None => line,
        };
        primitives.push(parse_primitive(statement)?);
    }
    Some(primitives)
}

fn parse_primitive(statement: &str) -> Option<Primitive> {
    if let Some(rest) = statement.strip_prefix("do shell script ") {
        return whole_literal(rest).map(Primitive::Shell);
    }
    if let Some(rest) = statement.strip_prefix("set the clipboard to ") {
        return whole_literal(rest).map(Primitive::SetClipboard);
    }
    if matches!(statement, "the clipboard" | "get the clipboard") {
        return Some(Primitive::ReadClipboard);
    }
    if let Some(rest) = statement.strip_prefix("log ") {
        return whole_literal(rest).map(Primitive::Log);
    }
    if let Some(rest) = statement.strip_prefix("delay ") {
        let seconds: f64 = rest.trim().parse().ok()?;
        return (seconds.is_finite() && seconds >= 0.0).then_some(Primitive::Delay(seconds));
    }
    None
}

fn whole_literal(text: &str) -> Option<String> {
    let text = text.trim();
    let body = text.strip_prefix('"')?;
    let mut value = String::new();
    let mut chars = body.char_indices();
    while let Some((index, ch)) = chars.next() {
        match ch {
            '"' => {
                return body[index + 1..].trim().is_empty().then_some(value);
            }
            '\\' => match chars.next()?.1 {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                other => value.push(other),
            },
            other => value.push(other),
        }
    }
    None
}

fn render_native(definition: &TestDefinition, primitives: &[Primitive]) -> String {
    let uses_clipboard = primitives
        .iter()
        .any(|p| matches!(p, Primitive::SetClipboard(_) | Primitive::ReadClipboard));
    let uses_shell = primitives.iter().any(|p| matches!(p, Primitive::Shell(_)));

    let mut out = header(definition, TranspileMode::Native);
    out.push_str("import Foundation\n");
    if uses_clipboard {
        out.push_str("import AppKit\n");
    }
    out.push('\n');

    if uses_shell {
        out.push_str(SHELL_HELPER);
        out.push('\n');
    }

    out.push_str("var result: String? = nil\n");
    for primitive in primitives {
        let line = match primitive {
            Primitive::Shell(command) => format!("result = shell({})", swift_literal(command)),
            Primitive::SetClipboard(text) => format!(
                "NSPasteboard.general.clearContents()\n\
                 NSPasteboard.general.setString({}, forType: .string)\n\
                 result = nil",
                swift_literal(text)
            ),
            Primitive::ReadClipboard => {
                "result = NSPasteboard.general.string(forType: .string) ?? \"\"".to_string()
            }
            Primitive::Log(text) => format!(
                "FileHandle.standardError.write(Data(({} + \"\\n\").utf8))\nresult = nil",
                swift_literal(text)
            ),
            Primitive::Delay(seconds) => {
                format!("Thread.sleep(forTimeInterval: {seconds})\nresult = nil")
            }
        };
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str("if let result = result, !result.isEmpty {\n    print(result)\n}\n");
    out
}

// Mirrors `do shell script`: both pipes drained concurrently, one trailing
// newline dropped, remaining line feeds turned into returns.
const SHELL_HELPER: &str = r#"func shell(_ command: String) -> String {
    let process = Process()
    process.executableURL = URL(fileURLWithPath: "/bin/sh")
    process.arguments = ["-c", command]
    let stdout = Pipe()
    let stderr = Pipe()
    process.standardOutput = stdout
    process.standardError = stderr
    do {
        try process.run()
    } catch {
        FileHandle.standardError.write(Data("\(error)\n".utf8))
        exit(1)
    }
    var errors = Data()
    let drained = DispatchGroup()
    drained.enter()
    DispatchQueue.global().async {
        errors = stderr.fileHandleForReading.readDataToEndOfFile()
        drained.leave()
    }
    let output = stdout.fileHandleForReading.readDataToEndOfFile()
    drained.wait()
    process.waitUntilExit()
    if process.terminationStatus != 0 {
        FileHandle.standardError.write(errors)
        exit(1)
    }
    var text = String(decoding: output, as: UTF8.self)
    if text.hasSuffix("\n") {
        text.removeLast()
    }
    return text.replacingOccurrences(of: "\n", with: "\r")
}
"#;

fn render_bridge(definition: &TestDefinition, script_text: &str) -> String {
    let script = strip_shebang(script_text);
    let mut arguments: Vec<String> = definition
        .language
        .osa_flags()
        .iter()
        .map(|flag| format!("\"{flag}\""))
        .collect();
    arguments.push("\"-\"".to_string());

    let mut out = header(definition, TranspileMode::Bridge);
    out.push_str("import Foundation\n\n");
    out.push_str(&format!("let script = {}\n\n", swift_literal(script)));
    out.push_str("let process = Process()\n");
    out.push_str("process.executableURL = URL(fileURLWithPath: \"/usr/bin/osascript\")\n");
    out.push_str(&format!(
        "process.arguments = [{}] + CommandLine.arguments.dropFirst()\n",
        arguments.join(", ")
    ));
    out.push_str(
        "let input = Pipe()\n\
         process.standardInput = input\n\
         process.standardOutput = FileHandle.standardOutput\n\
         process.standardError = FileHandle.standardError\n\
         do {\n    try process.run()\n} catch {\n    \
         FileHandle.standardError.write(Data(\"\\(error)\\n\".utf8))\n    exit(127)\n}\n\
         input.fileHandleForWriting.write(Data(script.utf8))\n\
         input.fileHandleForWriting.closeFile()\n\
         process.waitUntilExit()\n\
         exit(process.terminationStatus)\n",
    );
    out
}

fn header(definition: &TestDefinition, mode: TranspileMode) -> String {
    format!(
        "// {} ({} #{})\n// Generated from {} ({mode}).\n\n",
        single_line(&definition.name),
        definition.technique_id,
        definition.test_number,
        definition.language,
    )
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_shebang(text: &str) -> &str {
    if text.starts_with("#!") {
        text.split_once('\n').map(|(_, rest)| rest).unwrap_or("")
    } else {
        text
    }
}

/// Raw Swift string literal holding `text` verbatim. The delimiter carries
/// one more `#` than the longest `#` run in the text, so nothing inside can
/// close it or start an escape.
fn swift_literal(text: &str) -> String {
    let mut longest = 0;
    let mut current = 0;
    for ch in text.chars() {
        if ch == '#' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    let hashes = "#".repeat(longest + 1);

    if text.contains('\n') || text.contains('\r') {
        format!("{hashes}\"\"\"\n{text}\n\"\"\"{hashes}")
    } else {
        format!("{hashes}\"{text}\"{hashes}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ArgSpec, ArgValue};
    use std::path::PathBuf;

    fn definition(command: &str, language: Language) -> TestDefinition {
        TestDefinition {
            name: "Sample".to_string(),
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

    #[test]
    fn recognised_primitives_translate_natively() {
        let def = definition(
            "-- grab it\nset the clipboard to \"secret\"\ndelay 0.5\nlog \"copied\"\nreturn the clipboard",
            Language::AppleScript,
        );
        let program = transpile(&def, "#!/usr/bin/osascript\nignored");
        assert_eq!(program.mode, TranspileMode::Native);
        assert!(program.source.contains("import AppKit"));
        assert!(program
            .source
            .contains("NSPasteboard.general.setString(#\"secret\"#, forType: .string)"));
        assert!(program.source.contains("Thread.sleep(forTimeInterval: 0.5)"));
        assert!(program.source.contains("NSPasteboard.general.string(forType: .string)"));
        assert!(!program.source.contains("osascript"));
        assert!(!program.source.contains("func shell"));
    }

    #[test]
    fn shell_commands_unescape_applescript_literals() {
        let def = definition(r#"do shell script "echo \"hi\" | tr a-z A-Z""#, Language::AppleScript);
        let program = transpile(&def, "");
        assert_eq!(program.mode, TranspileMode::Native);
        assert!(program.source.contains("func shell"));
        assert!(program
            .source
            .contains(r##"result = shell(#"echo "hi" | tr a-z A-Z"#)"##));
        assert!(!program.source.contains("AppKit"));
    }

    #[test]
    fn everything_else_uses_the_bridge() {
        let script = "#!/usr/bin/osascript\ntell application \"Finder\" to get name of startup disk";
        let def = definition(
            "tell application \"Finder\" to get name of startup disk",
            Language::AppleScript,
        );
        let program = transpile(&def, script);
        assert_eq!(program.mode, TranspileMode::Bridge);
        assert!(program.source.contains("/usr/bin/osascript"));
        assert!(program.source.contains("process.arguments = [\"-\"]"));
        assert!(program.source.contains("tell application \"Finder\""));
        assert!(!program.source.contains("#!/usr/bin/osascript"));
        assert!(program.source.contains("exit(process.terminationStatus)"));

        let jxa = definition("Application('Finder').name()", Language::JavaScript);
        let program = transpile(&jxa, "#!/usr/bin/osascript -l JavaScript\nApplication('Finder').name()");
        assert_eq!(program.mode, TranspileMode::Bridge);
        assert!(program
            .source
            .contains("process.arguments = [\"-l\", \"JavaScript\", \"-\"]"));

        let mut with_args = definition("do shell script \"echo #{word}\"", Language::AppleScript);
        with_args.args = vec![ArgSpec {
            name: "word".to_string(),
            default: ArgValue::String("hi".to_string()),
        }];
        assert_eq!(transpile(&with_args, "").mode, TranspileMode::Bridge);

        let framework = definition(
            "use framework \"AppKit\"\ndo shell script \"id\"",
            Language::AppleScript,
        );
        assert_eq!(transpile(&framework, "").mode, TranspileMode::Bridge);

        let trailing = definition("do shell script \"id\" & \"x\"", Language::AppleScript);
        assert_eq!(transpile(&trailing, "").mode, TranspileMode::Bridge);
    }

    #[test]
    fn return_before_the_last_statement_uses_the_bridge() {
        let early = definition(
            "return the clipboard\ndo shell script \"rm -rf /tmp/victim\"",
            Language::AppleScript,
        );
        let program = transpile(&early, "#!/usr/bin/osascript\nreturn the clipboard");
        assert_eq!(program.mode, TranspileMode::Bridge);
        assert!(!program.source.contains("func shell"));

        let commented = definition(
            "do shell script \"id\"\n-- done\nreturn the clipboard\n",
            Language::AppleScript,
        );
        assert_eq!(transpile(&commented, "").mode, TranspileMode::Native);
    }

    #[test]
    fn shell_helper_matches_do_shell_script_output() {
        let def = definition("do shell script \"printf 'a\\nb\\n'\"", Language::AppleScript);
        let program = transpile(&def, "");
        assert_eq!(program.mode, TranspileMode::Native);
        let drain = program
            .source
            .find("DispatchQueue.global().async")
            .expect("stderr drained on a background queue");
        let stdout_read = program
            .source
            .find("stdout.fileHandleForReading.readDataToEndOfFile()")
            .expect("stdout read");
        assert!(drain < stdout_read);
        assert!(program.source.contains("drained.wait()"));
        assert!(program.source.contains("if text.hasSuffix(\"\\n\") {"));
        assert!(!program.source.contains("while text.hasSuffix"));
        assert!(program
            .source
            .contains("text.replacingOccurrences(of: \"\\n\", with: \"\\r\")"));
    }

    #[test]
    fn raw_literals_outgrow_embedded_hashes() {
        assert_eq!(swift_literal("plain"), "#\"plain\"#");
        assert_eq!(swift_literal("a \"## b"), "###\"a \"## b\"###");
        assert_eq!(swift_literal("x\ny"), "#\"\"\"\nx\ny\n\"\"\"#");
    }
}

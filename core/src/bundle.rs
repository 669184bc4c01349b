use crate::definition::{Language, TestDefinition};
use crate::naming::bundle_identifier;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const PLIST_DOCTYPE: &str =
    r#"plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd""#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBundle {
    pub root: PathBuf,
    pub executable: PathBuf,
    pub script: PathBuf,
}

enum PlistValue<'a> {
    String(&'a str),
    Bool(bool),
}

pub fn info_plist(definition: &TestDefinition) -> io::Result<String> {
    let base = definition.base_name();
    let identifier = bundle_identifier(&definition.technique_id, &base);
    let usage = format!(
        "{} sends Apple Events to other applications.",
        definition.name
    );

    let mut entries: Vec<(&str, PlistValue<'_>)> = vec![
        ("CFBundleDevelopmentRegion", PlistValue::String("en")),
        ("CFBundleDisplayName", PlistValue::String(&definition.name)),
        ("CFBundleExecutable", PlistValue::String(&base)),
        ("CFBundleIdentifier", PlistValue::String(&identifier)),
        ("CFBundleInfoDictionaryVersion", PlistValue::String("6.0")),
        ("CFBundleName", PlistValue::String(&base)),
        ("CFBundlePackageType", PlistValue::String("APPL")),
        ("CFBundleShortVersionString", PlistValue::String("1.0")),
        ("CFBundleSignature", PlistValue::String("????")),
        ("CFBundleVersion", PlistValue::String("1")),
        ("LSMinimumSystemVersion", PlistValue::String("10.13")),
        ("LSUIElement", PlistValue::Bool(true)),
    ];
    if definition.tcc_required {
        entries.push(("NSAppleEventsUsageDescription", PlistValue::String(&usage)));
    }

    let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    emit(&mut writer, Event::DocType(BytesText::from_escaped(PLIST_DOCTYPE)))?;
    emit(
        &mut writer,
        Event::Start(BytesStart::new("plist").with_attributes([("version", "1.0")])),
    )?;
    emit(&mut writer, Event::Start(BytesStart::new("dict")))?;
    for (key, value) in &entries {
        text_element(&mut writer, "key", key)?;
        match value {
            PlistValue::String(text) => text_element(&mut writer, "string", text)?,
            PlistValue::Bool(true) => emit(&mut writer, Event::Empty(BytesStart::new("true")))?,
            PlistValue::Bool(false) => emit(&mut writer, Event::Empty(BytesStart::new("false")))?,
        }
    }
    emit(&mut writer, Event::End(BytesEnd::new("dict")))?;
    emit(&mut writer, Event::End(BytesEnd::new("plist")))?;

    let mut xml = String::from_utf8(writer.into_inner()).map_err(io::Error::other)?;
    xml.push('\n');
    Ok(xml)
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> io::Result<()> {
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> io::Result<()> {
    writer
        .write_event(event)
        .map_err(|err| io::Error::other(err.to_string()))
}

pub fn launcher(language: Language, script_file_name: &str) -> String {
    let mut flags = String::new();
    for flag in language.osa_flags() {
        flags.push_str(flag);
        flags.push(' ');
    }
    format!(
        "#!/bin/sh\n\
         here=\"$(cd \"$(dirname \"$0\")\" && pwd)\"\n\
         exec /usr/bin/osascript {flags}\"$here/../Resources/Scripts/{script_file_name}\" \"$@\"\n"
    )
}

pub fn stage(definition: &TestDefinition, dir: &Path, script: &Path) -> io::Result<StagedBundle> {
    let base = definition.base_name();
    let root = dir.join(format!("{base}.app"));
    if root.exists() {
        fs::remove_dir_all(&root)?;
    }

    let contents = root.join("Contents");
    let macos = contents.join("MacOS");
    let scripts = contents.join("Resources").join("Scripts");
    fs::create_dir_all(&macos)?;
    fs::create_dir_all(&scripts)?;

    let extension = script
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("applescript");
    let script_name = format!("main.{extension}");
    let embedded = scripts.join(&script_name);
    fs::copy(script, &embedded)?;

    fs::write(contents.join("Info.plist"), info_plist(definition)?)?;
    fs::write(contents.join("PkgInfo"), "APPL????")?;

    let executable = macos.join(&base);
    fs::write(&executable, launcher(definition.language, &script_name))?;
    crate::compiler::mark_executable(&executable)?;

    Ok(StagedBundle {
        root,
        executable,
        script: embedded,
    })
}

use crate::config::ToolchainConfig;
use crate::definition::Language;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    ScriptCompiler,
    Archiver,
    NativeCompiler,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::ScriptCompiler => "script compiler",
            Tool::Archiver => "archiver",
            Tool::NativeCompiler => "native compiler",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    pub tool: Tool,
    pub input: PathBuf,
    pub output: PathBuf,
    pub language: Language,
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolchainError {
    #[error("no command configured for the {tool}")]
    NotConfigured { tool: Tool },
    #[error("invalid {tool} command: {reason}")]
    InvalidCommand { tool: Tool, reason: String },
    #[error("failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },
    #[error("'{program}' timed out after {timeout_ms}ms")]
    Timeout { program: String, timeout_ms: u64 },
    #[error("'{program}' exited with code {exit_code:?}: {stderr}")]
    Failed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("failed while waiting for '{program}': {reason}")]
    Wait { program: String, reason: String },
}

pub trait Toolchain: Send + Sync {
    fn run(&self, request: &ToolRequest) -> Result<ToolOutput, ToolchainError>;
}

#[derive(Debug, Clone)]
pub struct SystemToolchain {
    commands: ToolchainConfig,
    timeout: Duration,
}

impl SystemToolchain {
    pub fn new(commands: ToolchainConfig, timeout: Duration) -> Self {
        Self { commands, timeout }
    }

    pub fn argv(&self, request: &ToolRequest) -> Result<Vec<String>, ToolchainError> {
        let configured = match request.tool {
            Tool::ScriptCompiler => &self.commands.script_compiler,
            Tool::Archiver => &self.commands.archiver,
            Tool::NativeCompiler => &self.commands.native_compiler,
        };
        let mut argv =
            shell_words::split(configured).map_err(|err| ToolchainError::InvalidCommand {
                tool: request.tool,
                reason: err.to_string(),
            })?;
        if argv.is_empty() {
            return Err(ToolchainError::NotConfigured { tool: request.tool });
        }

        let input = request.input.to_string_lossy().to_string();
        let output = request.output.to_string_lossy().to_string();
        match request.tool {
            Tool::ScriptCompiler => {
                argv.extend(request.language.osa_flags().iter().map(|s| s.to_string()));
                argv.extend(["-o".to_string(), output, input]);
            }
            Tool::Archiver => {
                argv.extend(
                    ["-c", "-k", "--sequesterRsrc", "--keepParent"]
                        .iter()
                        .map(|s| s.to_string()),
                );
                argv.extend([input, output]);
            }
            Tool::NativeCompiler => {
                argv.extend(["-o".to_string(), output, input]);
            }
        }
        Ok(argv)
    }
}

impl Toolchain for SystemToolchain {
    fn run(&self, request: &ToolRequest) -> Result<ToolOutput, ToolchainError> {
        let mut argv = self.argv(request)?;
        let program = argv.remove(0);
        log::debug!("running {}: {} {}", request.tool, program, argv.join(" "));

        let started = Instant::now();
        let mut child = Command::new(&program)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ToolchainError::Spawn {
                program: program.clone(),
                reason: err.to_string(),
            })?;

        // Drain both pipes while waiting so a chatty tool cannot block on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                stop(&mut child);
                return Err(ToolchainError::Timeout {
                    program,
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            Err(err) => {
                stop(&mut child);
                return Err(ToolchainError::Wait {
                    program,
                    reason: err.to_string(),
                });
            }
        };

        let output = ToolOutput {
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
            exit_code: status.code(),
            duration: started.elapsed(),
        };

        if status.success() {
            Ok(output)
        } else {
            Err(ToolchainError::Failed {
                program,
                exit_code: output.exit_code,
                stderr: truncate_output(&output.stderr),
            })
        }
    }
}

/// Kills and reaps the child so no zombie outlives the run.
fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        String::from_utf8_lossy(&buffer).to_string()
    })
}

fn truncate_output(text: &str) -> String {
    const MAX: usize = 512;
    let trimmed = text.trim();
    if trimmed.len() > MAX {
        let mut end = MAX;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}

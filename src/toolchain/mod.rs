//! Assembling and linking generated modules with external tools.
//!
//! Process spawning sits behind the `CommandRunner` trait so the build steps
//! can be checked without an assembler installed.

use crate::codegen::Target;
use crate::config::ToolchainConfig;
use log::info;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Command '{command}' failed with {}", describe_exit(.code))]
    ExitStatus { command: String, code: Option<i32> },
}

/// A program plus its arguments, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs external commands to completion.
pub trait CommandRunner {
    /// Runs `command` and waits for it. A non-zero exit status is an error.
    fn run(&mut self, command: &ToolCommand) -> Result<(), ToolchainError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, command: &ToolCommand) -> Result<(), ToolchainError> {
        info!("[CMD] {}", command);
        let status = Command::new(&command.program)
            .args(&command.args)
            .status()
            .map_err(|source| ToolchainError::Spawn {
                program: command.program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ToolchainError::ExitStatus {
                command: command.to_string(),
                code: status.code(),
            })
        }
    }
}

/// The assembler and linker invocations that turn `<base>.asm` into an executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    assembly: PathBuf,
    assemble: ToolCommand,
    link: ToolCommand,
    executable: PathBuf,
}

impl Toolchain {
    /// Builds the default commands for `target`, then applies overrides from `config`.
    ///
    /// # Arguments
    /// * `target` - Platform the module was generated for.
    /// * `base` - Output path without extension; `<base>.asm` must already exist.
    /// * `config` - Optional program names and flag lists that replace the defaults.
    pub fn for_target(target: Target, base: &Path, config: &ToolchainConfig) -> Self {
        let asm = with_extension(base, "asm");
        let object = with_extension(base, target.object_extension());
        let executable = match target.executable_extension() {
            Some(ext) => with_extension(base, ext),
            None => base.to_path_buf(),
        };

        let (assembler, assembler_args, linker, linker_args) = match target {
            Target::Nasm => (
                "nasm",
                vec![
                    "-felf64".to_string(),
                    "-o".to_string(),
                    display(&object),
                    display(&asm),
                ],
                "ld",
                vec!["-o".to_string(), display(&executable), display(&object)],
            ),
            Target::Masm => (
                "ml64",
                vec![
                    "-nologo".to_string(),
                    "/c".to_string(),
                    "/Cx".to_string(),
                    format!("/Fo{}", display(&object)),
                    display(&asm),
                ],
                "link",
                vec![
                    "-nologo".to_string(),
                    "/SUBSYSTEM:CONSOLE".to_string(),
                    "/NODEFAULTLIB".to_string(),
                    "/entry:_start".to_string(),
                    format!("/OUT:{}", display(&executable)),
                    display(&object),
                    "ucrt.lib".to_string(),
                ],
            ),
        };

        let assemble = ToolCommand::new(
            config.assembler.as_deref().unwrap_or(assembler),
            config.assembler_args.clone().unwrap_or(assembler_args),
        );
        let link = ToolCommand::new(
            config.linker.as_deref().unwrap_or(linker),
            config.linker_args.clone().unwrap_or(linker_args),
        );

        Self {
            assembly: asm,
            assemble,
            link,
            executable,
        }
    }

    pub fn steps(&self) -> [&ToolCommand; 2] {
        [&self.assemble, &self.link]
    }

    /// Path the assembly module must be written to before `build`.
    pub fn assembly(&self) -> &Path {
        &self.assembly
    }

    /// Path of the executable the link step produces.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Assembles then links, stopping at the first failing step.
    pub fn build<R: CommandRunner>(&self, runner: &mut R) -> Result<(), ToolchainError> {
        for step in self.steps() {
            runner.run(step)?;
        }
        info!("Built executable {}", self.executable.display());
        Ok(())
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

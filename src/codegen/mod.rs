//! Code generation: translate a `Program` into a native x86-64 assembly module.
//!
//! Every module has the same three parts: a fixed `print` routine that writes
//! one unsigned integer and a newline to stdout, an entry point `_start` that
//! replays the program on the native call stack, and a clean exit. Generation
//! is a pure function of the program and the target; assembling and linking
//! the result is the job of `crate::toolchain`.
//!
//! # Example
//! ```
//! use rporth::codegen::{CodeGenerator, Target};
//! use rporth::loader::parse_source;
//!
//! let program = parse_source("34 35 + .").unwrap();
//! let asm = CodeGenerator::new(Target::Nasm).generate(&program);
//! assert!(asm.contains("call print"));
//! ```

pub mod masm;
pub mod nasm;

use crate::program::Program;
use log::info;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Assembly dialect and platform of the generated module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Linux x86-64, NASM syntax, raw syscalls.
    #[default]
    Nasm,
    /// Windows x64, MASM syntax, UCRT `_write`.
    Masm,
}

impl Target {
    /// File extension of the object file the assembler produces.
    pub fn object_extension(&self) -> &'static str {
        match self {
            Target::Nasm => "o",
            Target::Masm => "obj",
        }
    }

    /// File extension of the linked executable, if the platform uses one.
    pub fn executable_extension(&self) -> Option<&'static str> {
        match self {
            Target::Nasm => None,
            Target::Masm => Some("exe"),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Nasm => f.write_str("nasm"),
            Target::Masm => f.write_str("masm"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("Failed to write assembly to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct CodeGenerator {
    target: Target,
}

impl CodeGenerator {
    pub fn new(target: Target) -> Self {
        Self { target }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Translates `program` into a complete assembly module.
    ///
    /// The output depends only on the program and the target, so calling this
    /// twice yields byte-identical text.
    pub fn generate(&self, program: &Program) -> String {
        match self.target {
            Target::Nasm => nasm::NasmEmitter::new().emit(program),
            Target::Masm => masm::MasmEmitter::new().emit(program),
        }
    }

    /// Generates the module and writes it to `path`.
    pub fn write_module(&self, program: &Program, path: &Path) -> Result<(), CodegenError> {
        let asm = self.generate(program);
        fs::write(path, asm).map_err(|source| CodegenError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            "Generated {} assembly for {} operation(s) in {}",
            self.target,
            program.len(),
            path.display()
        );
        Ok(())
    }
}

/// Whether `value` can be encoded as the sign-extended 32-bit immediate of `push`.
pub(crate) fn fits_imm32(value: i64) -> bool {
    i32::try_from(value).is_ok()
}

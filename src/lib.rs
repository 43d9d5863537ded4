//! A tiny stack language with two backends.
//!
//! Source text is split on whitespace and parsed into a `Program` of `Op`s by
//! `loader`. The same program can then be run directly by the simulator in `vm`
//! or translated into x86-64 assembly by `codegen`, which `toolchain` hands to
//! an external assembler and linker.

pub mod codegen;
pub mod config;
pub mod loader;
pub mod program;
pub mod toolchain;
pub mod vm;

pub use program::Program;
pub use vm::op::Op;

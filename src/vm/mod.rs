//! The operation model and the direct stack simulator.

pub mod engine;
pub mod op;

pub use engine::{VirtualMachine, VmError};
pub use op::{Op, TokenError};

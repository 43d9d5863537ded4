use crate::program::Program;
use crate::vm::op::Op;
use log::debug;
use std::io::{self, Write};
use thiserror::Error;

/// Default ceiling on simulated stack depth. A default 8 MiB native stack holds
/// about this many 8-byte values.
pub const DEFAULT_STACK_CAPACITY: usize = 1 << 20;

#[derive(Error, Debug)]
pub enum VmError {
    #[error("Stack underflow at operation #{index} ('{op}')")]
    StackUnderflow { index: usize, op: Op },
    #[error("Stack overflow at operation #{index}: more than {limit} values")]
    StackOverflow { index: usize, limit: usize },
    #[error("Failed to write program output: {0}")]
    Output(#[from] io::Error),
}

/// Executes a `Program` directly against an in-memory value stack.
pub struct VirtualMachine {
    stack: Vec<i64>,
    capacity: usize,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMachine {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STACK_CAPACITY)
    }

    /// Creates a machine whose stack refuses to grow past `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stack: Vec::new(),
            capacity,
        }
    }

    /// Values left on the stack by the last `execute` call, bottom first.
    pub fn stack(&self) -> &[i64] {
        &self.stack
    }

    /// Runs every operation in order, writing `Print` output to `out`.
    ///
    /// The stack is cleared first, so runs never see each other's values.
    /// Arithmetic wraps on overflow, the same as the generated native code.
    ///
    /// # Errors
    /// Returns an error if:
    /// - An operation pops more values than the stack holds.
    /// - A push would exceed the machine's capacity.
    /// - Writing to `out` fails.
    pub fn execute<W: Write>(&mut self, program: &Program, out: &mut W) -> Result<(), VmError> {
        self.stack.clear();

        for (index, op) in program.iter().enumerate() {
            match *op {
                Op::Push(value) => self.push(value, index)?,
                Op::Add => self.apply_binary_op(index, op, |a, b| b.wrapping_add(a))?,
                // `a` is the top of the stack, so the deeper value is the minuend.
                Op::Subtract => self.apply_binary_op(index, op, |a, b| b.wrapping_sub(a))?,
                Op::Print => {
                    let a = self.pop(index, op)?;
                    writeln!(out, "{}", a)?;
                }
            }
        }

        out.flush()?;
        debug!(
            "Simulation finished after {} operations, {} value(s) left on the stack",
            program.len(),
            self.stack.len()
        );
        Ok(())
    }

    #[inline]
    fn push(&mut self, val: i64, index: usize) -> Result<(), VmError> {
        if self.stack.len() < self.capacity {
            self.stack.push(val);
            Ok(())
        } else {
            Err(VmError::StackOverflow {
                index,
                limit: self.capacity,
            })
        }
    }

    #[inline]
    fn pop(&mut self, index: usize, op: &Op) -> Result<i64, VmError> {
        self.stack
            .pop()
            .ok_or(VmError::StackUnderflow { index, op: *op })
    }

    /// Pops `a` (top) then `b` and pushes `f(a, b)`.
    #[inline]
    fn apply_binary_op<F>(&mut self, index: usize, op: &Op, f: F) -> Result<(), VmError>
    where
        F: Fn(i64, i64) -> i64,
    {
        let a = self.pop(index, op)?;
        let b = self.pop(index, op)?;
        self.push(f(a, b), index)
    }
}

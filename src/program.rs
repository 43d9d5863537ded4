use crate::vm::op::Op;
use thiserror::Error;

/// An ordered, immutable sequence of operations.
///
/// Built once by the loader (or from a `Vec<Op>` in tests and benches) and only
/// ever borrowed by the simulator and the code generators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    ops: Vec<Op>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepthError {
    #[error("Stack underflow at operation #{index} ('{op}'): needs {needed}, has {depth}")]
    Underflow {
        index: usize,
        op: Op,
        needed: usize,
        depth: usize,
    },
}

impl Program {
    pub fn new(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Op> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Walks the program tracking only the stack depth.
    ///
    /// # Returns
    /// * `Ok(max_depth)` - The deepest the stack gets while running the program.
    /// * `Err(DepthError)` - The first operation that would pop an empty stack.
    pub fn check_stack_depth(&self) -> Result<usize, DepthError> {
        let mut depth = 0usize;
        let mut max_depth = 0usize;
        for (index, op) in self.ops.iter().enumerate() {
            let (pops, pushes) = op.stack_effect();
            if depth < pops {
                return Err(DepthError::Underflow {
                    index,
                    op: *op,
                    needed: pops,
                    depth,
                });
            }
            depth = depth - pops + pushes;
            max_depth = max_depth.max(depth);
        }
        Ok(max_depth)
    }
}

impl From<Vec<Op>> for Program {
    fn from(ops: Vec<Op>) -> Self {
        Self::new(ops)
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Op;
    type IntoIter = std::slice::Iter<'a, Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

//! Linux x86-64 output in NASM syntax.
//!
//! The module is self-contained: it talks to the kernel through `syscall`
//! and needs nothing from libc, so `nasm -felf64` plus a bare `ld` is enough.

use super::fits_imm32;
use crate::program::Program;
use crate::vm::op::Op;

/// Prints the unsigned value in `rdi` followed by a newline.
///
/// Digits are produced least-significant first into a 32-byte buffer on the
/// stack, dividing by 10 with the `0xCCCCCCCCCCCCCCCD` reciprocal (then `shr 3`).
/// The loop runs until the quotient is zero, so `0` prints as a single digit.
const PRINT_ROUTINE: &str = r#"print:
    sub     rsp, 40
    mov     rcx, rdi
    mov     r10, 0xCCCCCCCCCCCCCCCD
    lea     r8, [rsp+31]
    mov     BYTE [r8], 10
.digit:
    mov     rax, rcx
    mul     r10
    shr     rdx, 3
    lea     rax, [rdx+rdx*4]
    add     rax, rax
    mov     r9, rcx
    sub     r9, rax
    add     r9b, '0'
    dec     r8
    mov     BYTE [r8], r9b
    mov     rcx, rdx
    test    rdx, rdx
    jnz     .digit
    mov     rax, 1
    mov     rdi, 1
    mov     rsi, r8
    lea     rdx, [rsp+32]
    sub     rdx, r8
    syscall
    add     rsp, 40
    ret
"#;

/// Register holding the argument of `print`.
pub const PRINT_ARG_REGISTER: &str = "rdi";

pub(super) struct NasmEmitter {
    asm: String,
}

impl NasmEmitter {
    pub(super) fn new() -> Self {
        Self { asm: String::new() }
    }

    pub(super) fn emit(mut self, program: &Program) -> String {
        self.asm.push_str(";; generated by rporth\n");
        self.asm.push_str("BITS 64\n");
        self.asm.push_str("segment .text\n\n");
        self.asm.push_str(PRINT_ROUTINE);
        self.asm.push('\n');
        self.asm.push_str("global _start\n");
        self.asm.push_str("_start:\n");

        for op in program {
            self.emit_op(op);
        }

        self.asm.push_str("    ;; -- exit --\n");
        self.asm.push_str("    mov rax, 60\n");
        self.asm.push_str("    mov rdi, 0\n");
        self.asm.push_str("    syscall\n");
        self.asm
    }

    fn emit_op(&mut self, op: &Op) {
        match *op {
            Op::Push(value) => {
                self.asm.push_str(&format!("    ;; -- push {} --\n", value));
                if fits_imm32(value) {
                    self.asm.push_str(&format!("    push {}\n", value));
                } else {
                    self.asm.push_str(&format!("    mov rax, {}\n", value));
                    self.asm.push_str("    push rax\n");
                }
            }
            Op::Add => {
                self.asm.push_str("    ;; -- add --\n");
                self.asm.push_str("    pop rax\n");
                self.asm.push_str("    pop rbx\n");
                self.asm.push_str("    add rax, rbx\n");
                self.asm.push_str("    push rax\n");
            }
            Op::Subtract => {
                self.asm.push_str("    ;; -- subtract --\n");
                self.asm.push_str("    pop rax\n");
                self.asm.push_str("    pop rbx\n");
                self.asm.push_str("    sub rbx, rax\n");
                self.asm.push_str("    push rbx\n");
            }
            Op::Print => {
                self.asm.push_str("    ;; -- print --\n");
                self.asm.push_str(&format!("    pop {}\n", PRINT_ARG_REGISTER));
                self.asm.push_str("    call print\n");
            }
        }
    }
}

//! Windows x64 output in MASM (`ml64`) syntax, linked against the UCRT.

use super::fits_imm32;
use crate::program::Program;
use crate::vm::op::Op;

/// Prints the unsigned value in `rcx` followed by a newline via `_write(1, buf, len)`.
///
/// The routine realigns the stack itself because `_start` calls it at whatever
/// depth the program has reached. 32 bytes of shadow space sit below the digit
/// buffer.
const PRINT_ROUTINE: &str = r#"print PROC
    push    rbp
    mov     rbp, rsp
    and     rsp, -16
    sub     rsp, 64
    mov     r10, 0CCCCCCCCCCCCCCCDh
    lea     r8, [rsp+63]
    mov     BYTE PTR [r8], 10
print_digit:
    mov     rax, rcx
    mul     r10
    shr     rdx, 3
    lea     rax, [rdx+rdx*4]
    add     rax, rax
    mov     r9, rcx
    sub     r9, rax
    add     r9b, 48
    dec     r8
    mov     BYTE PTR [r8], r9b
    mov     rcx, rdx
    test    rdx, rdx
    jnz     print_digit
    lea     rax, [rsp+64]
    sub     rax, r8
    mov     rdx, r8
    mov     r8, rax
    mov     ecx, 1
    call    _write
    mov     rsp, rbp
    pop     rbp
    ret
print ENDP
"#;

pub const PRINT_ARG_REGISTER: &str = "rcx";

pub(super) struct MasmEmitter {
    asm: String,
}

impl MasmEmitter {
    pub(super) fn new() -> Self {
        Self { asm: String::new() }
    }

    pub(super) fn emit(mut self, program: &Program) -> String {
        self.asm.push_str("; generated by rporth\n");
        self.asm.push_str("extern _write: PROC\n");
        self.asm.push_str(".code\n\n");
        self.asm.push_str(PRINT_ROUTINE);
        self.asm.push('\n');
        self.asm.push_str("_start PROC\n");
        self.asm.push_str("    push rbp\n");
        self.asm.push_str("    push rbx\n");
        self.asm.push_str("    mov rbp, rsp\n");

        for op in program {
            self.emit_op(op);
        }

        self.asm.push_str("    ; -- exit --\n");
        self.asm.push_str("    mov rsp, rbp\n");
        self.asm.push_str("    pop rbx\n");
        self.asm.push_str("    pop rbp\n");
        self.asm.push_str("    xor eax, eax\n");
        self.asm.push_str("    ret\n");
        self.asm.push_str("_start ENDP\n");
        self.asm.push_str("END\n");
        self.asm
    }

    fn emit_op(&mut self, op: &Op) {
        match *op {
            Op::Push(value) => {
                self.asm.push_str(&format!("    ; -- push {} --\n", value));
                if fits_imm32(value) {
                    self.asm.push_str(&format!("    push {}\n", value));
                } else {
                    self.asm.push_str(&format!("    mov rax, {}\n", value));
                    self.asm.push_str("    push rax\n");
                }
            }
            Op::Add => {
                self.asm.push_str("    ; -- add --\n");
                self.asm.push_str("    pop rax\n");
                self.asm.push_str("    pop rbx\n");
                self.asm.push_str("    add rax, rbx\n");
                self.asm.push_str("    push rax\n");
            }
            Op::Subtract => {
                self.asm.push_str("    ; -- subtract --\n");
                self.asm.push_str("    pop rax\n");
                self.asm.push_str("    pop rbx\n");
                self.asm.push_str("    sub rbx, rax\n");
                self.asm.push_str("    push rbx\n");
            }
            Op::Print => {
                self.asm.push_str("    ; -- print --\n");
                self.asm.push_str(&format!("    pop {}\n", PRINT_ARG_REGISTER));
                self.asm.push_str("    call print\n");
            }
        }
    }
}

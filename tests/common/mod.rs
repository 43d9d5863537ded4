//! A small x86-64 interpreter for the modules the code generators emit.
//!
//! It reads both dialects, executes every instruction of the module including
//! the `print` routine, and models the two ways a module reaches the outside
//! world: the Linux `write`/`exit` syscalls and the UCRT `_write` call.

use rporth::codegen::Target;
use std::collections::HashMap;

const STACK_SIZE: u64 = 64 * 1024;
const STACK_TOP: u64 = 0x7fff_0000;
const STACK_BASE: u64 = STACK_TOP - STACK_SIZE;
/// Return address of a `_start` that is entered with `call` (Windows).
const HOST_RETURN: u64 = u64::MAX;
const STEP_LIMIT: usize = 1_000_000;

const REGISTERS: [&str; 16] = [
    "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];
const RAX: usize = 0;
const RCX: usize = 2;
const RDX: usize = 3;
const RSI: usize = 4;
const RDI: usize = 5;
const RSP: usize = 7;
const R8: usize = 8;

#[derive(Debug, PartialEq)]
pub enum Halt {
    Exit { code: i64, output: String },
    /// A `pop` in `_start` found nothing the program pushed.
    StackUnderflow { line: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Width {
    Byte,
    Dword,
    Qword,
}

impl Width {
    fn mask(self) -> u64 {
        match self {
            Width::Byte => 0xff,
            Width::Dword => 0xffff_ffff,
            Width::Qword => u64::MAX,
        }
    }
}

#[derive(Debug)]
enum Operand {
    Reg(usize, Width),
    Imm(u64),
    Mem { width: Width, address: u64 },
}

struct Instruction {
    mnemonic: String,
    operands: Vec<String>,
    text: String,
}

struct Module {
    code: Vec<Instruction>,
    labels: HashMap<String, usize>,
}

impl Module {
    fn parse(asm: &str) -> Self {
        let mut code = Vec::new();
        let mut labels = HashMap::new();
        let mut scope = String::new();

        for raw in asm.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let first = line.split_whitespace().next().unwrap_or("");
            if ["BITS", "segment", "global", "extern", ".code", "END"].contains(&first)
                || line.ends_with(" ENDP")
            {
                continue;
            }
            if let Some(name) = line.strip_suffix(" PROC") {
                scope = name.to_string();
                labels.insert(scope.clone(), code.len());
                continue;
            }
            if let Some(name) = line.strip_suffix(':') {
                let name = qualify(&scope, name);
                if !name.contains('.') {
                    scope = name.clone();
                }
                labels.insert(name, code.len());
                continue;
            }

            let (mnemonic, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let operands = rest
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| qualify(&scope, s))
                .collect();
            code.push(Instruction {
                mnemonic: mnemonic.to_string(),
                operands,
                text: line.to_string(),
            });
        }
        Self { code, labels }
    }
}

/// Local labels (`.digit`) belong to the last global label before them.
fn qualify(scope: &str, name: &str) -> String {
    if name.starts_with('.') {
        format!("{}{}", scope, name)
    } else {
        name.to_string()
    }
}

fn register(name: &str) -> Option<(usize, Width)> {
    let index_of = |name: &str| REGISTERS.iter().position(|r| *r == name);
    if let Some(index) = index_of(name) {
        return Some((index, Width::Qword));
    }
    if let Some(rest) = name.strip_prefix('e') {
        if let Some(index) = index_of(&format!("r{}", rest)) {
            return Some((index, Width::Dword));
        }
    }
    name.strip_suffix('b')
        .and_then(index_of)
        .map(|index| (index, Width::Byte))
}

fn immediate(text: &str) -> Option<u64> {
    let bytes = text.as_bytes();
    if bytes.len() == 3 && bytes[0] == b'\'' && bytes[2] == b'\'' {
        return Some(bytes[1] as u64);
    }
    if let Some(hex) = text.strip_prefix("0x") {
        return u64::from_str_radix(hex, 16).ok();
    }
    if let Some(hex) = text.strip_suffix('h') {
        if text.starts_with(|c: char| c.is_ascii_digit()) {
            return u64::from_str_radix(hex, 16).ok();
        }
    }
    text.parse::<i64>().ok().map(|v| v as u64)
}

struct Cpu {
    regs: [u64; 16],
    memory: Vec<u8>,
    zero: bool,
    output: Vec<u8>,
}

impl Cpu {
    fn new() -> Self {
        let mut regs = [0; 16];
        regs[RSP] = STACK_TOP;
        Self {
            regs,
            memory: vec![0; STACK_SIZE as usize],
            zero: false,
            output: Vec::new(),
        }
    }

    fn offset(address: u64, len: u64) -> usize {
        assert!(
            address >= STACK_BASE && address + len <= STACK_TOP,
            "memory access outside the stack at {:#x}",
            address
        );
        (address - STACK_BASE) as usize
    }

    fn load_qword(&self, address: u64) -> u64 {
        let at = Self::offset(address, 8);
        let mut bytes = [0; 8];
        bytes.copy_from_slice(&self.memory[at..at + 8]);
        u64::from_le_bytes(bytes)
    }

    fn store_qword(&mut self, address: u64, value: u64) {
        let at = Self::offset(address, 8);
        self.memory[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn push(&mut self, value: u64) {
        self.regs[RSP] -= 8;
        self.store_qword(self.regs[RSP], value);
    }

    fn pop(&mut self) -> Option<u64> {
        if self.regs[RSP] >= STACK_TOP {
            return None;
        }
        let value = self.load_qword(self.regs[RSP]);
        self.regs[RSP] += 8;
        Some(value)
    }

    /// Evaluates `base+index*scale+disp` with registers and immediates as terms.
    fn address(&self, expr: &str) -> u64 {
        expr.split('+').fold(0u64, |acc, term| {
            let term = term.trim();
            let value = match term.split_once('*') {
                Some((reg, scale)) => {
                    let (index, _) = register(reg).unwrap_or_else(|| panic!("bad index {}", reg));
                    let scale = immediate(scale).unwrap_or_else(|| panic!("bad scale {}", scale));
                    self.regs[index].wrapping_mul(scale)
                }
                None => match register(term) {
                    Some((index, _)) => self.regs[index],
                    None => immediate(term).unwrap_or_else(|| panic!("bad term {}", term)),
                },
            };
            acc.wrapping_add(value)
        })
    }

    fn operand(&self, text: &str) -> Operand {
        let (width, rest) = match text.strip_prefix("BYTE") {
            Some(rest) => (Width::Byte, rest.trim_start().trim_start_matches("PTR").trim()),
            None => (Width::Qword, text),
        };
        if let Some(expr) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            return Operand::Mem {
                width,
                address: self.address(expr),
            };
        }
        if let Some((index, width)) = register(rest) {
            return Operand::Reg(index, width);
        }
        match immediate(rest) {
            Some(value) => Operand::Imm(value),
            None => panic!("unknown operand {}", text),
        }
    }

    fn read(&self, text: &str) -> u64 {
        match self.operand(text) {
            Operand::Reg(index, width) => self.regs[index] & width.mask(),
            Operand::Imm(value) => value,
            Operand::Mem { width: Width::Byte, address } => {
                self.memory[Self::offset(address, 1)] as u64
            }
            Operand::Mem { address, .. } => self.load_qword(address),
        }
    }

    fn write(&mut self, text: &str, value: u64) {
        match self.operand(text) {
            Operand::Reg(index, Width::Byte) => {
                self.regs[index] = (self.regs[index] & !0xff) | (value & 0xff);
            }
            Operand::Reg(index, width) => self.regs[index] = value & width.mask(),
            Operand::Mem { width: Width::Byte, address } => {
                self.memory[Self::offset(address, 1)] = value as u8;
            }
            Operand::Mem { address, .. } => self.store_qword(address, value),
            Operand::Imm(_) => panic!("cannot write to immediate {}", text),
        }
    }

    fn width_of(&self, text: &str) -> Width {
        match self.operand(text) {
            Operand::Reg(_, width) | Operand::Mem { width, .. } => width,
            Operand::Imm(_) => Width::Qword,
        }
    }

    /// Applies `f` to `dst` and `src`, stores into `dst` and sets the zero flag.
    fn arith(&mut self, dst: &str, src: &str, f: impl Fn(u64, u64) -> u64) {
        let mask = self.width_of(dst).mask();
        let result = f(self.read(dst), self.read(src)) & mask;
        self.write(dst, result);
        self.zero = result == 0;
    }

    fn write_out(&mut self, fd: u64, buffer: u64, len: u64) {
        assert_eq!(fd, 1, "only stdout is written");
        let at = Self::offset(buffer, len);
        let bytes = self.memory[at..at + len as usize].to_vec();
        self.output.extend(bytes);
    }

    fn halt(&mut self, code: u64) -> Halt {
        Halt::Exit {
            code: code as i64,
            output: String::from_utf8(std::mem::take(&mut self.output)).unwrap(),
        }
    }
}

/// Runs the module generated for `target` from `_start` until it exits.
pub fn run(target: Target, asm: &str) -> Halt {
    let module = Module::parse(asm);
    let mut cpu = Cpu::new();
    if target == Target::Masm {
        cpu.push(HOST_RETURN);
    }
    let jump = |label: &str| -> usize {
        *module
            .labels
            .get(label)
            .unwrap_or_else(|| panic!("unknown label {}", label))
    };

    let mut pc = jump("_start");
    for _ in 0..STEP_LIMIT {
        let instruction = module
            .code
            .get(pc)
            .unwrap_or_else(|| panic!("execution ran off the end of the module"));
        pc += 1;
        let ops: Vec<&str> = instruction.operands.iter().map(String::as_str).collect();

        match (instruction.mnemonic.as_str(), ops.as_slice()) {
            ("push", [src]) => {
                let value = cpu.read(src);
                cpu.push(value);
            }
            ("pop", [dst]) => match cpu.pop() {
                Some(value) => cpu.write(dst, value),
                None => {
                    return Halt::StackUnderflow {
                        line: instruction.text.clone(),
                    }
                }
            },
            ("mov", [dst, src]) => {
                let value = cpu.read(src);
                cpu.write(dst, value);
            }
            ("lea", [dst, src]) => {
                let expr = src.trim_start_matches('[').trim_end_matches(']');
                let address = cpu.address(expr);
                cpu.write(dst, address);
            }
            ("add", [dst, src]) => cpu.arith(dst, src, u64::wrapping_add),
            ("sub", [dst, src]) => cpu.arith(dst, src, u64::wrapping_sub),
            ("and", [dst, src]) => cpu.arith(dst, src, |a, b| a & b),
            ("xor", [dst, src]) => cpu.arith(dst, src, |a, b| a ^ b),
            ("shr", [dst, src]) => cpu.arith(dst, src, |a, b| a >> b),
            ("dec", [dst]) => cpu.arith(dst, "1", u64::wrapping_sub),
            ("test", [a, b]) => {
                let mask = cpu.width_of(a).mask();
                cpu.zero = cpu.read(a) & cpu.read(b) & mask == 0;
            }
            ("mul", [src]) => {
                let product = cpu.regs[RAX] as u128 * cpu.read(src) as u128;
                cpu.regs[RAX] = product as u64;
                cpu.regs[RDX] = (product >> 64) as u64;
            }
            ("jnz", [label]) => {
                if !cpu.zero {
                    pc = jump(*label);
                }
            }
            ("call", ["_write"]) => {
                assert_eq!(cpu.regs[RSP] % 16, 0, "_write called with a misaligned stack");
                let (fd, buffer, len) = (cpu.regs[RCX], cpu.regs[RDX], cpu.regs[R8]);
                cpu.write_out(fd, buffer, len);
                cpu.regs[RAX] = len;
            }
            ("call", [label]) => {
                cpu.push(pc as u64);
                pc = jump(*label);
            }
            ("ret", []) => match cpu.pop() {
                Some(HOST_RETURN) => {
                    let code = cpu.regs[RAX] & Width::Dword.mask();
                    return cpu.halt(code);
                }
                Some(address) => pc = address as usize,
                None => panic!("ret with an empty stack"),
            },
            ("syscall", []) => match cpu.regs[RAX] {
                1 => {
                    let (fd, buffer, len) = (cpu.regs[RDI], cpu.regs[RSI], cpu.regs[RDX]);
                    cpu.write_out(fd, buffer, len);
                    cpu.regs[RAX] = len;
                }
                60 => {
                    let code = cpu.regs[RDI];
                    return cpu.halt(code);
                }
                other => panic!("unexpected syscall {}", other),
            },
            _ => panic!("unsupported instruction: {}", instruction.text),
        }
    }
    panic!("no exit after {} steps", STEP_LIMIT);
}

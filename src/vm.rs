use crate::ir::{Instruction, Program};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Stdin, StdinLock, Stdout, Write};
use thiserror::Error;
use tracing::{debug, trace};

/// The root component for the virtual machine
pub struct Vm<R, W> {
    config: VmConfig,
    program: Program,
    stack: Vec<i64>,
    call_stack: Vec<usize>,
    heap: BTreeMap<i64, i64>,
    instruction_pointer: usize,
    done: bool,
    input: R,
    output: W,
}

/// Configuration options for the virtual machine
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct VmConfig {
    /// trace the program counter, instruction and stacks before each executed instruction
    pub debug: bool,
    /// additionally trace a dump of all non-zero heap cells
    pub debug_heap: bool,
    /// drop everything the program prints
    pub suppress_output: bool,
}

impl VmConfig {
    /// Creates a new config with the given arguments
    ///
    /// - `debug` trace debugging information when executing an instruction
    /// - `debug_heap` trace a heap dump when executing an instruction
    /// - `suppress_output` discard program output
    pub fn new(debug: bool, debug_heap: bool, suppress_output: bool) -> VmConfig {
        VmConfig {
            debug,
            debug_heap,
            suppress_output,
        }
    }

    /// Returns a default configuration, suppressing output
    pub fn suppressed() -> VmConfig {
        VmConfig::new(false, false, true)
    }

    /// Returns a debug configuration without heap dumps
    pub fn debug() -> VmConfig {
        VmConfig::new(true, false, false)
    }

    /// Returns a debug configuration including heap dumps
    pub fn debug_heap() -> VmConfig {
        VmConfig::new(true, true, false)
    }
}

#[derive(Debug, Error)]
pub enum VmErrorKind {
    #[error("stack underflow")]
    StackUnderflow,

    #[error("return with an empty call stack")]
    CallStackUnderflow,

    #[error("unknown label {0:?}")]
    UnknownLabel(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("input is exhausted")]
    InputExhausted,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// An execution error together with the instruction that raised it
#[derive(Debug, Error)]
#[error("{kind} - failed executing {instruction} at {index}")]
pub struct VmError {
    index: usize,
    instruction: Instruction,
    kind: VmErrorKind,
}

impl VmError {
    pub fn kind(&self) -> &VmErrorKind {
        &self.kind
    }

    /// Program counter of the failing instruction
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn instruction(&self) -> &Instruction {
        &self.instruction
    }
}

impl Vm<StdinLock<'static>, Stdout> {
    /// Creates a virtual machine reading from stdin and writing to stdout
    pub fn stdio(program: Program, config: VmConfig) -> Self {
        let stdin: Stdin = io::stdin();
        Vm::new(program, config, stdin.lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Vm<R, W> {
    /// Creates a new virtual machine with the given arguments
    ///
    /// - `program` the decoded program to execute
    /// - `config` the configuration of the virtual machine
    /// - `input` where `ReadChar` and `ReadInt` read from
    /// - `output` where `PrintChar` and `PrintInt` write to
    pub fn new(program: Program, config: VmConfig, input: R, output: W) -> Vm<R, W> {
        Vm {
            config,
            program,
            stack: vec![],
            call_stack: vec![],
            heap: BTreeMap::new(),
            instruction_pointer: 0,
            done: false,
            input,
            output,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn stack(&self) -> &[i64] {
        &self.stack
    }

    pub fn call_stack(&self) -> &[usize] {
        &self.call_stack
    }

    pub fn heap(&self) -> &BTreeMap<i64, i64> {
        &self.heap
    }

    pub fn program_counter(&self) -> usize {
        self.instruction_pointer
    }

    /// Whether a previous run completed, `run` is a no-op until the next `reset`
    pub fn is_finished(&self) -> bool {
        self.done
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Returns the next instruction to be executed in a `Some` variant. None if the program has
    /// reached its end.
    pub fn next_instruction(&self) -> Option<usize> {
        if self.done || self.instruction_pointer >= self.program.len() {
            return None;
        }

        Some(self.instruction_pointer)
    }

    /// Executes all instructions - runs the program.
    pub fn run(&mut self) -> Result<(), VmError> {
        if self.done {
            return Ok(());
        }
        debug!(
            instructions = self.program.len(),
            pc = self.instruction_pointer,
            "starting execution"
        );

        while self.step()? {}

        debug!(
            pc = self.instruction_pointer,
            stack = self.stack.len(),
            heap = self.heap.len(),
            "execution finished"
        );

        Ok(())
    }

    /// Executes a single instruction, returning whether there is anything left to execute
    pub fn step(&mut self) -> Result<bool, VmError> {
        let ip = match self.next_instruction() {
            Some(ip) => ip,
            None => {
                self.done = true;
                return Ok(false);
            }
        };
        if self.config.debug {
            trace!(
                pc = ip,
                instruction = %self.program.instructions[ip],
                stack = ?self.stack,
                call_stack = ?self.call_stack,
                "exec"
            );
        }
        if self.config.debug_heap {
            trace!(heap = ?self.generate_debug_heap_dump(), "heap");
        }

        match self.exec(ip) {
            Ok(next) => self.instruction_pointer = next,
            Err(kind) => {
                return Err(VmError {
                    index: ip,
                    instruction: self.program.instructions[ip].clone(),
                    kind,
                })
            }
        }

        if self.instruction_pointer >= self.program.len() {
            self.done = true;
        }

        Ok(!self.done)
    }

    /// Resets the internal state of the virtual machine without decoding the program again
    pub fn reset(&mut self) {
        self.stack.clear();
        self.call_stack.clear();
        self.heap.clear();
        self.instruction_pointer = 0;
        self.done = false;
    }

    fn generate_debug_heap_dump(&self) -> BTreeMap<i64, i64> {
        self.heap
            .iter()
            .filter(|(_, val)| **val != 0)
            .map(|(addr, val)| (*addr, *val))
            .collect()
    }

    fn pop(&mut self) -> Result<i64, VmErrorKind> {
        self.stack.pop().ok_or(VmErrorKind::StackUnderflow)
    }

    /// Pops the top two values, returned as `(second, top)`. Leaves the stack untouched if it
    /// holds fewer than two values.
    fn pop_pair(&mut self) -> Result<(i64, i64), VmErrorKind> {
        if self.stack.len() < 2 {
            return Err(VmErrorKind::StackUnderflow);
        }
        let top = self.pop()?;
        let second = self.pop()?;

        Ok((second, top))
    }

    fn resolve(&self, label: &str) -> Result<usize, VmErrorKind> {
        self.program
            .label(label)
            .ok_or_else(|| VmErrorKind::UnknownLabel(label.to_string()))
    }

    fn arithmetic(
        &mut self,
        op: fn(i64, i64) -> Option<i64>,
        divides: bool,
    ) -> Result<(), VmErrorKind> {
        let (x, y) = self.pop_pair()?;
        if divides && y == 0 {
            return Err(VmErrorKind::DivisionByZero);
        }
        let res = op(x, y).ok_or(VmErrorKind::Overflow)?;
        self.stack.push(res);

        Ok(())
    }

    /// Executes the instruction at `ip` and returns the next value of the program counter
    fn exec(&mut self, ip: usize) -> Result<usize, VmErrorKind> {
        let instr = self.program.instructions[ip].clone();
        let mut next = ip + 1;

        match instr {
            Instruction::Push(val) => self.stack.push(val),
            Instruction::Dupl => {
                let top = *self.stack.last().ok_or(VmErrorKind::StackUnderflow)?;
                self.stack.push(top);
            }
            Instruction::Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(VmErrorKind::StackUnderflow);
                }
                self.stack.swap(len - 1, len - 2);
            }
            Instruction::Discard => {
                self.pop()?;
            }
            Instruction::Add => self.arithmetic(i64::checked_add, false)?,
            Instruction::Sub => self.arithmetic(i64::checked_sub, false)?,
            Instruction::Mul => self.arithmetic(i64::checked_mul, false)?,
            Instruction::Div => self.arithmetic(i64::checked_div, true)?,
            Instruction::Mod => self.arithmetic(i64::checked_rem, true)?,
            Instruction::Store => {
                let (addr, val) = self.pop_pair()?;
                self.heap.insert(addr, val);
            }
            Instruction::Retrieve => {
                let addr = self.pop()?;
                let val = self.heap.get(&addr).copied().unwrap_or(0);
                self.stack.push(val);
            }
            Instruction::SetLbl(_) => (),
            Instruction::CallLbl(label) => {
                let target = self.resolve(&label)?;
                self.call_stack.push(ip);
                next = target;
            }
            Instruction::Jump(label) => next = self.resolve(&label)?,
            Instruction::JumpZero(label) => {
                if self.pop()? == 0 {
                    next = self.resolve(&label)?;
                }
            }
            Instruction::JumpNeg(label) => {
                if self.pop()? < 0 {
                    next = self.resolve(&label)?;
                }
            }
            Instruction::Ret => {
                let caller = self
                    .call_stack
                    .pop()
                    .ok_or(VmErrorKind::CallStackUnderflow)?;
                next = caller + 1;
            }
            Instruction::End => next = self.program.len(),
            Instruction::PrintChar => {
                // only the low byte of the value is emitted
                let val = self.pop()?;
                self.write(&[val as u8])?;
            }
            Instruction::PrintInt => {
                let val = self.pop()?;
                self.write(val.to_string().as_bytes())?;
            }
            Instruction::ReadChar => {
                let addr = self.pop()?;
                let byte = self.read_char()?;
                self.heap.insert(addr, i64::from(byte));
            }
            Instruction::ReadInt => {
                let addr = self.pop()?;
                let num = self.read_int()?;
                self.heap.insert(addr, num);
            }
        }

        Ok(next)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), VmErrorKind> {
        if self.config.suppress_output {
            return Ok(());
        }
        self.output.write_all(bytes)?;
        self.output.flush()?;

        Ok(())
    }

    /// Reads a single byte of input
    fn read_char(&mut self) -> Result<u8, VmErrorKind> {
        self.output.flush()?;
        let mut byte = 0;
        self.read_byte(&mut byte)?;

        Ok(byte)
    }

    fn read_byte(&mut self, byte: &mut u8) -> Result<(), VmErrorKind> {
        match self.input.read_exact(std::slice::from_mut(byte)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                Err(VmErrorKind::InputExhausted)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Reads one whitespace delimited integer, leaving the delimiter behind it unread
    fn read_int(&mut self) -> Result<i64, VmErrorKind> {
        self.output.flush()?;
        let mut token = Vec::new();
        loop {
            let buf = self.input.fill_buf()?;
            if buf.is_empty() {
                break;
            }
            let mut used = 0;
            let mut complete = false;
            for &byte in buf {
                if byte.is_ascii_whitespace() {
                    if !token.is_empty() {
                        complete = true;
                        break;
                    }
                } else {
                    token.push(byte);
                }
                used += 1;
            }
            self.input.consume(used);
            if complete {
                break;
            }
        }

        if token.is_empty() {
            return Err(VmErrorKind::InputExhausted);
        }
        let token = String::from_utf8_lossy(&token);
        token
            .parse()
            .map_err(|_| VmErrorKind::InvalidInput(format!("{:?} is not an integer", token)))
    }
}

//! A whitespace interpreter.
//!
//! Source text is reduced to a stream over the symbols `A` (space), `B` (tab) and `C` (line feed)
//! by the [`tokenizer`], decoded into a [`Program`] by the [`parser`] and executed on the stack
//! based [`Vm`]:
//!
//! ```
//! use wsvm::{decode, tokenize, Vm, VmConfig};
//!
//! // push 2, print it as an integer, end
//! let symbols = tokenize(b"   \t \n\t\n \t\n\n\n");
//! let program = decode(&symbols).unwrap();
//! let mut vm = Vm::new(program, VmConfig::default(), "".as_bytes(), Vec::new());
//! vm.run().unwrap();
//! assert_eq!(vm.output(), b"2");
//! ```

pub mod ir;
pub mod parser;
pub mod tokenizer;
pub mod vm;

pub use ir::{Instruction, Label, Program};
pub use parser::{decode, ParseError, Parser};
pub use tokenizer::{load, tokenize, TokenizeError};
pub use vm::{Vm, VmConfig, VmError, VmErrorKind};

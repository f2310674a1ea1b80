use crate::ir::{Instruction, Label, Program};
use std::collections::hash_map::Entry;
use thiserror::Error;
use tracing::debug;

/// Symbol a tokenized space maps to
pub const A: u8 = b'A';
/// Symbol a tokenized tab maps to
pub const B: u8 = b'B';
/// Symbol a tokenized line feed maps to, also the terminator of every operand
pub const C: u8 = b'C';

/// How many symbols of context an [`ParseError::UnknownOpcode`] carries
const CONTEXT_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ParseError {
    #[error("no instruction matches the symbols at position {position}: {context:?}")]
    UnknownOpcode { position: usize, context: String },

    #[error("expected sign symbol A or B at position {position}, but got {found:?}")]
    InvalidSign { position: usize, found: char },

    #[error("number starting at position {position} is not terminated")]
    UnterminatedNumber { position: usize },

    #[error("number starting at position {position} does not fit into 64 bits")]
    NumberOverflow { position: usize },

    #[error("empty label at position {position}")]
    EmptyLabel { position: usize },

    #[error("label starting at position {position} is not terminated")]
    UnterminatedLabel { position: usize },

    #[error("label {label:?} at position {position} is already set at instruction {index}")]
    DuplicateLabel {
        label: String,
        position: usize,
        index: usize,
    },
}

impl ParseError {
    /// Symbol offset at which decoding failed
    pub fn position(&self) -> usize {
        match self {
            ParseError::UnknownOpcode { position, .. }
            | ParseError::InvalidSign { position, .. }
            | ParseError::UnterminatedNumber { position }
            | ParseError::NumberOverflow { position }
            | ParseError::EmptyLabel { position }
            | ParseError::UnterminatedLabel { position }
            | ParseError::DuplicateLabel { position, .. } => *position,
        }
    }
}

/// Instruction modification parameter, the first one or two symbols of every opcode
#[derive(Debug, PartialEq, Clone, Copy)]
enum ImpKind {
    Stack,
    Arithmetic,
    Heap,
    Flow,
    IO,
}

/// Decodes a symbol stream instruction by instruction.
///
/// Iterating the parser yields the instructions in order without looking at labels; use
/// [`decode`] to obtain a complete [`Program`] with its label table.
#[derive(Debug)]
pub struct Parser<'a> {
    symbols: &'a str,
    token_index: usize,
    instruction_start: usize,
}

impl<'a> Parser<'a> {
    pub fn new(symbols: &'a str) -> Parser<'a> {
        Parser {
            symbols,
            token_index: 0,
            instruction_start: 0,
        }
    }

    /// Symbol offset of the next symbol to be consumed
    pub fn position(&self) -> usize {
        self.token_index
    }

    /// Decodes the next instruction, `None` once the stream is exhausted
    pub fn instruction(&mut self) -> Option<Result<Instruction, ParseError>> {
        if self.token_index >= self.symbols.len() {
            return None;
        }
        self.instruction_start = self.token_index;

        Some(match self.imp() {
            Ok(ImpKind::Stack) => self.stack(),
            Ok(ImpKind::Arithmetic) => self.arithmetic(),
            Ok(ImpKind::Heap) => self.heap(),
            Ok(ImpKind::Flow) => self.flow(),
            Ok(ImpKind::IO) => self.io(),
            Err(err) => Err(err),
        })
    }

    fn next_symbol(&mut self) -> Option<u8> {
        let symbol = *self.symbols.as_bytes().get(self.token_index)?;
        self.token_index += 1;

        Some(symbol)
    }

    fn unknown_opcode(&self) -> ParseError {
        let bytes = self.symbols.as_bytes();
        let start = self.instruction_start;
        let end = bytes.len().min(start + CONTEXT_LEN);

        ParseError::UnknownOpcode {
            position: start,
            context: String::from_utf8_lossy(&bytes[start..end]).into_owned(),
        }
    }

    /// Next opcode symbol, running out of input in the middle of an opcode leaves it unmatched
    fn opcode_symbol(&mut self) -> Result<u8, ParseError> {
        self.next_symbol().ok_or_else(|| self.unknown_opcode())
    }

    fn imp(&mut self) -> Result<ImpKind, ParseError> {
        match self.opcode_symbol()? {
            A => Ok(ImpKind::Stack),
            B => match self.opcode_symbol()? {
                A => Ok(ImpKind::Arithmetic),
                B => Ok(ImpKind::Heap),
                C => Ok(ImpKind::IO),
                _ => Err(self.unknown_opcode()),
            },
            C => Ok(ImpKind::Flow),
            _ => Err(self.unknown_opcode()),
        }
    }

    fn stack(&mut self) -> Result<Instruction, ParseError> {
        match self.opcode_symbol()? {
            A => Ok(Instruction::Push(self.number()?)),
            C => match self.opcode_symbol()? {
                A => Ok(Instruction::Dupl),
                B => Ok(Instruction::Swap),
                C => Ok(Instruction::Discard),
                _ => Err(self.unknown_opcode()),
            },
            _ => Err(self.unknown_opcode()),
        }
    }

    fn arithmetic(&mut self) -> Result<Instruction, ParseError> {
        match self.opcode_symbol()? {
            A => match self.opcode_symbol()? {
                A => Ok(Instruction::Add),
                B => Ok(Instruction::Sub),
                C => Ok(Instruction::Mul),
                _ => Err(self.unknown_opcode()),
            },
            B => match self.opcode_symbol()? {
                A => Ok(Instruction::Div),
                B => Ok(Instruction::Mod),
                _ => Err(self.unknown_opcode()),
            },
            _ => Err(self.unknown_opcode()),
        }
    }

    fn heap(&mut self) -> Result<Instruction, ParseError> {
        match self.opcode_symbol()? {
            A => Ok(Instruction::Store),
            B => Ok(Instruction::Retrieve),
            _ => Err(self.unknown_opcode()),
        }
    }

    fn flow(&mut self) -> Result<Instruction, ParseError> {
        match self.opcode_symbol()? {
            A => match self.opcode_symbol()? {
                A => Ok(Instruction::SetLbl(self.label()?)),
                B => Ok(Instruction::CallLbl(self.label()?)),
                C => Ok(Instruction::Jump(self.label()?)),
                _ => Err(self.unknown_opcode()),
            },
            B => match self.opcode_symbol()? {
                A => Ok(Instruction::JumpZero(self.label()?)),
                B => Ok(Instruction::JumpNeg(self.label()?)),
                C => Ok(Instruction::Ret),
                _ => Err(self.unknown_opcode()),
            },
            C => match self.opcode_symbol()? {
                C => Ok(Instruction::End),
                _ => Err(self.unknown_opcode()),
            },
            _ => Err(self.unknown_opcode()),
        }
    }

    fn io(&mut self) -> Result<Instruction, ParseError> {
        match self.opcode_symbol()? {
            A => match self.opcode_symbol()? {
                A => Ok(Instruction::PrintChar),
                B => Ok(Instruction::PrintInt),
                _ => Err(self.unknown_opcode()),
            },
            B => match self.opcode_symbol()? {
                A => Ok(Instruction::ReadChar),
                B => Ok(Instruction::ReadInt),
                _ => Err(self.unknown_opcode()),
            },
            _ => Err(self.unknown_opcode()),
        }
    }

    /// Sign symbol followed by the magnitude, most significant bit first, terminated by `C`.
    /// Every digit other than `A` counts as a one.
    fn number(&mut self) -> Result<i64, ParseError> {
        let position = self.token_index;
        let sign = match self.next_symbol() {
            Some(A) => 1,
            Some(B) => -1,
            Some(found) => {
                return Err(ParseError::InvalidSign {
                    position,
                    found: found as char,
                })
            }
            None => return Err(ParseError::UnterminatedNumber { position }),
        };

        let mut magnitude: i64 = 0;
        loop {
            match self.next_symbol() {
                Some(C) => break,
                Some(digit) => {
                    magnitude = magnitude
                        .checked_mul(2)
                        .and_then(|value| value.checked_add(i64::from(digit != A)))
                        .ok_or(ParseError::NumberOverflow { position })?;
                }
                None => return Err(ParseError::UnterminatedNumber { position }),
            }
        }

        Ok(sign * magnitude)
    }

    fn label(&mut self) -> Result<Label, ParseError> {
        let position = self.token_index;
        let rest = &self.symbols[position..];
        let len = rest
            .find(C as char)
            .ok_or(ParseError::UnterminatedLabel { position })?;
        if len == 0 {
            return Err(ParseError::EmptyLabel { position });
        }
        self.token_index += len + 1;

        Ok(rest[..len].into())
    }
}

impl<'a> Iterator for Parser<'a> {
    type Item = Result<Instruction, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.instruction()
    }
}

/// Decodes a complete symbol stream into a [`Program`].
///
/// Labels are entered into the table as their `SetLbl` instruction is appended, so every label
/// maps to the index of its own declaration. The first error aborts decoding.
pub fn decode(symbols: &str) -> Result<Program, ParseError> {
    let mut parser = Parser::new(symbols);
    let mut program = Program::default();

    while let Some(instruction) = parser.instruction() {
        let instruction = instruction?;
        if let Instruction::SetLbl(label) = &instruction {
            match program.labels.entry(label.clone()) {
                Entry::Occupied(entry) => {
                    return Err(ParseError::DuplicateLabel {
                        label: label.to_string(),
                        position: parser.instruction_start,
                        index: *entry.get(),
                    })
                }
                Entry::Vacant(entry) => {
                    entry.insert(program.instructions.len());
                }
            }
        }
        program.instructions.push(instruction);
    }

    debug!(
        symbols = symbols.len(),
        instructions = program.instructions.len(),
        labels = program.labels.len(),
        "decoded program"
    );

    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::{decode, ParseError, Parser};
    use crate::ir::Instruction;

    fn test_parse(symbols: &str, results: Vec<Instruction>) -> Result<(), ParseError> {
        let program = decode(symbols)?;
        assert_eq!(program.instructions(), &results[..]);

        Ok(())
    }

    #[test]
    fn parse_stack() -> Result<(), ParseError> {
        test_parse(
            "AAABAAAAAACACAACBACCAABBC",
            vec![
                Instruction::Push(64),
                Instruction::Dupl,
                Instruction::Swap,
                Instruction::Discard,
                Instruction::Push(-1),
            ],
        )
    }

    #[test]
    fn parse_arithmetic() -> Result<(), ParseError> {
        test_parse(
            "BAAABAABBAACBABABABBCCC",
            vec![
                Instruction::Add,
                Instruction::Sub,
                Instruction::Mul,
                Instruction::Div,
                Instruction::Mod,
                Instruction::End,
            ],
        )
    }

    #[test]
    fn parse_heap() -> Result<(), ParseError> {
        test_parse("BBABBB", vec![Instruction::Store, Instruction::Retrieve])
    }

    #[test]
    fn parse_flow() -> Result<(), ParseError> {
        test_parse(
            "CAAABACCABABACCACABACCBAABACCBBABACCBCCCC",
            vec![
                Instruction::SetLbl("ABA".into()),
                Instruction::CallLbl("ABA".into()),
                Instruction::Jump("ABA".into()),
                Instruction::JumpZero("ABA".into()),
                Instruction::JumpNeg("ABA".into()),
                Instruction::Ret,
                Instruction::End,
            ],
        )
    }

    #[test]
    fn parse_io() -> Result<(), ParseError> {
        test_parse(
            "BCAABCABBCBABCBB",
            vec![
                Instruction::PrintChar,
                Instruction::PrintInt,
                Instruction::ReadChar,
                Instruction::ReadInt,
            ],
        )
    }

    #[test]
    fn parse_numbers() -> Result<(), ParseError> {
        test_parse(
            "AAACAABCAAABACAABBBCAAABBBBC",
            vec![
                Instruction::Push(0),
                Instruction::Push(0),
                Instruction::Push(2),
                Instruction::Push(-3),
                Instruction::Push(15),
            ],
        )
    }

    #[test]
    fn leading_zero_bits_are_ignored() -> Result<(), ParseError> {
        test_parse("AAAAAAABC", vec![Instruction::Push(1)])
    }

    #[test]
    fn empty_stream() -> Result<(), ParseError> {
        let program = decode("")?;
        assert!(program.is_empty());
        assert!(program.labels().is_empty());

        Ok(())
    }

    #[test]
    fn labels_map_to_their_declaration() -> Result<(), ParseError> {
        let program = decode("AAABCCAAACCAABCCACAC")?;
        assert_eq!(program.len(), 4);
        assert_eq!(program.label("A"), Some(1));
        assert_eq!(program.label("B"), Some(2));
        assert_eq!(program.label("C"), None);

        Ok(())
    }

    #[test]
    fn duplicate_label() {
        let err = decode("CAAABCACAACAAABAACAAAAABCBCABCAAABC").unwrap_err();
        assert_eq!(
            err,
            ParseError::DuplicateLabel {
                label: "AB".to_string(),
                position: 29,
                index: 0,
            }
        );
    }

    #[test]
    fn unknown_opcode() {
        assert_eq!(
            decode("ACABCC").unwrap_err(),
            ParseError::UnknownOpcode {
                position: 3,
                context: "BCC".to_string(),
            }
        );
        assert_eq!(decode("CC").unwrap_err().position(), 0);
        assert_eq!(decode("CCA").unwrap_err().position(), 0);
        assert_eq!(decode("BAB").unwrap_err().position(), 0);
        assert_eq!(decode("ACX").unwrap_err().position(), 0);
    }

    #[test]
    fn malformed_numbers() {
        assert_eq!(
            decode("AACAC").unwrap_err(),
            ParseError::InvalidSign {
                position: 2,
                found: 'C',
            }
        );
        assert_eq!(
            decode("AA").unwrap_err(),
            ParseError::UnterminatedNumber { position: 2 }
        );
        assert_eq!(
            decode("AAABAB").unwrap_err(),
            ParseError::UnterminatedNumber { position: 2 }
        );
        let too_wide = format!("AAA{}C", "B".repeat(64));
        assert_eq!(
            decode(&too_wide).unwrap_err(),
            ParseError::NumberOverflow { position: 2 }
        );
    }

    #[test]
    fn malformed_labels() {
        assert_eq!(
            decode("CACC").unwrap_err(),
            ParseError::EmptyLabel { position: 3 }
        );
        assert_eq!(
            decode("CABAB").unwrap_err(),
            ParseError::UnterminatedLabel { position: 3 }
        );
        assert_eq!(
            decode("CBA").unwrap_err(),
            ParseError::UnterminatedLabel { position: 3 }
        );
    }

    #[test]
    fn iterate_instructions() -> Result<(), ParseError> {
        let mut parser = Parser::new("ACACAAACCAAACCCC");
        assert_eq!(parser.next(), Some(Ok(Instruction::Dupl)));
        assert_eq!(parser.position(), 3);
        // the iterator does not track labels, so redefinitions pass through
        let rest = parser.collect::<Result<Vec<_>, _>>()?;
        assert_eq!(
            rest,
            vec![
                Instruction::SetLbl("A".into()),
                Instruction::SetLbl("A".into()),
                Instruction::End,
            ]
        );

        Ok(())
    }
}

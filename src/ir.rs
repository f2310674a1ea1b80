use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

/// Label names are arbitrary runs over the symbol alphabet, shared between the label table and
/// the instructions referencing them. Errors carry instructions across threads, so the count is
/// atomic.
pub type Label = Arc<str>;

/// A single decoded instruction
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Instruction {
    Push(i64),
    Dupl,
    Swap,
    Discard,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Store,
    Retrieve,
    SetLbl(Label),
    CallLbl(Label),
    Jump(Label),
    JumpZero(Label),
    JumpNeg(Label),
    Ret,
    End,
    PrintChar,
    PrintInt,
    ReadChar,
    ReadInt,
}

impl Instruction {
    /// Whether executing this instruction may leave the program counter anywhere but `pc + 1`
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Instruction::CallLbl(_)
                | Instruction::Jump(_)
                | Instruction::JumpZero(_)
                | Instruction::JumpNeg(_)
                | Instruction::Ret
                | Instruction::End
        )
    }

    /// The label this instruction references or declares, if any
    pub fn label(&self) -> Option<&str> {
        match self {
            Instruction::SetLbl(label)
            | Instruction::CallLbl(label)
            | Instruction::Jump(label)
            | Instruction::JumpZero(label)
            | Instruction::JumpNeg(label) => Some(label),
            _ => None,
        }
    }

    /// Encodes the instruction in the symbol form the decoder reads
    pub fn to_symbols(&self) -> String {
        let mut symbols = String::from(self.opcode());
        match self {
            Instruction::Push(num) => encode_number(*num, &mut symbols),
            _ => {
                if let Some(label) = self.label() {
                    symbols.push_str(label);
                    symbols.push('C');
                }
            }
        }

        symbols
    }

    fn opcode(&self) -> &'static str {
        match self {
            Instruction::Push(_) => "AA",
            Instruction::Dupl => "ACA",
            Instruction::Swap => "ACB",
            Instruction::Discard => "ACC",
            Instruction::Add => "BAAA",
            Instruction::Sub => "BAAB",
            Instruction::Mul => "BAAC",
            Instruction::Div => "BABA",
            Instruction::Mod => "BABB",
            Instruction::Store => "BBA",
            Instruction::Retrieve => "BBB",
            Instruction::SetLbl(_) => "CAA",
            Instruction::CallLbl(_) => "CAB",
            Instruction::Jump(_) => "CAC",
            Instruction::JumpZero(_) => "CBA",
            Instruction::JumpNeg(_) => "CBB",
            Instruction::Ret => "CBC",
            Instruction::End => "CCC",
            Instruction::PrintChar => "BCAA",
            Instruction::PrintInt => "BCAB",
            Instruction::ReadChar => "BCBA",
            Instruction::ReadInt => "BCBB",
        }
    }

    fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Push(_) => "Push",
            Instruction::Dupl => "Dupl",
            Instruction::Swap => "Swap",
            Instruction::Discard => "Discard",
            Instruction::Add => "Add",
            Instruction::Sub => "Sub",
            Instruction::Mul => "Mul",
            Instruction::Div => "Div",
            Instruction::Mod => "Mod",
            Instruction::Store => "Store",
            Instruction::Retrieve => "Retrieve",
            Instruction::SetLbl(_) => "SetLbl",
            Instruction::CallLbl(_) => "CallLbl",
            Instruction::Jump(_) => "Jump",
            Instruction::JumpZero(_) => "JumpZero",
            Instruction::JumpNeg(_) => "JumpNeg",
            Instruction::Ret => "Ret",
            Instruction::End => "End",
            Instruction::PrintChar => "PrintChar",
            Instruction::PrintInt => "PrintInt",
            Instruction::ReadChar => "ReadChar",
            Instruction::ReadInt => "ReadInt",
        }
    }
}

/// Sign symbol, binary magnitude without leading zeros and the terminator. Zero has an empty
/// magnitude.
fn encode_number(num: i64, symbols: &mut String) {
    symbols.push(if num < 0 { 'B' } else { 'A' });
    if num != 0 {
        let bits = format!("{:b}", num.unsigned_abs());
        symbols.extend(bits.chars().map(|bit| if bit == '1' { 'B' } else { 'A' }));
    }
    symbols.push('C');
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Push(num) => write!(f, "{} {}", self.mnemonic(), num),
            _ => match self.label() {
                Some(label) => write!(f, "{} {}", self.mnemonic(), label),
                None => write!(f, "{}", self.mnemonic()),
            },
        }
    }
}

/// A decoded program: the instruction sequence plus the table mapping every declared label to the
/// index of its `SetLbl` instruction
#[derive(Debug, Default, PartialEq, Clone)]
pub struct Program {
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) labels: HashMap<Label, usize>,
}

impl Program {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn labels(&self) -> &HashMap<Label, usize> {
        &self.labels
    }

    /// Resolves a label name to the index of the instruction declaring it
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Encodes the whole instruction sequence back into a symbol stream
    pub fn to_symbols(&self) -> String {
        self.instructions
            .iter()
            .map(Instruction::to_symbols)
            .collect()
    }
}

impl From<Vec<Instruction>> for Program {
    /// Builds a program from bare instructions, the first declaration of a label wins
    fn from(instructions: Vec<Instruction>) -> Program {
        let mut labels = HashMap::new();
        for (index, instruction) in instructions.iter().enumerate() {
            if let Instruction::SetLbl(label) = instruction {
                labels.entry(label.clone()).or_insert(index);
            }
        }

        Program {
            instructions,
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Instruction, Program};

    #[test]
    fn display_mnemonics() {
        assert_eq!(Instruction::Push(-12).to_string(), "Push -12");
        assert_eq!(Instruction::SetLbl("ABA".into()).to_string(), "SetLbl ABA");
        assert_eq!(Instruction::JumpNeg("B".into()).to_string(), "JumpNeg B");
        assert_eq!(Instruction::PrintInt.to_string(), "PrintInt");
    }

    #[test]
    fn control_flow_classification() {
        assert!(Instruction::Ret.is_control_flow());
        assert!(Instruction::End.is_control_flow());
        assert!(Instruction::Jump("A".into()).is_control_flow());
        assert!(!Instruction::SetLbl("A".into()).is_control_flow());
        assert!(!Instruction::Push(1).is_control_flow());
    }

    #[test]
    fn encode_symbols() {
        assert_eq!(Instruction::Push(0).to_symbols(), "AAAC");
        assert_eq!(Instruction::Push(2).to_symbols(), "AAABAC");
        assert_eq!(Instruction::Push(-5).to_symbols(), "AABBABC");
        assert_eq!(Instruction::CallLbl("BA".into()).to_symbols(), "CABBAC");
        assert_eq!(Instruction::End.to_symbols(), "CCC");
    }

    #[test]
    fn program_from_instructions() {
        let program = Program::from(vec![
            Instruction::Push(1),
            Instruction::SetLbl("A".into()),
            Instruction::Jump("A".into()),
        ]);
        assert_eq!(program.len(), 3);
        assert_eq!(program.label("A"), Some(1));
        assert_eq!(program.to_symbols(), "AAABCCAAACCACAC");
    }

    #[test]
    fn empty_program() {
        let program = Program::default();
        assert!(program.is_empty());
        assert_eq!(program.label("A"), None);
    }
}

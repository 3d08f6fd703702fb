//! Typed instruction stream of a decoded method body.
//!
//! Instructions keep the operand shapes of the JVM instruction set (constants,
//! branch targets, local slots, member references) but drop everything that is
//! only relevant for the binary encoding (constant pool indexes, offsets).
//! Branch targets and line markers refer to [`Label`]s that appear in the same
//! stream as pseudo instructions.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    Nop,
    AconstNull,
    IconstM1,
    Iconst0,
    Iconst1,
    Iconst2,
    Iconst3,
    Iconst4,
    Iconst5,
    Lconst0,
    Lconst1,
    Dconst0,
    Dconst1,
    Bipush,
    Sipush,
    Ldc,
    Iload,
    Lload,
    Fload,
    Dload,
    Aload,
    Iaload,
    Aaload,
    Baload,
    Istore,
    Lstore,
    Fstore,
    Dstore,
    Astore,
    Iastore,
    Aastore,
    Bastore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    Dup2,
    Swap,
    Iadd,
    Ladd,
    Dadd,
    Isub,
    Lsub,
    Dsub,
    Imul,
    Lmul,
    Idiv,
    Ldiv,
    Irem,
    Ineg,
    Iand,
    Ior,
    Ixor,
    Iinc,
    I2l,
    L2i,
    Lcmp,
    Dcmpl,
    Dcmpg,
    Ifeq,
    Ifne,
    Iflt,
    Ifge,
    Ifgt,
    Ifle,
    IfIcmpeq,
    IfIcmpne,
    IfIcmplt,
    IfIcmpge,
    IfIcmpgt,
    IfIcmple,
    IfAcmpeq,
    IfAcmpne,
    Goto,
    Tableswitch,
    Lookupswitch,
    Ireturn,
    Lreturn,
    Freturn,
    Dreturn,
    Areturn,
    Return,
    Getstatic,
    Putstatic,
    Getfield,
    Putfield,
    Invokevirtual,
    Invokespecial,
    Invokestatic,
    Invokeinterface,
    Invokedynamic,
    New,
    Newarray,
    Anewarray,
    Arraylength,
    Athrow,
    Checkcast,
    Instanceof,
    Monitorenter,
    Monitorexit,
    Multianewarray,
    Ifnull,
    Ifnonnull,
}

impl Opcode {
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Opcode::Ireturn
                | Opcode::Lreturn
                | Opcode::Freturn
                | Opcode::Dreturn
                | Opcode::Areturn
                | Opcode::Return
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Same spelling as the serialized form: IfIcmpeq -> if_icmpeq.
        let camel = format!("{:?}", self);
        let mut out = String::with_capacity(camel.len() + 2);
        for (i, c) in camel.chars().enumerate() {
            if c.is_ascii_uppercase() {
                if i > 0 {
                    out.push('_');
                }
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(c);
            }
        }
        f.write_str(&out)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Type(String),
}

impl Constant {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Long(v) => write!(f, "{}L", v),
            Constant::Float(v) => write!(f, "{}F", v),
            Constant::Double(v) => write!(f, "{}D", v),
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::Type(t) => write!(f, "{}.class", t),
        }
    }
}

/// Owner/name/descriptor triple of a field or method reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        MemberRef {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Insn {
    Simple { op: Opcode },
    Int { op: Opcode, operand: i32 },
    Var { op: Opcode, slot: u16 },
    Iinc { slot: u16, delta: i16 },
    Type { op: Opcode, descriptor: String },
    Field { op: Opcode, member: MemberRef },
    Method { op: Opcode, member: MemberRef, interface: bool },
    InvokeDynamic { name: String, descriptor: String, bootstrap_args: Vec<Constant> },
    Jump { op: Opcode, target: Label },
    Ldc { value: Constant },
    TableSwitch { min: i32, max: i32, default: Label, targets: Vec<Label> },
    LookupSwitch { default: Label, keys: Vec<i32>, targets: Vec<Label> },
    MultiANewArray { descriptor: String, dims: u8 },
    Label { label: Label },
    LineNumber { line: u32, start: Label },
}

impl Insn {
    pub fn simple(op: Opcode) -> Self {
        Insn::Simple { op }
    }

    pub fn var(op: Opcode, slot: u16) -> Self {
        Insn::Var { op, slot }
    }

    pub fn ldc(value: Constant) -> Self {
        Insn::Ldc { value }
    }

    pub fn ldc_str(s: &str) -> Self {
        Insn::Ldc { value: Constant::String(s.to_string()) }
    }

    pub fn invoke(op: Opcode, owner: &str, name: &str, descriptor: &str, interface: bool) -> Self {
        Insn::Method {
            op,
            member: MemberRef::new(owner, name, descriptor),
            interface,
        }
    }

    pub fn label(n: u32) -> Self {
        Insn::Label { label: Label(n) }
    }

    pub fn line(line: u32, start: u32) -> Self {
        Insn::LineNumber { line, start: Label(start) }
    }

    /// Opcode of a real instruction, `None` for labels and line markers.
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Insn::Simple { op }
            | Insn::Int { op, .. }
            | Insn::Var { op, .. }
            | Insn::Type { op, .. }
            | Insn::Field { op, .. }
            | Insn::Method { op, .. }
            | Insn::Jump { op, .. } => Some(*op),
            Insn::Iinc { .. } => Some(Opcode::Iinc),
            Insn::InvokeDynamic { .. } => Some(Opcode::Invokedynamic),
            Insn::Ldc { .. } => Some(Opcode::Ldc),
            Insn::TableSwitch { .. } => Some(Opcode::Tableswitch),
            Insn::LookupSwitch { .. } => Some(Opcode::Lookupswitch),
            Insn::MultiANewArray { .. } => Some(Opcode::Multianewarray),
            Insn::Label { .. } | Insn::LineNumber { .. } => None,
        }
    }

    pub fn is_pseudo(&self) -> bool {
        self.opcode().is_none()
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insn::Simple { op } => write!(f, "    {}", op),
            Insn::Int { op, operand } => write!(f, "    {} {}", op, operand),
            Insn::Var { op, slot } => write!(f, "    {} {}", op, slot),
            Insn::Iinc { slot, delta } => write!(f, "    iinc {} {}", slot, delta),
            Insn::Type { op, descriptor } => write!(f, "    {} {}", op, descriptor),
            Insn::Field { op, member } | Insn::Method { op, member, .. } => write!(
                f,
                "    {} {}.{} {}",
                op, member.owner, member.name, member.descriptor
            ),
            Insn::InvokeDynamic { name, descriptor, .. } => {
                write!(f, "    invokedynamic {} {}", name, descriptor)
            }
            Insn::Jump { op, target } => write!(f, "    {} {}", op, target),
            Insn::Ldc { value } => write!(f, "    ldc {}", value),
            Insn::TableSwitch { min, max, default, .. } => {
                write!(f, "    tableswitch {}..{} default {}", min, max, default)
            }
            Insn::LookupSwitch { default, keys, .. } => {
                write!(f, "    lookupswitch {:?} default {}", keys, default)
            }
            Insn::MultiANewArray { descriptor, dims } => {
                write!(f, "    multianewarray {} {}", descriptor, dims)
            }
            Insn::Label { label } => write!(f, "{}:", label),
            Insn::LineNumber { line, start } => write!(f, "  line {} {}", line, start),
        }
    }
}

/// Stack slot sizes (1 or 2) of the arguments of a method descriptor.
///
/// Returns `None` when the descriptor is malformed.
pub fn argument_sizes(descriptor: &str) -> Option<Vec<u8>> {
    let body = descriptor.strip_prefix('(')?;
    let end = body.find(')')?;
    let mut chars = body[..end].chars();
    let mut sizes = Vec::new();
    while let Some(c) = chars.next() {
        match c {
            'J' | 'D' => sizes.push(2),
            'Z' | 'B' | 'C' | 'S' | 'I' | 'F' => sizes.push(1),
            'L' => {
                chars.by_ref().find(|&c| c == ';')?;
                sizes.push(1);
            }
            '[' => {
                let mut next = chars.next()?;
                while next == '[' {
                    next = chars.next()?;
                }
                if next == 'L' {
                    chars.by_ref().find(|&c| c == ';')?;
                }
                sizes.push(1);
            }
            _ => return None,
        }
    }
    Some(sizes)
}

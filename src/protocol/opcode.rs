//! Opcode definitions
//!
//! Every operation the client can put on the wire, with the quiet/loud
//! pairing used for pipelining.

/// Binary protocol opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Add = 0x02,
    Replace = 0x03,
    Delete = 0x04,
    Increment = 0x05,
    Decrement = 0x06,
    Flush = 0x08,
    GetQ = 0x09,
    Noop = 0x0A,
    Version = 0x0B,
    Append = 0x0E,
    Prepend = 0x0F,
    SetQ = 0x11,
    AddQ = 0x12,
    ReplaceQ = 0x13,
    IncrementQ = 0x15,
    DecrementQ = 0x16,
    AppendQ = 0x19,
    PrependQ = 0x1A,
    SaslListMechs = 0x20,
    SaslAuth = 0x21,
    SaslStep = 0x22,
}

/// Loud/quiet pairs. Delete, Flush, Version and Noop have no quiet form.
const QUIET_PAIRS: [(Opcode, Opcode); 8] = [
    (Opcode::Get, Opcode::GetQ),
    (Opcode::Set, Opcode::SetQ),
    (Opcode::Add, Opcode::AddQ),
    (Opcode::Replace, Opcode::ReplaceQ),
    (Opcode::Increment, Opcode::IncrementQ),
    (Opcode::Decrement, Opcode::DecrementQ),
    (Opcode::Append, Opcode::AppendQ),
    (Opcode::Prepend, Opcode::PrependQ),
];

impl Opcode {
    /// Convert a wire byte to an opcode
    pub fn from_u8(value: u8) -> Option<Self> {
        let op = match value {
            0x00 => Opcode::Get,
            0x01 => Opcode::Set,
            0x02 => Opcode::Add,
            0x03 => Opcode::Replace,
            0x04 => Opcode::Delete,
            0x05 => Opcode::Increment,
            0x06 => Opcode::Decrement,
            0x08 => Opcode::Flush,
            0x09 => Opcode::GetQ,
            0x0A => Opcode::Noop,
            0x0B => Opcode::Version,
            0x0E => Opcode::Append,
            0x0F => Opcode::Prepend,
            0x11 => Opcode::SetQ,
            0x12 => Opcode::AddQ,
            0x13 => Opcode::ReplaceQ,
            0x15 => Opcode::IncrementQ,
            0x16 => Opcode::DecrementQ,
            0x19 => Opcode::AppendQ,
            0x1A => Opcode::PrependQ,
            0x20 => Opcode::SaslListMechs,
            0x21 => Opcode::SaslAuth,
            0x22 => Opcode::SaslStep,
            _ => return None,
        };
        Some(op)
    }

    /// Wire byte for this opcode
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Quiet variant of this opcode, or the opcode itself when it has none
    pub fn to_quiet(self) -> Opcode {
        QUIET_PAIRS
            .iter()
            .find(|(loud, _)| *loud == self)
            .map(|(_, quiet)| *quiet)
            .unwrap_or(self)
    }

    /// Loud variant of this opcode; inverse of `to_quiet`
    pub fn to_loud(self) -> Opcode {
        QUIET_PAIRS
            .iter()
            .find(|(_, quiet)| *quiet == self)
            .map(|(loud, _)| *loud)
            .unwrap_or(self)
    }

    /// Returns true if the server suppresses this opcode's uninteresting response
    pub fn is_quiet(self) -> bool {
        QUIET_PAIRS.iter().any(|(_, quiet)| *quiet == self)
    }

    /// Returns true if a successful response carries a type-tagged value
    pub fn is_get_family(self) -> bool {
        matches!(self, Opcode::Get | Opcode::GetQ)
    }

    /// Returns true for set/add/replace and their quiet variants
    pub fn is_store(self) -> bool {
        matches!(
            self.to_loud(),
            Opcode::Set | Opcode::Add | Opcode::Replace
        )
    }

    /// Returns true for increment/decrement and their quiet variants
    pub fn is_counter(self) -> bool {
        matches!(self.to_loud(), Opcode::Increment | Opcode::Decrement)
    }
}

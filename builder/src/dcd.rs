// Licensed under the Apache-2.0 license

//! Assembles the register-init micro-program (DCD) from parsed register
//! commands. The serialized program is a pure function of the ordered
//! command list; assembling the same commands twice yields identical bytes.

use crate::error::SizeError;
use boot_image::dcd::{
    be_word, command_header, command_params, DCD_CHECK_RECORD_LEN, DCD_CHECK_RECORD_NO_COUNT_LEN,
    DCD_CHECK_TAG, DCD_HEADER_LENGTH_OFFSET, DCD_MAGIC_WORD, DCD_MAXIMUM_SIZE, DCD_WRITE_RECORD_LEN,
    DCD_WRITE_TAG,
};

/// One symbolic register command from the configuration file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterCommandKind {
    Write,
    ClearMask,
    SetMask,
    CheckMaskClear,
    CheckMaskSet,
    CheckNotMask,
    CheckNotClear,
}

impl RegisterCommandKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "WRITE" => Some(Self::Write),
            "CLEAR_MASK" => Some(Self::ClearMask),
            "SET_MASK" => Some(Self::SetMask),
            "CHECK_MASK_CLEAR" => Some(Self::CheckMaskClear),
            "CHECK_MASK_SET" => Some(Self::CheckMaskSet),
            "CHECK_NOT_MASK" => Some(Self::CheckNotMask),
            "CHECK_NOT_CLEAR" => Some(Self::CheckNotClear),
            _ => None,
        }
    }

    /// Record tag plus the SET/MASK parameter flags for this command.
    fn encoding(self) -> (u8, bool, bool) {
        match self {
            Self::Write => (DCD_WRITE_TAG, false, false),
            Self::SetMask => (DCD_WRITE_TAG, true, true),
            Self::ClearMask => (DCD_WRITE_TAG, false, true),
            Self::CheckMaskClear => (DCD_CHECK_TAG, false, false),
            Self::CheckMaskSet => (DCD_CHECK_TAG, true, false),
            Self::CheckNotMask => (DCD_CHECK_TAG, false, true),
            Self::CheckNotClear => (DCD_CHECK_TAG, true, true),
        }
    }

    fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::SetMask | Self::ClearMask)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RegisterCommand {
    pub kind: RegisterCommandKind,
    /// Access width in bytes: 1, 2 or 4.
    pub width: u8,
    pub addr: u32,
    pub value_or_mask: u32,
    /// Poll count for check commands; `None` means check once, and no
    /// count word is emitted. Ignored for write commands.
    pub count: Option<u32>,
}

/// The micro-program under construction, as serialized words. The first
/// word is always the magic header; its length field is patched during
/// [`DcdProgram::serialize`].
#[derive(Debug, Default)]
pub struct DcdProgram {
    words: Vec<u32>,
}

impl DcdProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Serialized size in bytes, magic header included.
    pub fn byte_len(&self) -> usize {
        self.words.len() * 4
    }

    /// Appends one record, rejecting the command if the program would
    /// exceed the hardware ceiling.
    pub fn push(&mut self, cmd: &RegisterCommand) -> Result<(), SizeError> {
        if self.words.is_empty() {
            self.words.push(DCD_MAGIC_WORD);
        }

        let (tag, set, mask) = cmd.kind.encoding();
        let params = command_params(set, mask, cmd.width);
        let record_len = if cmd.kind.is_write() {
            DCD_WRITE_RECORD_LEN
        } else if cmd.count.is_some() {
            DCD_CHECK_RECORD_LEN
        } else {
            DCD_CHECK_RECORD_NO_COUNT_LEN
        };

        if self.byte_len() + record_len as usize > DCD_MAXIMUM_SIZE {
            return Err(SizeError::DcdTooLarge {
                size: self.byte_len() + record_len as usize,
            });
        }

        self.words.push(command_header(tag, record_len, params));
        self.words.push(be_word(cmd.addr));
        self.words.push(be_word(cmd.value_or_mask));
        if !cmd.kind.is_write() {
            if let Some(count) = cmd.count {
                self.words.push(be_word(count));
            }
        }

        Ok(())
    }

    /// Serializes the program and patches the magic header's big-endian
    /// length field to the true byte length.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.byte_len());
        for word in &self.words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }

        if !bytes.is_empty() {
            let length = (bytes.len() as u16).to_be_bytes();
            bytes[DCD_HEADER_LENGTH_OFFSET..DCD_HEADER_LENGTH_OFFSET + 2]
                .copy_from_slice(&length);
        }

        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_cmd(addr: u32, value: u32) -> RegisterCommand {
        RegisterCommand {
            kind: RegisterCommandKind::Write,
            width: 4,
            addr,
            value_or_mask: value,
            count: None,
        }
    }

    #[test]
    fn single_write_record() {
        let mut program = DcdProgram::new();
        program.push(&write_cmd(0x4008_0000, 0x1)).unwrap();

        let bytes = program.serialize();
        // Magic header plus one 12-byte record, no padding.
        assert_eq!(bytes.len(), 16);
        // Patched length field matches the true serialized length.
        assert_eq!(u16::from_be_bytes([bytes[1], bytes[2]]), 16);
        assert_eq!(bytes[0], 0xd2);
        assert_eq!(bytes[3], 0x60);
        // Record: header, big-endian address, big-endian value.
        assert_eq!(&bytes[4..8], &[0xcc, 0x00, 0x0c, 0x04]);
        assert_eq!(&bytes[8..12], &[0x40, 0x08, 0x00, 0x00]);
        assert_eq!(&bytes[12..16], &[0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn check_record_with_and_without_count() {
        let mut program = DcdProgram::new();
        program
            .push(&RegisterCommand {
                kind: RegisterCommandKind::CheckMaskSet,
                width: 4,
                addr: 0x4008_0000,
                value_or_mask: 0x80,
                count: Some(0x10),
            })
            .unwrap();
        program
            .push(&RegisterCommand {
                kind: RegisterCommandKind::CheckMaskClear,
                width: 4,
                addr: 0x4008_0004,
                value_or_mask: 0x1,
                count: None,
            })
            .unwrap();

        let bytes = program.serialize();
        assert_eq!(bytes.len(), 4 + 16 + 12);

        // First record: check tag, length 16, SET flag, count word appended.
        assert_eq!(&bytes[4..8], &[0xcf, 0x00, 0x10, 0b0001_0100]);
        assert_eq!(&bytes[16..20], &[0x00, 0x00, 0x00, 0x10]);
        // Second record: length 12, no count word.
        assert_eq!(&bytes[20..24], &[0xcf, 0x00, 0x0c, 0b0000_0100]);
    }

    #[test]
    fn mask_commands_set_the_parameter_flags() {
        let cases = [
            (RegisterCommandKind::Write, 0xcc, 0b0000_0100),
            (RegisterCommandKind::ClearMask, 0xcc, 0b0000_1100),
            (RegisterCommandKind::SetMask, 0xcc, 0b0001_1100),
            (RegisterCommandKind::CheckMaskClear, 0xcf, 0b0000_0100),
            (RegisterCommandKind::CheckMaskSet, 0xcf, 0b0001_0100),
            (RegisterCommandKind::CheckNotMask, 0xcf, 0b0000_1100),
            (RegisterCommandKind::CheckNotClear, 0xcf, 0b0001_1100),
        ];

        for (kind, tag, params) in cases {
            let mut program = DcdProgram::new();
            program
                .push(&RegisterCommand {
                    kind,
                    width: 4,
                    addr: 0,
                    value_or_mask: 0,
                    count: None,
                })
                .unwrap();
            let bytes = program.serialize();
            assert_eq!(bytes[4], tag, "{kind:?}");
            assert_eq!(bytes[7], params, "{kind:?}");
        }
    }

    #[test]
    fn ceiling_is_enforced_before_any_output() {
        let mut program = DcdProgram::new();
        // 682 write records fill 4 + 682 * 12 = 8188 bytes; one more would
        // serialize to 8200 and must be rejected.
        for i in 0..682 {
            program.push(&write_cmd(0x4000_0000 + i * 4, 0)).unwrap();
        }
        assert_eq!(program.byte_len(), 8188);

        let err = program.push(&write_cmd(0x5000_0000, 0)).unwrap_err();
        assert!(matches!(err, SizeError::DcdTooLarge { size: 8200 }));
        // The rejected record left no partial bytes behind.
        assert_eq!(program.byte_len(), 8188);
        assert_eq!(program.serialize().len(), 8188);
    }

    #[test]
    fn assembly_is_deterministic() {
        let cmds = [write_cmd(0x1000, 1), write_cmd(0x2000, 2)];
        let mut a = DcdProgram::new();
        let mut b = DcdProgram::new();
        for cmd in &cmds {
            a.push(cmd).unwrap();
            b.push(cmd).unwrap();
        }
        assert_eq!(a.serialize(), b.serialize());
    }

    #[test]
    fn empty_program_serializes_to_nothing() {
        assert!(DcdProgram::new().serialize().is_empty());
    }
}

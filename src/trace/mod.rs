//! The command-trace format: `R/W D/I W/B 0x… @0x…`, one record per line.

use std::fmt;
use std::path::Path;

use crate::addr::VirtAddr;
use crate::error::{Result, SimError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Read,
    Write,
}

impl Order {
    fn as_char(self) -> char {
        match self {
            Order::Read => 'R',
            Order::Write => 'W',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    Data,
    Instruction,
}

impl AccessKind {
    fn as_char(self) -> char {
        match self {
            AccessKind::Data => 'D',
            AccessKind::Instruction => 'I',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataSize {
    Word,
    Byte,
}

impl DataSize {
    fn as_char(self) -> char {
        match self {
            DataSize::Word => 'W',
            DataSize::Byte => 'B',
        }
    }

    fn max_hex_digits(self) -> usize {
        match self {
            DataSize::Word => 8,
            DataSize::Byte => 2,
        }
    }
}

/// One trace record, mirroring the source's `command_t`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command {
    pub order: Order,
    pub kind: AccessKind,
    pub size: DataSize,
    pub write_data: u32,
    pub vaddr: VirtAddr,
}

fn strip_prefix<'a>(s: &'a str, prefix: &str) -> Result<&'a str> {
    s.strip_prefix(prefix)
        .ok_or_else(|| SimError::bad_parameter(format!("expected `{prefix}` in `{s}`")))
}

fn parse_hex(token: &str, max_digits: usize) -> Result<u32> {
    let digits = strip_prefix(token, "0x")?;
    if digits.is_empty() || digits.len() > max_digits {
        return Err(SimError::bad_parameter(format!(
            "hex value `{token}` must have 1-{max_digits} digits after 0x"
        )));
    }
    u32::from_str_radix(digits, 16)
        .map_err(|_| SimError::bad_parameter(format!("`{token}` is not valid hex")))
}

fn parse_addr(token: &str) -> Result<VirtAddr> {
    let digits = strip_prefix(token, "@0x")?;
    if digits.is_empty() || digits.len() > 16 {
        return Err(SimError::bad_parameter(format!(
            "address `{token}` must have 1-16 hex digits after @0x"
        )));
    }
    let raw = u64::from_str_radix(digits, 16)
        .map_err(|_| SimError::bad_parameter(format!("`{token}` is not valid hex")))?;
    VirtAddr::from_u64(raw)
}

impl Command {
    /// Parses one line of the trace grammar (whitespace-tolerant between
    /// fields, strict about the fixed-width hex fields).
    pub fn parse_line(line: &str) -> Result<Command> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(SimError::bad_parameter("empty trace line"));
        }

        match tokens[0] {
            "R" => Self::parse_read(&tokens),
            "W" => Self::parse_write(&tokens),
            other => Err(SimError::bad_parameter(format!(
                "unknown order `{other}`, expected R or W"
            ))),
        }
    }

    fn parse_read(tokens: &[&str]) -> Result<Command> {
        if tokens.len() < 2 {
            return Err(SimError::bad_parameter("truncated R command"));
        }
        match tokens[1] {
            "I" => {
                if tokens.len() != 3 {
                    return Err(SimError::bad_parameter("`R I` takes exactly one address"));
                }
                Ok(Command {
                    order: Order::Read,
                    kind: AccessKind::Instruction,
                    size: DataSize::Word,
                    write_data: 0,
                    vaddr: parse_addr(tokens[2])?,
                })
            }
            "D" => {
                if tokens.len() != 4 {
                    return Err(SimError::bad_parameter("`R D` takes a size and an address"));
                }
                let size = parse_size(tokens[2])?;
                Ok(Command {
                    order: Order::Read,
                    kind: AccessKind::Data,
                    size,
                    write_data: 0,
                    vaddr: parse_addr(tokens[3])?,
                })
            }
            other => Err(SimError::bad_parameter(format!(
                "unknown access kind `{other}`, expected I or D"
            ))),
        }
    }

    fn parse_write(tokens: &[&str]) -> Result<Command> {
        if tokens.len() != 5 {
            return Err(SimError::bad_parameter(
                "`W D` takes a size, a value, and an address",
            ));
        }
        if tokens[1] != "D" {
            return Err(SimError::bad_parameter("cannot write an instruction"));
        }
        let size = parse_size(tokens[2])?;
        let write_data = parse_hex(tokens[3], size.max_hex_digits())?;
        Ok(Command {
            order: Order::Write,
            kind: AccessKind::Data,
            size,
            write_data,
            vaddr: parse_addr(tokens[4])?,
        })
    }
}

fn parse_size(token: &str) -> Result<DataSize> {
    match token {
        "W" => Ok(DataSize::Word),
        "B" => Ok(DataSize::Byte),
        other => Err(SimError::bad_parameter(format!(
            "unknown data size `{other}`, expected W or B"
        ))),
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.order.as_char(), self.kind.as_char())?;
        if self.kind == AccessKind::Data {
            write!(f, " {}", self.size.as_char())?;
        }
        write!(f, " ")?;
        if self.order == Order::Write {
            match self.size {
                DataSize::Word => write!(f, "0x{:08X} ", self.write_data)?,
                DataSize::Byte => write!(f, "0x{:02X} ", self.write_data)?,
            }
        }
        write!(f, "@0x{:016X}", self.vaddr.to_u64())
    }
}

/// An ordered listing of commands read from a trace file. Unlike the
/// source's fixed 100-command buffer, this grows without bound — that cap
/// was a fixed-array artifact of the C implementation, not a protocol
/// constraint.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub commands: Vec<Command>,
}

impl Program {
    pub fn read(path: impl AsRef<Path>) -> Result<Program> {
        let text = std::fs::read_to_string(path)?;
        let mut commands = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let command = Command::parse_line(line)
                .map_err(|e| SimError::bad_parameter(format!("line {}: {e}", lineno + 1)))?;
            commands.push(command);
        }
        Ok(Program { commands })
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for command in &self.commands {
            writeln!(f, "{command}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_instruction_read() {
        let c = Command::parse_line("R I @0x0000000000000010").unwrap();
        assert_eq!(c.order, Order::Read);
        assert_eq!(c.kind, AccessKind::Instruction);
        assert_eq!(c.size, DataSize::Word);
        assert_eq!(c.vaddr.to_u64(), 0x10);
    }

    #[test]
    fn parses_data_byte_read() {
        let c = Command::parse_line("R D B @0x0000000000000031").unwrap();
        assert_eq!(c.kind, AccessKind::Data);
        assert_eq!(c.size, DataSize::Byte);
    }

    #[test]
    fn parses_data_word_write() {
        let c = Command::parse_line("W D W 0xDEADBEEF @0x0000000000000020").unwrap();
        assert_eq!(c.order, Order::Write);
        assert_eq!(c.write_data, 0xDEAD_BEEF);
        assert_eq!(c.vaddr.to_u64(), 0x20);
    }

    #[test]
    fn rejects_instruction_write() {
        assert!(Command::parse_line("W I @0x0000000000000020").is_err());
    }

    #[test]
    fn rejects_oversized_byte_value() {
        assert!(Command::parse_line("W D B 0x1FF @0x0000000000000020").is_err());
    }

    #[test]
    fn display_round_trips_every_command_kind() {
        let lines = [
            "R I @0x0000000000000010",
            "R D W @0x0000000000000010",
            "R D B @0x0000000000000010",
            "W D W 0xDEADBEEF @0x0000000000000020",
            "W D B 0xAA @0x0000000000000021",
        ];
        for line in lines {
            let command = Command::parse_line(line).unwrap();
            assert_eq!(command.to_string(), line);
        }
    }
}

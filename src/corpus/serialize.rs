//! Corpus file format
//!
//! One UTF-8 text file per mnemonic. Each group is a header line followed
//! by one indented line per entry:
//!
//! ```text
//! instr:0x<HEXADDR>;#<HEXBYTES>;<DISASM>;<ENTRY_COUNT>
//!  in:<ITEMS>|out:<ITEMS>[|exception:<KIND>]
//! ```
//!
//! Items are comma-separated `name:#HEX` pairs; register data is the full
//! root width little-endian, `flags` is a 4-byte little-endian EFLAGS
//! image. The parser accepts both hex cases and re-serializes its input
//! byte-identically.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::disasm::decoder::InstrDecoder;
use crate::disasm::{regs, Architecture};
use crate::matrix::ExceptionKind;

use super::{CaseEntry, TestGroup};

pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02X}");
    }
    out
}

pub fn hex_decode(text: &str) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 {
        bail!("odd-length hex string: {text:?}");
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .with_context(|| format!("bad hex byte in {text:?}"))
        })
        .collect()
}

/// One `name:#HEX` item of an entry line, kept in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Reg(String, Vec<u8>),
    Flags(u32),
}

/// A parsed entry line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub inputs: Vec<Item>,
    pub outputs: Vec<Item>,
    pub exception: Option<ExceptionKind>,
}

/// A parsed group with its header preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedGroup {
    pub address: u64,
    pub bytes: Vec<u8>,
    pub text: String,
    pub entries: Vec<ParsedEntry>,
}

fn push_items(line: &mut String, items: &[Item]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        match item {
            Item::Reg(item_name, data) => {
                let _ = write!(line, "{item_name}:#{}", hex_encode(data));
            }
            Item::Flags(value) => {
                let _ = write!(line, "flags:#{}", hex_encode(&value.to_le_bytes()));
            }
        }
    }
}

fn entry_items(entry: &CaseEntry) -> (Vec<Item>, Vec<Item>) {
    let mut inputs: Vec<Item> = entry
        .input_regs
        .iter()
        .map(|(reg, data)| Item::Reg(regs::name(reg), data.to_vec()))
        .collect();
    if let Some(flags) = entry.input_flags {
        inputs.push(Item::Flags(flags));
    }

    let mut outputs: Vec<Item> = entry
        .output_regs
        .iter()
        .map(|(reg, data)| Item::Reg(regs::name(reg), data.to_vec()))
        .collect();
    if let Some(flags) = entry.output_flags {
        outputs.push(Item::Flags(flags));
    }
    (inputs, outputs)
}

/// Serialize test groups into the corpus text format. The disassembly text
/// is re-derived from the encoding at the group's address.
pub fn format_groups(arch: Architecture, groups: &[TestGroup]) -> Result<String> {
    let decoder = InstrDecoder::new(arch);
    let mut out = String::new();

    for group in groups {
        let instr = decoder.decode(&group.bytes, group.address)?;
        let _ = writeln!(
            out,
            "instr:0x{:X};#{};{};{}",
            group.address,
            hex_encode(&group.bytes),
            instr.text,
            group.entries.len()
        );

        for entry in &group.entries {
            let (inputs, outputs) = entry_items(entry);
            let mut line = String::from(" in:");
            push_items(&mut line, &inputs);
            line.push_str("|out:");
            push_items(&mut line, &outputs);
            if let Some(exception) = entry.exception {
                let _ = write!(line, "|exception:{}", exception.as_str());
            }
            out.push_str(&line);
            out.push('\n');
        }
    }

    Ok(out)
}

/// Write a mnemonic's groups to its corpus file.
pub fn write_corpus(path: &Path, arch: Architecture, groups: &[TestGroup]) -> Result<()> {
    let text = format_groups(arch, groups)?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn parse_items(section: &str) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    if section.is_empty() {
        return Ok(items);
    }
    for part in section.split(',') {
        let (item_name, hex) = part
            .split_once(":#")
            .with_context(|| format!("malformed item {part:?}"))?;
        let data = hex_decode(hex)?;
        if item_name == "flags" {
            if data.len() != 4 {
                bail!("flags item must be 4 bytes, got {}", data.len());
            }
            items.push(Item::Flags(u32::from_le_bytes([
                data[0], data[1], data[2], data[3],
            ])));
        } else {
            items.push(Item::Reg(item_name.to_string(), data));
        }
    }
    Ok(items)
}

fn parse_entry(line: &str) -> Result<ParsedEntry> {
    let rest = line
        .strip_prefix(" in:")
        .with_context(|| format!("entry line without in-section: {line:?}"))?;

    let mut sections = rest.split('|');
    let in_section = sections.next().unwrap_or("");
    let out_section = sections
        .next()
        .and_then(|s| s.strip_prefix("out:"))
        .with_context(|| format!("entry line without out-section: {line:?}"))?;

    let exception = match sections.next() {
        Some(section) => {
            let kind_name = section
                .strip_prefix("exception:")
                .with_context(|| format!("unexpected trailing section: {section:?}"))?;
            Some(
                ExceptionKind::from_str(kind_name)
                    .with_context(|| format!("unknown exception kind {kind_name:?}"))?,
            )
        }
        None => None,
    };

    Ok(ParsedEntry {
        inputs: parse_items(in_section)?,
        outputs: parse_items(out_section)?,
        exception,
    })
}

fn parse_header(line: &str) -> Result<ParsedGroup> {
    let rest = line
        .strip_prefix("instr:0x")
        .with_context(|| format!("malformed group header: {line:?}"))?;
    let (addr_hex, rest) = rest
        .split_once(";#")
        .with_context(|| format!("group header without encoding: {line:?}"))?;
    let (bytes_hex, rest) = rest
        .split_once(';')
        .with_context(|| format!("group header without text: {line:?}"))?;
    let (text, _count) = rest
        .rsplit_once(';')
        .with_context(|| format!("group header without entry count: {line:?}"))?;

    Ok(ParsedGroup {
        address: u64::from_str_radix(addr_hex, 16)
            .with_context(|| format!("bad address in header: {line:?}"))?,
        bytes: hex_decode(bytes_hex)?,
        text: text.to_string(),
        entries: Vec::new(),
    })
}

/// Parse a corpus file back into groups.
pub fn parse_corpus(text: &str) -> Result<Vec<ParsedGroup>> {
    let mut groups: Vec<ParsedGroup> = Vec::new();

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        if line.starts_with("instr:") {
            groups.push(parse_header(line)?);
        } else {
            let group = groups
                .last_mut()
                .context("entry line before any group header")?;
            group.entries.push(parse_entry(line)?);
        }
    }

    Ok(groups)
}

/// Re-serialize parsed groups; `parse_corpus` followed by this function is
/// byte-identical for well-formed input.
pub fn render_groups(groups: &[ParsedGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        let _ = writeln!(
            out,
            "instr:0x{:X};#{};{};{}",
            group.address,
            hex_encode(&group.bytes),
            group.text,
            group.entries.len()
        );
        for entry in &group.entries {
            let mut line = String::from(" in:");
            push_items(&mut line, &entry.inputs);
            line.push_str("|out:");
            push_items(&mut line, &entry.outputs);
            if let Some(exception) = entry.exception {
                let _ = write!(line, "|exception:{}", exception.as_str());
            }
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

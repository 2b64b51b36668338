//! Per-mnemonic test collection
//!
//! Fans the search loop out over every encoding of a mnemonic, gathers the
//! surviving groups behind a mutex, orders them and hands them to the
//! serializer. A failed encoding never takes the mnemonic down with it.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use iced_x86::Mnemonic;

use crate::disasm::decoder::InstrDecoder;
use crate::disasm::Architecture;
use crate::progress::Progress;
use crate::search;

use super::encodings::{self, Filter};
use super::mnemonics::mnemonic_name;
use super::report::MnemonicSummary;
use super::serialize;
use super::TestGroup;

/// Settings for a generation run.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub arch: Architecture,
    pub output_dir: PathBuf,
    /// Enumerate dereferencing memory forms too. The sandbox maps no data
    /// memory, so these mostly fault out; LEA forms are always enumerated.
    pub include_memory: bool,
    pub threads: usize,
}

impl GenerateOptions {
    pub fn new(arch: Architecture, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            arch,
            output_dir: output_dir.into(),
            include_memory: false,
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Corpus file path for one mnemonic.
pub fn path_for_mnemonic(output_dir: &Path, mnemonic: Mnemonic) -> PathBuf {
    output_dir.join(format!("{}.txt", mnemonic_name(mnemonic)))
}

/// Generate and serialize the corpus of one mnemonic. Skips work when the
/// output file already exists so interrupted runs resume cheaply.
pub fn generate_for_mnemonic(
    opts: &GenerateOptions,
    mnemonic: Mnemonic,
) -> Result<MnemonicSummary> {
    let name = mnemonic_name(mnemonic);
    let path = path_for_mnemonic(&opts.output_dir, mnemonic);

    if path.exists() {
        println!("skipping \"{name}\" as it already exists");
        return Ok(MnemonicSummary::skipped(name));
    }

    let build_progress = Progress::start(&format!("Building \"{name}\" instruction combinations"));
    let corpus = encodings::build(
        opts.arch,
        &Filter::new().mnemonic(mnemonic),
        opts.include_memory,
        |current, max| build_progress.update(current, max),
    );
    build_progress.finish();

    println!("total instructions: {}", corpus.len());

    let test_progress = Progress::start("Generating tests");
    let groups: Mutex<Vec<TestGroup>> = Mutex::new(Vec::new());
    let completed = std::sync::atomic::AtomicUsize::new(0);

    corpus.for_each_parallel(opts.threads, |bytes| {
        let group = search::generate_group(opts.arch, bytes);
        if !group.entries.is_empty() && !group.illegal {
            groups.lock().expect("group list poisoned").push(group);
        }
        let done = completed.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
        test_progress.update(done, corpus.len());
    });
    test_progress.finish();

    let mut groups = groups.into_inner().expect("group list poisoned");

    // Narrow encodings first; ties keep completion order.
    let decoder = InstrDecoder::new(opts.arch);
    groups.sort_by_key(|group| {
        decoder
            .decode(&group.bytes, group.address)
            .map(|instr| instr.operand_width)
            .unwrap_or(0)
    });

    let entries: usize = groups.iter().map(|g| g.entries.len()).sum();
    println!("total test cases: {entries}");

    if !groups.is_empty() {
        std::fs::create_dir_all(&opts.output_dir)?;
        serialize::write_corpus(&path, opts.arch, &groups)?;
    }

    Ok(MnemonicSummary {
        mnemonic: name,
        encodings: corpus.len(),
        groups: groups.len(),
        entries,
        skipped: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for_mnemonic() {
        let path = path_for_mnemonic(Path::new("testdata"), Mnemonic::Add);
        assert_eq!(path, PathBuf::from("testdata/add.txt"));
    }

    #[test]
    fn test_existing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let opts = GenerateOptions::new(Architecture::X86_64, dir.path());
        std::fs::write(path_for_mnemonic(dir.path(), Mnemonic::Add), "").unwrap();

        let summary = generate_for_mnemonic(&opts, Mnemonic::Add).unwrap();
        assert!(summary.skipped);
        assert_eq!(summary.entries, 0);
    }
}

//! x86-witness: command-line driver for the test-corpus generator

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use x86_witness::corpus::collector::{generate_for_mnemonic, GenerateOptions};
use x86_witness::corpus::mnemonics::{mnemonic_by_name, mnemonic_name, SUPPORTED_MNEMONICS};
use x86_witness::corpus::report::RunReport;
use x86_witness::corpus::serialize;
use x86_witness::Architecture;

#[derive(Parser)]
#[command(name = "x86-witness")]
#[command(author, version, about = "Behavioral test-corpus generator for x86-64 instructions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate test corpora by executing instructions in the sandbox
    Generate {
        /// Machine mode bitness (32 or 64)
        #[arg(short, long, default_value = "64")]
        bitness: u32,

        /// Directory the per-mnemonic corpus files are written to
        #[arg(short, long, default_value = "testdata")]
        output: PathBuf,

        /// Only generate these mnemonics (default: the whole table)
        #[arg(short, long)]
        mnemonic: Vec<String>,

        /// Worker threads (default: available parallelism)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Also enumerate dereferencing memory forms
        #[arg(long)]
        include_memory: bool,

        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List the mnemonics the generator supports
    ListMnemonics,

    /// Summarize an existing corpus file
    Info {
        /// Corpus file to inspect
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            bitness,
            output,
            mnemonic,
            threads,
            include_memory,
            report,
        } => generate(bitness, output, &mnemonic, threads, include_memory, report),
        Commands::ListMnemonics => {
            for mnemonic in SUPPORTED_MNEMONICS {
                println!("{}", mnemonic_name(*mnemonic));
            }
            Ok(())
        }
        Commands::Info { file } => info(&file),
    }
}

fn generate(
    bitness: u32,
    output: PathBuf,
    mnemonic_names: &[String],
    threads: Option<usize>,
    include_memory: bool,
    report_path: Option<PathBuf>,
) -> Result<()> {
    let arch = match bitness {
        32 => Architecture::X86,
        64 => Architecture::X86_64,
        other => bail!("unsupported bitness {other}; expected 32 or 64"),
    };

    let mnemonics = if mnemonic_names.is_empty() {
        SUPPORTED_MNEMONICS.to_vec()
    } else {
        mnemonic_names
            .iter()
            .map(|name| {
                mnemonic_by_name(name)
                    .ok_or_else(|| anyhow::anyhow!("unsupported mnemonic \"{name}\""))
            })
            .collect::<Result<Vec<_>>>()?
    };

    let mut opts = GenerateOptions::new(arch, output);
    opts.include_memory = include_memory;
    if let Some(threads) = threads {
        opts.threads = threads.max(1);
    }

    let mut run = RunReport::new(bitness);
    for mnemonic in mnemonics {
        match generate_for_mnemonic(&opts, mnemonic) {
            Ok(summary) => run.mnemonics.push(summary),
            Err(e) => println!("{} failed: {e}", mnemonic_name(mnemonic)),
        }
    }

    println!(
        "run complete: {} mnemonics, {} entries",
        run.mnemonics.len(),
        run.total_entries()
    );

    if let Some(path) = report_path {
        run.save_json(&path)?;
        println!("report written to {}", path.display());
    }

    Ok(())
}

fn info(file: &PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(file)?;
    let groups = serialize::parse_corpus(&text)?;

    let entries: usize = groups.iter().map(|g| g.entries.len()).sum();
    let exceptions: usize = groups
        .iter()
        .flat_map(|g| &g.entries)
        .filter(|e| e.exception.is_some())
        .count();

    println!("file: {}", file.display());
    println!("groups: {}", groups.len());
    println!("entries: {entries}");
    println!("exception entries: {exceptions}");

    for group in &groups {
        println!(
            "  0x{:X} {} ({} entries)",
            group.address,
            group.text,
            group.entries.len()
        );
    }

    Ok(())
}

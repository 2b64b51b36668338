//! Run summary reporting

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one mnemonic in a generation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MnemonicSummary {
    pub mnemonic: String,
    /// Encodings enumerated for the mnemonic
    pub encodings: usize,
    /// Groups that produced at least one entry
    pub groups: usize,
    /// Witnessed entries across all groups
    pub entries: usize,
    /// The output file already existed
    pub skipped: bool,
}

impl MnemonicSummary {
    pub fn skipped(mnemonic: String) -> Self {
        Self {
            mnemonic,
            encodings: 0,
            groups: 0,
            entries: 0,
            skipped: true,
        }
    }
}

/// A whole run, serializable as JSON for downstream tooling.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub version: String,
    pub mode_bitness: u32,
    pub generated_at: DateTime<Utc>,
    pub mnemonics: Vec<MnemonicSummary>,
}

impl RunReport {
    pub fn new(mode_bitness: u32) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode_bitness,
            generated_at: Utc::now(),
            mnemonics: Vec::new(),
        }
    }

    pub fn total_entries(&self) -> usize {
        self.mnemonics.iter().map(|m| m.entries).sum()
    }

    /// Save the report as pretty JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Load a previously saved report.
    pub fn load_json(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let report = serde_json::from_reader(reader)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_json_roundtrip() {
        let mut report = RunReport::new(64);
        report.mnemonics.push(MnemonicSummary {
            mnemonic: "add".to_string(),
            encodings: 42,
            groups: 40,
            entries: 5000,
            skipped: false,
        });
        report.mnemonics.push(MnemonicSummary::skipped("xor".to_string()));

        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.save_json(&path).unwrap();

        let loaded = RunReport::load_json(&path).unwrap();
        assert_eq!(loaded.mode_bitness, 64);
        assert_eq!(loaded.mnemonics.len(), 2);
        assert_eq!(loaded.total_entries(), 5000);
        assert!(loaded.mnemonics[1].skipped);
    }
}

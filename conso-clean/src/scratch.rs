//! The `key=value` scratch file shared with the orchestrator.
//!
//! Each stage leaves its timing and resource measurements in a small text
//! file that the orchestrator reads back when it builds the run summary:
//!
//! ```text
//! # 02_nettoyage 17/10/2026 14:03:12
//! temps_exec_sec=42.17
//! ram_gb=7.81
//! cpu_pct=63.4
//! logi_cores=5.1
//! physi_cores=2.5
//! ```
//!
//! Blank lines, `#` comments and lines without `=` are ignored when reading.
//! Values are numbers when they parse as one (`,` is accepted as decimal
//! separator), text otherwise.

use crate::prelude::*;
use crate::resources::{round_to, ResourceSnapshot};
use crate::udf::clean_consommation;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Keys written by [`ScratchFile::for_stage`].
pub const TEMPS_EXEC_SEC: &str = "temps_exec_sec";
pub const RAM_GB: &str = "ram_gb";
pub const CPU_PCT: &str = "cpu_pct";
pub const LOGI_CORES: &str = "logi_cores";
pub const PHYSI_CORES: &str = "physi_cores";

/// One value of the scratch file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScratchValue {
    Number(f64),
    Text(String),
}

impl ScratchValue {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match clean_consommation(Some(raw)) {
            Some(number) => ScratchValue::Number(number),
            None => ScratchValue::Text(raw.to_string()),
        }
    }

    /// The numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScratchValue::Number(n) => Some(*n),
            ScratchValue::Text(_) => None,
        }
    }
}

impl fmt::Display for ScratchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScratchValue::Number(n) => write!(f, "{n}"),
            ScratchValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Ordered `key=value` entries plus an optional header comment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScratchFile {
    header: Option<String>,
    entries: Vec<(String, ScratchValue)>,
}

impl ScratchFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses scratch text. Malformed lines are skipped; a repeated key
    /// keeps its last value.
    ///
    /// ```rust
    /// use conso_clean::scratch::{ScratchFile, ScratchValue};
    ///
    /// let file = ScratchFile::parse("# comment\n\nram_gb = 7,5\nnote=ok\nnonsense\n");
    /// assert_eq!(file.get("ram_gb"), Some(&ScratchValue::Number(7.5)));
    /// assert_eq!(file.get("note"), Some(&ScratchValue::Text("ok".into())));
    /// assert_eq!(file.len(), 2);
    /// ```
    pub fn parse(text: &str) -> Self {
        let mut file = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            file.insert(key.trim(), ScratchValue::parse(value));
        }
        file
    }

    /// Reads and parses a scratch file.
    pub async fn read(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            CleanError::Scratch(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(Self::parse(&text))
    }

    /// The file written at the end of a stage run.
    pub fn for_stage(
        stage_name: &str,
        written_at: NaiveDateTime,
        elapsed_secs: f64,
        resources: &ResourceSnapshot,
    ) -> Self {
        let mut file = Self::new();
        file.header = Some(format!(
            "{stage_name} {}",
            written_at.format("%d/%m/%Y %H:%M:%S")
        ));
        let metrics = [
            (TEMPS_EXEC_SEC, round_to(elapsed_secs, 2)),
            (RAM_GB, round_to(resources.ram_available_gb, 2)),
            (CPU_PCT, round_to(resources.cpu_available_pct, 2)),
            (LOGI_CORES, round_to(resources.available_logical_cores, 1)),
            (PHYSI_CORES, round_to(resources.available_physical_cores, 1)),
        ];
        for (key, value) in metrics {
            file.insert(key, ScratchValue::Number(value));
        }
        file
    }

    /// Sets `key`, replacing any previous value in place.
    pub fn insert(&mut self, key: &str, value: ScratchValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ScratchValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Looks up a numeric value.
    pub fn number(&self, key: &str) -> Result<f64> {
        match self.get(key) {
            Some(ScratchValue::Number(n)) => Ok(*n),
            Some(ScratchValue::Text(text)) => Err(CleanError::Scratch(format!(
                "value of '{key}' is not a number: {text}"
            ))),
            None => Err(CleanError::Scratch(format!("missing key '{key}'"))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScratchValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Renders the file contents.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(header) = &self.header {
            out.push_str(&format!("# {header}\n"));
        }
        for (key, value) in &self.entries {
            out.push_str(&format!("{key}={value}\n"));
        }
        out
    }

    /// Writes the file, replacing any previous content and creating parent
    /// directories.
    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.render()).await?;
        info!(scratch.path = %path.display(), scratch.entries = self.len(), "[ok]: scratch file written");
        Ok(())
    }
}

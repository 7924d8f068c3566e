//! Persisted high-water marks.
//!
//! The store is a flat JSON object of `{"TICKER": high}`. Reading is tolerant:
//! a missing or broken file yields an empty store so the run can still proceed.
//! Writing goes through a sibling temp file and a rename so an interrupted run
//! never leaves a truncated file behind.

use crate::api::Price;
use crate::error::StoreError;
use log::{debug, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Highest observed price per ticker.
///
/// Values only ever go up and entries are never removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighWaterMarks {
    highs: BTreeMap<String, f64>,
}

impl HighWaterMarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.highs.get(ticker).copied()
    }

    /// Raise the mark for `ticker` to `price` if it is a new maximum.
    ///
    /// A ticker with no prior mark takes `price` as its initial high.
    pub fn observe(&mut self, ticker: &str, price: Price) -> Observation {
        let price = price.value();
        match self.highs.get_mut(ticker) {
            None => {
                self.highs.insert(ticker.to_string(), price);
                Observation::First
            }
            Some(high) if price > *high => {
                let previous = *high;
                *high = price;
                Observation::NewHigh { previous }
            }
            Some(high) => Observation::Below { high: *high },
        }
    }

    pub fn len(&self) -> usize {
        self.highs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.highs.is_empty()
    }

    /// Parse a store document, dropping entries that are not positive numbers.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, Value> = serde_json::from_str(text)?;
        let mut highs = BTreeMap::new();
        for (key, value) in raw {
            match value.as_f64().filter(|v| v.is_finite() && *v > 0.0) {
                Some(high) => {
                    let ticker = key.trim().to_uppercase();
                    let entry = highs.entry(ticker).or_insert(high);
                    if high > *entry {
                        *entry = high;
                    }
                }
                None => warn!("Ignoring bad high for {:?}: {}", key, value),
            }
        }
        Ok(Self { highs })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut text = serde_json::to_string_pretty(&self.highs)?;
        text.push('\n');
        Ok(text)
    }
}

impl FromIterator<(String, f64)> for HighWaterMarks {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            highs: iter
                .into_iter()
                .filter(|(_, v)| v.is_finite() && *v > 0.0)
                .collect(),
        }
    }
}

/// What happened to a ticker's mark when a price was observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// No mark existed; the price became the initial high.
    First,
    /// The price exceeded the previous high and replaced it.
    NewHigh { previous: f64 },
    /// The price was at or below the stored high.
    Below { high: f64 },
}

/// Load the store, falling back to an empty one on any failure.
pub fn load(path: &Path) -> HighWaterMarks {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No stored highs at {}, starting empty", path.display());
            return HighWaterMarks::new();
        }
        Err(e) => {
            warn!("Failed to read {}: {}; starting with no highs", path.display(), e);
            return HighWaterMarks::new();
        }
    };

    match HighWaterMarks::from_json(&text) {
        Ok(marks) => {
            debug!("Loaded {} highs from {}", marks.len(), path.display());
            marks
        }
        Err(e) => {
            warn!("Malformed highs file {}: {}; starting with no highs", path.display(), e);
            HighWaterMarks::new()
        }
    }
}

/// Replace the store at `path` with `marks`.
pub fn save(path: &Path, marks: &HighWaterMarks) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            dir.to_path_buf()
        }
        _ => PathBuf::from("."),
    };

    let text = marks.to_json()?;
    let tmp_path = temp_path_for(path, &dir);

    let written = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()
    })();
    if let Err(source) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::Io {
            path: tmp_path,
            source,
        });
    }

    if let Err(source) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(())
}

fn temp_path_for(path: &Path, dir: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "highs.json".to_string());
    dir.join(format!(".{}.{}.tmp", name, std::process::id()))
}

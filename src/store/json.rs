use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::app::Result;
use crate::config::PathsConfig;
use crate::domain::{Record, RunMeta, ValidationReport};
use crate::normalizer::RecordSet;
use crate::store::Store;

/// The published dataset document
#[derive(Debug, Serialize)]
struct DatasetOut<'a> {
    meta: &'a RunMeta,
    albums: Vec<AlbumOut<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AlbumOut<'a> {
    Record(&'a Record),
    Raw(&'a Value),
}

/// Entries are decoded one by one so a single bad entry cannot sink the file
#[derive(Debug, Deserialize)]
struct DatasetIn {
    #[serde(default)]
    albums: Vec<Value>,
}

/// JSON-file persistence for the dataset, recheck queue and validation report.
#[derive(Debug, Clone)]
pub struct JsonStore {
    output: PathBuf,
    recheck: PathBuf,
    validation: PathBuf,
}

impl JsonStore {
    pub fn new(
        output: impl Into<PathBuf>,
        recheck: impl Into<PathBuf>,
        validation: impl Into<PathBuf>,
    ) -> Self {
        Self {
            output: output.into(),
            recheck: recheck.into(),
            validation: validation.into(),
        }
    }

    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self::new(&paths.output, &paths.recheck, &paths.validation)
    }
}

/// Newest first by `date` (falling back to `indexed_at`), ties by id
pub fn sort_records(records: &mut [Record]) {
    records.sort_by(|a, b| {
        b.sort_key()
            .cmp(&a.sort_key())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Serialize `value` to a sibling temp file, then rename over `path`
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let json = serde_json::to_string_pretty(value)?;
    fs::write(&tmp, json)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn decode_albums(albums: Vec<Value>) -> RecordSet {
    let mut set = RecordSet::new();
    for entry in albums {
        match serde_json::from_value::<Record>(entry.clone()) {
            Ok(record) => {
                set.merge(record);
            }
            Err(e) => {
                let id = entry.get("id").and_then(Value::as_str).unwrap_or("?");
                warn!(id, "Keeping unreadable record as-is: {}", e);
                set.keep_unreadable(entry);
            }
        }
    }
    set
}

impl Store for JsonStore {
    fn load(&self) -> Result<RecordSet> {
        let content = match fs::read_to_string(&self.output) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.output.display(), "No existing dataset, starting empty");
                return Ok(RecordSet::new());
            }
            Err(e) => {
                warn!(path = %self.output.display(), "Failed to read dataset, starting empty: {}", e);
                return Ok(RecordSet::new());
            }
        };

        match serde_json::from_str::<DatasetIn>(&content) {
            Ok(dataset) => {
                let set = decode_albums(dataset.albums);
                info!(
                    path = %self.output.display(),
                    records = set.len(),
                    unreadable = set.unreadable().len(),
                    "Loaded dataset"
                );
                Ok(set)
            }
            Err(e) => {
                warn!(path = %self.output.display(), "Corrupt dataset, starting empty: {}", e);
                Ok(RecordSet::new())
            }
        }
    }

    fn save(&self, records: &RecordSet, new_this_run: usize) -> Result<RunMeta> {
        let mut albums: Vec<Record> = records.iter().cloned().collect();
        sort_records(&mut albums);
        let mut meta = RunMeta::compute(&albums, new_this_run);
        meta.total += records.unreadable().len();

        let out: Vec<AlbumOut<'_>> = albums
            .iter()
            .map(AlbumOut::Record)
            .chain(records.unreadable().iter().map(AlbumOut::Raw))
            .collect();
        write_json_atomic(
            &self.output,
            &DatasetOut {
                meta: &meta,
                albums: out,
            },
        )?;

        let recheck: Vec<&Record> = albums.iter().filter(|r| r.needs_recheck).collect();
        write_json_atomic(&self.recheck, &recheck)?;

        info!(
            path = %self.output.display(),
            total = meta.total,
            new = meta.new_this_run,
            placeholders = meta.placeholder_count,
            recheck = meta.recheck_count,
            "Saved dataset"
        );
        Ok(meta)
    }

    fn write_validation(&self, report: &ValidationReport) -> Result<()> {
        write_json_atomic(&self.validation, report)
    }
}

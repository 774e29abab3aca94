use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::report::{GeoRow, Report, Table};

pub const METADATA_CSV: &str = "metadata.csv";
pub const COMPARISON_CSV: &str = "metadata_compared.csv";
pub const GEOJSON_FILE: &str = "geolocation.geojson";
pub const HISTORY_FILE: &str = ".history.jsonl";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One line of the run history kept next to the exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: String,
    pub source: String,
    pub files: usize,
    pub duplicate_pairs: usize,
    pub comparisons: usize,
    pub exported: Vec<String>,
}

/// Writes report tables to an output directory.
pub struct ExportService {
    out_dir: PathBuf,
}

impl ExportService {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Export files that would be overwritten by `export_report`.
    pub fn existing_outputs(&self, report: &Report) -> Vec<PathBuf> {
        self.planned_outputs(report)
            .into_iter()
            .filter(|p| p.exists())
            .collect()
    }

    fn planned_outputs(&self, report: &Report) -> Vec<PathBuf> {
        let mut outputs = vec![
            self.out_dir.join(METADATA_CSV),
            self.out_dir.join(COMPARISON_CSV),
        ];
        if !report.geo.is_empty() {
            outputs.push(self.out_dir.join(GEOJSON_FILE));
        }
        outputs
    }

    /// Write both CSV tables and, when there are points, the GeoJSON map.
    pub fn export_report(&self, report: &Report) -> Result<Vec<PathBuf>, ExportError> {
        fs::create_dir_all(&self.out_dir).map_err(|source| ExportError::Io {
            path: self.out_dir.clone(),
            source,
        })?;

        let metadata_path = self.out_dir.join(METADATA_CSV);
        write_table_csv(&report.metadata_table, &metadata_path)?;

        let comparison_path = self.out_dir.join(COMPARISON_CSV);
        write_table_csv(&report.comparison_table(), &comparison_path)?;

        let mut written = vec![metadata_path, comparison_path];
        if !report.geo.is_empty() {
            let geo_path = self.out_dir.join(GEOJSON_FILE);
            let geojson = geojson_document(report);
            let text = serde_json::to_string_pretty(&geojson)?;
            fs::write(&geo_path, text).map_err(|source| ExportError::Io {
                path: geo_path.clone(),
                source,
            })?;
            written.push(geo_path);
        }

        for path in &written {
            log::info!("Wrote {}", path.display());
        }
        Ok(written)
    }

    pub fn append_history(
        &self,
        source: &Path,
        report: &Report,
        file_count: usize,
        exported: &[PathBuf],
    ) -> Result<RunRecord, ExportError> {
        let history_file = self.out_dir.join(HISTORY_FILE);
        let record = RunRecord {
            timestamp: Utc::now().to_rfc3339(),
            source: source.display().to_string(),
            files: file_count,
            duplicate_pairs: report.duplicates.len(),
            comparisons: report.comparisons.len(),
            exported: exported
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        };

        let io_err = |source| ExportError::Io {
            path: history_file.clone(),
            source,
        };
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&history_file)
            .map_err(io_err)?;
        writeln!(out, "{}", serde_json::to_string(&record)?).map_err(io_err)?;
        Ok(record)
    }

    /// All readable history records; malformed lines are skipped.
    pub fn read_history(&self) -> Result<Vec<RunRecord>, ExportError> {
        let history_file = self.out_dir.join(HISTORY_FILE);
        let io_err = |source| ExportError::Io {
            path: history_file.clone(),
            source,
        };
        let f = File::open(&history_file).map_err(io_err)?;
        let reader = BufReader::new(f);

        let mut records = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunRecord>(&line) {
                Ok(rec) => records.push(rec),
                Err(err) => log::warn!("Skipping malformed history entry {}: {}", i, err),
            }
        }
        Ok(records)
    }
}

pub fn write_table_csv(table: &Table, path: &Path) -> Result<(), ExportError> {
    let csv_err = |source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(&table.columns).map_err(csv_err)?;
    for row in &table.rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn geo_feature(row: &GeoRow) -> serde_json::Value {
    json!({
        "type": "Feature",
        "geometry": {
            "type": "Point",
            "coordinates": [row.longitude, row.latitude],
        },
        "properties": {
            "file": row.file,
            "description": row.description,
            "metadata": row.metadata,
        },
    })
}

/// A GeoJSON FeatureCollection with a `bbox` covering every point.
pub fn geojson_document(report: &Report) -> serde_json::Value {
    let features: Vec<_> = report.geo.iter().map(geo_feature).collect();
    match report.geo_bounds {
        Some(b) => json!({
            "type": "FeatureCollection",
            "bbox": [b.min_longitude, b.min_latitude, b.max_longitude, b.max_latitude],
            "features": features,
        }),
        None => json!({
            "type": "FeatureCollection",
            "features": features,
        }),
    }
}

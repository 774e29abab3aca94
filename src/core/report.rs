use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::core::geo::{GeoBounds, GeoConfig, GeoPoint};
use crate::core::hash::DuplicatePair;
use crate::core::metadata::{FileRecord, MetaValue};
use crate::core::similarity::SimilarityResult;
use crate::core::weights::WeightingSystem;

pub const FILE_COLUMN: &str = "File";
pub const HASH_COLUMN: &str = "Hash";
pub const COMPARISON_COLUMNS: [&str; 6] = [
    "File1",
    "File2",
    "System",
    "Similarity",
    "Matching Keys",
    "Identical Hash",
];

/// A finished, rectangular table of display strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Append-only row collector. Rows shorter than the header are padded with
/// empty cells, longer rows are cut.
#[derive(Debug)]
pub struct TableBuilder {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableBuilder {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_capacity(mut self, rows: usize) -> Self {
        self.rows.reserve(rows);
        self
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    pub fn finish(self) -> Table {
        Table {
            columns: self.columns,
            rows: self.rows,
        }
    }
}

/// One similarity row annotated with the duplicate flag of its pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub file1: String,
    pub file2: String,
    pub system: WeightingSystem,
    pub similarity: u64,
    pub matching_keys: BTreeMap<String, MetaValue>,
    pub identical_hash: bool,
}

impl ComparisonRow {
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.file1.clone(),
            self.file2.clone(),
            self.system.to_string(),
            self.similarity.to_string(),
            serde_json::to_string(&self.matching_keys).unwrap_or_default(),
            self.identical_hash.to_string(),
        ]
    }
}

/// A geo table row keeps the originating metadata for popup rendering.
pub type GeoRow = GeoPoint;

/// Everything the presentation layer needs from one run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata_table: Table,
    pub comparisons: Vec<ComparisonRow>,
    pub duplicates: Vec<(String, String)>,
    pub geo: Vec<GeoRow>,
    pub geo_bounds: Option<GeoBounds>,
}

impl Report {
    pub fn comparison_table(&self) -> Table {
        let mut builder =
            TableBuilder::new(COMPARISON_COLUMNS).with_capacity(self.comparisons.len());
        for row in &self.comparisons {
            builder.push_row(row.cells());
        }
        builder.finish()
    }
}

/// Reshapes already-computed results into tables; never recomputes scores.
#[derive(Debug, Clone, Default)]
pub struct ReportAssembler {
    geo_config: GeoConfig,
}

impl ReportAssembler {
    pub fn new(geo_config: GeoConfig) -> Self {
        Self { geo_config }
    }

    /// One row per file, one column per key seen anywhere in the batch.
    pub fn metadata_table(&self, records: &[FileRecord]) -> Table {
        let keys: BTreeSet<&str> = records
            .iter()
            .flat_map(|r| r.metadata.keys().map(String::as_str))
            .collect();

        let columns = [FILE_COLUMN, HASH_COLUMN]
            .into_iter()
            .chain(keys.iter().copied());
        let mut builder = TableBuilder::new(columns).with_capacity(records.len());

        for record in records {
            let mut row = Vec::with_capacity(keys.len() + 2);
            row.push(record.name.clone());
            row.push(record.hash.to_string());
            row.extend(
                keys.iter()
                    .map(|key| record.get(key).map(MetaValue::to_cell).unwrap_or_default()),
            );
            builder.push_row(row);
        }

        builder.finish()
    }

    /// Similarity rows grouped by file pair, policy order kept within a pair.
    pub fn comparison_rows(
        &self,
        results: &[SimilarityResult],
        duplicates: &BTreeSet<DuplicatePair>,
    ) -> Vec<ComparisonRow> {
        let mut ordered: Vec<&SimilarityResult> = results.iter().collect();
        ordered.sort_by_key(|r| (r.first, r.second));

        ordered
            .into_iter()
            .map(|r| ComparisonRow {
                file1: r.file1.clone(),
                file2: r.file2.clone(),
                system: r.system,
                similarity: r.score,
                matching_keys: r.matching_keys.clone(),
                identical_hash: duplicates.contains(&DuplicatePair {
                    first: r.first,
                    second: r.second,
                }),
            })
            .collect()
    }

    pub fn geo_points(&self, records: &[FileRecord]) -> Vec<GeoRow> {
        records
            .iter()
            .filter_map(|r| GeoPoint::from_record(r, &self.geo_config))
            .collect()
    }

    pub fn duplicate_names(
        &self,
        records: &[FileRecord],
        duplicates: &BTreeSet<DuplicatePair>,
    ) -> Vec<(String, String)> {
        duplicates
            .iter()
            .filter_map(|pair| {
                let first = records.get(pair.first)?;
                let second = records.get(pair.second)?;
                Some((first.name.clone(), second.name.clone()))
            })
            .collect()
    }

    pub fn assemble(
        &self,
        records: &[FileRecord],
        results: &[SimilarityResult],
        duplicates: &BTreeSet<DuplicatePair>,
    ) -> Report {
        let geo = self.geo_points(records);
        let geo_bounds = GeoBounds::of(&geo);
        Report {
            metadata_table: self.metadata_table(records),
            comparisons: self.comparison_rows(results, duplicates),
            duplicates: self.duplicate_names(records, duplicates),
            geo,
            geo_bounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::{HashIndex, hash_bytes};
    use crate::core::metadata::{Metadata, MetadataNormalizer};
    use crate::core::similarity::SimilarityEngine;

    fn record(name: &str, content: &[u8], entries: &[(&str, MetaValue)]) -> FileRecord {
        let raw: Metadata = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        FileRecord::new(
            name,
            hash_bytes(content),
            MetadataNormalizer::default().normalize(raw),
        )
    }

    fn batch() -> Vec<FileRecord> {
        vec![
            record(
                "a.jpg",
                b"same",
                &[
                    ("EXIF:Make", "Canon".into()),
                    ("EXIF:GPSLatitude", 10i64.into()),
                    ("EXIF:GPSLongitude", 20i64.into()),
                ],
            ),
            record(
                "b.jpg",
                b"same",
                &[("EXIF:Make", "Canon".into()), ("EXIF:ISO", f64::NAN.into())],
            ),
            record("c.pdf", b"other", &[]),
        ]
    }

    #[test]
    fn test_metadata_table_shape() {
        let records = batch();
        let table = ReportAssembler::default().metadata_table(&records);

        assert_eq!(
            table.columns,
            vec![
                "File",
                "Hash",
                "EXIF:GPSLatitude",
                "EXIF:GPSLongitude",
                "EXIF:ISO",
                "EXIF:Make"
            ]
        );
        assert_eq!(table.rows.len(), 3);
        assert!(table.rows.iter().all(|r| r.len() == table.columns.len()));

        let iso = table.column_index("EXIF:ISO").unwrap();
        assert_eq!(table.rows[1][iso], "");
        assert_eq!(table.rows[0][iso], "");
        let make = table.column_index("EXIF:Make").unwrap();
        assert_eq!(table.rows[0][make], "Canon");
        assert_eq!(table.rows[2][make], "");
        assert_eq!(table.rows[2][1], records[2].hash.to_string());
    }

    #[test]
    fn test_comparison_rows_carry_duplicate_flag() {
        let records = batch();
        let digests: Vec<_> = records.iter().map(|r| r.hash.clone()).collect();
        let duplicates = HashIndex::build(&digests).find_duplicates();
        let results = SimilarityEngine::default()
            .compare_all(&records, &[WeightingSystem::Equal, WeightingSystem::RareKeys]);

        let report = ReportAssembler::default().assemble(&records, &results, &duplicates);
        assert_eq!(report.comparisons.len(), 3 * 2);
        assert!(report.comparisons[0].identical_hash);
        assert!(report.comparisons[1].identical_hash);
        assert!(report.comparisons[2..].iter().all(|r| !r.identical_hash));
        assert_eq!(report.comparisons[0].similarity, 1);
        assert_eq!(
            report.duplicates,
            vec![("a.jpg".to_string(), "b.jpg".to_string())]
        );
    }

    #[test]
    fn test_comparison_table_cells() {
        let records = batch();
        let results =
            SimilarityEngine::default().compare_all(&records, &[WeightingSystem::Equal]);
        let report =
            ReportAssembler::default().assemble(&records, &results, &BTreeSet::new());

        let table = report.comparison_table();
        assert_eq!(table.columns, COMPARISON_COLUMNS.to_vec());
        assert_eq!(
            table.rows[0],
            vec!["a.jpg", "b.jpg", "equal", "1", r#"{"EXIF:Make":"Canon"}"#, "false"]
        );
        assert_eq!(table.rows[1][4], "{}");
    }

    #[test]
    fn test_geo_subset() {
        let records = batch();
        let report = ReportAssembler::default().assemble(&records, &[], &BTreeSet::new());
        assert_eq!(report.geo.len(), 1);
        assert_eq!(report.geo[0].file, "a.jpg");
        assert_eq!(report.geo[0].metadata, records[0].metadata);
        assert!(report.geo_bounds.is_some());
    }

    #[test]
    fn test_builder_pads_short_rows() {
        let mut builder = TableBuilder::new(["a", "b", "c"]);
        builder.push_row(vec!["1".to_string()]);
        let table = builder.finish();
        assert_eq!(table.rows[0], vec!["1", "", ""]);
    }
}

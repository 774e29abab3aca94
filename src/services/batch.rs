use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::AppConfig;
use crate::core::hash::{self, Digest, DuplicatePair, HashError, HashIndex};
use crate::core::metadata::{FileRecord, Metadata, MetadataNormalizer};
use crate::core::report::{Report, ReportAssembler};
use crate::core::similarity::{SimilarityEngine, SimilarityResult};
use crate::core::weights::{CustomWeights, WeightParseError, WeightingSystem, Weights};
use crate::services::extractor::{self, ExtractError, MetadataExtractor};
use crate::services::source::{BatchSource, SourceError, SourceFile, SourceService};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Extractor(#[from] ExtractError),

    #[error("invalid custom weights: {0}")]
    Weights(#[from] WeightParseError),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Everything computed for one batch.
#[derive(Debug)]
pub struct Analysis {
    pub records: Vec<FileRecord>,
    pub systems: Vec<WeightingSystem>,
    pub duplicates: BTreeSet<DuplicatePair>,
    pub results: Vec<SimilarityResult>,
    pub report: Report,
    /// Names of files whose metadata could not be extracted.
    pub failed_extractions: Vec<String>,
}

/// Digests only, for the quick duplicate check.
#[derive(Debug)]
pub struct HashSummary {
    pub files: Vec<(String, Digest)>,
    pub duplicates: Vec<(String, String)>,
}

pub struct BatchAnalyzer {
    config: AppConfig,
    extractor: Box<dyn MetadataExtractor>,
    normalizer: MetadataNormalizer,
    show_progress: bool,
}

impl BatchAnalyzer {
    pub fn new(config: AppConfig, extractor: Box<dyn MetadataExtractor>) -> Self {
        let normalizer = config.normalization.normalizer();
        Self {
            config,
            extractor,
            normalizer,
            show_progress: false,
        }
    }

    pub fn from_config(config: AppConfig) -> Result<Self, BatchError> {
        let extractor = extractor::create_extractor(&config.extractor)?;
        log::info!("Using {} metadata extractor", extractor.name());
        Ok(Self::new(config, extractor))
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Requested systems, or the configured default, plus `custom` whenever
    /// custom weights were given.
    pub fn resolve_systems(
        &self,
        requested: &[WeightingSystem],
        custom: &CustomWeights,
    ) -> Vec<WeightingSystem> {
        let mut systems: Vec<WeightingSystem> = Vec::new();
        let base = if requested.is_empty() {
            &self.config.comparison.systems
        } else {
            requested
        };
        for system in base {
            if !systems.contains(system) {
                systems.push(*system);
            }
        }
        if !custom.is_empty() && !systems.contains(&WeightingSystem::Custom) {
            systems.push(WeightingSystem::Custom);
        }
        systems
    }

    /// Parse weights, open the input, and run the full comparison. The
    /// weights are validated before any file is read.
    pub fn analyze(
        &self,
        input: &Path,
        requested: &[WeightingSystem],
        custom_weights: &str,
    ) -> Result<Analysis, BatchError> {
        let custom: CustomWeights = custom_weights.parse()?;
        let source = SourceService::new().open(input)?;
        self.analyze_source(&source, requested, custom)
    }

    pub fn analyze_source(
        &self,
        source: &BatchSource,
        requested: &[WeightingSystem],
        custom: CustomWeights,
    ) -> Result<Analysis, BatchError> {
        let systems = self.resolve_systems(requested, &custom);
        let (records, failed_extractions) = self.load_records(&source.files)?;

        let index = HashIndex::build(records.iter().map(|r| &r.hash));
        let duplicates = index.find_duplicates();

        let engine = SimilarityEngine::new(
            self.normalizer.clone(),
            Weights::new(self.config.weights.key_sets(), custom),
        );
        let start = Instant::now();
        let results = engine.compare_all(&records, &systems);
        log::info!(
            "Computed {} similarity rows in {:.2?}",
            results.len(),
            start.elapsed()
        );

        let report = ReportAssembler::new(self.config.geo.clone()).assemble(
            &records,
            &results,
            &duplicates,
        );

        Ok(Analysis {
            records,
            systems,
            duplicates,
            results,
            report,
            failed_extractions,
        })
    }

    /// Extract and hash every file. Extraction failures leave the file with
    /// empty metadata; hashing failures abort.
    pub fn load_records(
        &self,
        files: &[SourceFile],
    ) -> Result<(Vec<FileRecord>, Vec<String>), BatchError> {
        let progress = self.progress_bar(files.len() as u64);

        let loaded: Vec<(FileRecord, bool)> = files
            .par_iter()
            .map(|file| -> Result<(FileRecord, bool), BatchError> {
                let loaded = self.load_record(file)?;
                progress.inc(1);
                Ok(loaded)
            })
            .collect::<Result<_, _>>()?;

        progress.finish_and_clear();

        let mut records = Vec::with_capacity(loaded.len());
        let mut failed = Vec::new();
        for (record, extraction_failed) in loaded {
            if extraction_failed {
                failed.push(record.name.clone());
            }
            records.push(record);
        }
        Ok((records, failed))
    }

    fn load_record(&self, file: &SourceFile) -> Result<(FileRecord, bool), BatchError> {
        let (raw, failed) = match self.extractor.extract(&file.path) {
            Ok(raw) => (raw, false),
            Err(err) => {
                log::warn!("Metadata extraction failed for {}: {}", file.name, err);
                (Metadata::new(), true)
            }
        };
        let digest = hash::hash_file(&file.path)?;
        let metadata = self.normalizer.normalize(raw);
        Ok((FileRecord::new(file.name.clone(), digest, metadata), failed))
    }

    /// Load a single file of the input by name.
    pub fn inspect(&self, input: &Path, name: &str) -> Result<Option<FileRecord>, BatchError> {
        let source = SourceService::new().open(input)?;
        let Some(file) = source.files.iter().find(|f| f.name == name) else {
            return Ok(None);
        };
        let (record, _) = self.load_record(file)?;
        Ok(Some(record))
    }

    /// Hash every file without extracting metadata.
    pub fn hash_only(&self, input: &Path) -> Result<HashSummary, BatchError> {
        let source = SourceService::new().open(input)?;
        let paths: Vec<&Path> = source.files.iter().map(|f| f.path.as_path()).collect();
        let digests = hash::hash_files_batch(&paths)
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let duplicates = HashIndex::build(&digests)
            .find_duplicates()
            .into_iter()
            .map(|pair| {
                (
                    source.files[pair.first].name.clone(),
                    source.files[pair.second].name.clone(),
                )
            })
            .collect();

        let files = source
            .files
            .iter()
            .map(|f| f.name.clone())
            .zip(digests)
            .collect();
        Ok(HashSummary { files, duplicates })
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} extracting metadata",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }
}

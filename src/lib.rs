pub mod config;
pub mod core;
pub mod services;

pub use config::AppConfig;
pub use core::hash::{Digest, DuplicatePair, HashIndex};
pub use core::metadata::{FileRecord, MetaValue, Metadata, MetadataNormalizer, Scalar};
pub use core::report::{ComparisonRow, GeoRow, Report, ReportAssembler, Table};
pub use core::similarity::{SimilarityEngine, SimilarityResult};
pub use core::weights::{CustomWeights, KeySets, WeightParseError, WeightingSystem, Weights};
pub use services::batch::{BatchAnalyzer, BatchError};

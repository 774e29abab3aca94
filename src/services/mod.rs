pub mod batch;
pub mod export;
pub mod extractor;
pub mod source;

pub use batch::BatchAnalyzer;
pub use export::ExportService;
pub use extractor::{BuiltinExifExtractor, ExifToolExtractor, MetadataExtractor};
pub use source::{BatchSource, SourceService};

use exif::{Field, In, Reader, Tag, Value};
use serde_json::{Map, Value as JsonValue};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::config::{ExtractorConfig, ExtractorKind};
use crate::core::metadata::{MetaValue, Metadata, Scalar};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} is not available")]
    Unavailable { program: String },

    #[error("exiftool failed on {path}: {message}")]
    ToolFailed { path: String, message: String },

    #[error("unexpected exiftool output: {0}")]
    Output(#[from] serde_json::Error),
}

const EXIFTOOL_ERROR_KEY: &str = "ExifTool:Error";

/// Keys naming the temporary extraction directory, identical for every
/// file of a batch.
const TEMPORARY_PATH_KEYS: &[&str] = &["SourceFile", "File:Directory"];

/// Turns a file path into a `Group:Field` → value mapping.
pub trait MetadataExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, path: &Path) -> Result<Metadata, ExtractError>;
}

/// Pick an extractor according to the configuration.
pub fn create_extractor(
    config: &ExtractorConfig,
) -> Result<Box<dyn MetadataExtractor>, ExtractError> {
    let exiftool = ExifToolExtractor::new(config.exiftool_path.clone());
    match config.kind {
        ExtractorKind::Builtin => Ok(Box::new(BuiltinExifExtractor::new())),
        ExtractorKind::Exiftool if exiftool.is_available() => Ok(Box::new(exiftool)),
        ExtractorKind::Exiftool => Err(ExtractError::Unavailable {
            program: config.exiftool_path.display().to_string(),
        }),
        ExtractorKind::Auto if exiftool.is_available() => Ok(Box::new(exiftool)),
        ExtractorKind::Auto => {
            log::info!(
                "{} not found, falling back to the built-in EXIF reader",
                config.exiftool_path.display()
            );
            Ok(Box::new(BuiltinExifExtractor::new()))
        }
    }
}

/// Runs `exiftool -json -G -n` once per file.
pub struct ExifToolExtractor {
    program: PathBuf,
}

impl ExifToolExtractor {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-ver")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

impl MetadataExtractor for ExifToolExtractor {
    fn name(&self) -> &'static str {
        "exiftool"
    }

    fn extract(&self, path: &Path) -> Result<Metadata, ExtractError> {
        let output = Command::new(&self.program)
            .args(["-json", "-G", "-n"])
            .arg(path)
            .output()
            .map_err(|source| ExtractError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tool_failed = |message: String| ExtractError::ToolFailed {
            path: path.display().to_string(),
            message,
        };
        if stdout.trim().is_empty() {
            return Err(tool_failed(stderr.trim().to_string()));
        }

        let metadata = parse_exiftool_json(&stdout)?;
        // Unknown or corrupt files still get a JSON object carrying
        // `ExifTool:Error` and the exit status is non-zero.
        if let Some(error) = metadata.get(EXIFTOOL_ERROR_KEY) {
            return Err(tool_failed(error.to_cell()));
        }
        if !output.status.success() {
            return Err(tool_failed(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(metadata)
    }
}

/// Parse the JSON array printed by exiftool for a single file.
pub fn parse_exiftool_json(text: &str) -> Result<Metadata, ExtractError> {
    let objects: Vec<Map<String, JsonValue>> = serde_json::from_str(text)?;
    let Some(object) = objects.into_iter().next() else {
        return Ok(Metadata::new());
    };

    Ok(object
        .iter()
        .filter(|(key, _)| !TEMPORARY_PATH_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), MetaValue::from_json(value)))
        .collect())
}

/// Reads file-system facts and EXIF fields without any external program.
pub struct BuiltinExifExtractor;

impl BuiltinExifExtractor {
    pub fn new() -> Self {
        Self
    }

    fn file_fields(&self, path: &Path, metadata: &mut Metadata) -> Result<(), ExtractError> {
        let file_metadata = fs::metadata(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        metadata.insert("File:FileName".into(), MetaValue::text(file_name));
        metadata.insert(
            "File:FileSize".into(),
            MetaValue::from(file_metadata.len() as i64),
        );

        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            let ext = ext.to_lowercase();
            let file_type = match ext.as_str() {
                "jpg" | "jpeg" => "JPEG".to_string(),
                "tif" | "tiff" => "TIFF".to_string(),
                other => other.to_uppercase(),
            };
            metadata.insert("File:FileType".into(), MetaValue::text(file_type));
            metadata.insert("File:FileTypeExtension".into(), MetaValue::text(ext));
        }
        Ok(())
    }

    fn exif_fields(&self, path: &Path, metadata: &mut Metadata) -> Result<(), ExtractError> {
        let file = File::open(path)?;
        let mut buf_reader = BufReader::new(file);

        let exif = match Reader::new().read_from_container(&mut buf_reader) {
            Ok(exif) => exif,
            Err(err) => {
                log::debug!("No EXIF data in {}: {}", path.display(), err);
                return Ok(());
            }
        };

        for field in exif.fields().filter(|f| f.ifd_num == In::PRIMARY) {
            metadata.insert(format!("EXIF:{}", field.tag), field_to_value(field));
        }

        for (coord, reference) in [
            (Tag::GPSLatitude, Tag::GPSLatitudeRef),
            (Tag::GPSLongitude, Tag::GPSLongitudeRef),
        ] {
            let Some(field) = exif.get_field(coord, In::PRIMARY) else {
                continue;
            };
            let hemisphere = exif
                .get_field(reference, In::PRIMARY)
                .and_then(|f| ascii_value(&f.value));
            if let Some(degrees) = gps_decimal(&field.value, hemisphere.as_deref()) {
                metadata.insert(format!("EXIF:{}", coord), MetaValue::from(degrees));
            }
        }

        Ok(())
    }
}

impl Default for BuiltinExifExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataExtractor for BuiltinExifExtractor {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn extract(&self, path: &Path) -> Result<Metadata, ExtractError> {
        let mut metadata = Metadata::new();
        self.file_fields(path, &mut metadata)?;
        self.exif_fields(path, &mut metadata)?;
        Ok(metadata)
    }
}

fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(vec) => vec.first().map(|bytes| {
            String::from_utf8_lossy(bytes)
                .trim_end_matches('\0')
                .trim()
                .to_string()
        }),
        _ => None,
    }
}

fn one_or_many<T, F>(items: &[T], convert: F) -> MetaValue
where
    F: Fn(&T) -> Scalar,
{
    match items {
        [] => MetaValue::Missing,
        [single] => MetaValue::Scalar(convert(single)),
        many => MetaValue::Sequence(many.iter().map(convert).collect()),
    }
}

fn field_to_value(field: &Field) -> MetaValue {
    match &field.value {
        Value::Ascii(_) => ascii_value(&field.value)
            .map(MetaValue::text)
            .unwrap_or(MetaValue::Missing),
        Value::Byte(v) => one_or_many(v, |x| Scalar::Integer(i64::from(*x))),
        Value::Short(v) => one_or_many(v, |x| Scalar::Integer(i64::from(*x))),
        Value::Long(v) => one_or_many(v, |x| Scalar::Integer(i64::from(*x))),
        Value::SByte(v) => one_or_many(v, |x| Scalar::Integer(i64::from(*x))),
        Value::SShort(v) => one_or_many(v, |x| Scalar::Integer(i64::from(*x))),
        Value::SLong(v) => one_or_many(v, |x| Scalar::Integer(i64::from(*x))),
        Value::Rational(v) => one_or_many(v, |r| {
            if r.denom == 0 {
                Scalar::Text(format!("{}/{}", r.num, r.denom))
            } else {
                Scalar::Float(r.to_f64())
            }
        }),
        Value::SRational(v) => one_or_many(v, |r| {
            if r.denom == 0 {
                Scalar::Text(format!("{}/{}", r.num, r.denom))
            } else {
                Scalar::Float(r.to_f64())
            }
        }),
        Value::Float(v) => one_or_many(v, |x| Scalar::Float(f64::from(*x))),
        Value::Double(v) => one_or_many(v, |x| Scalar::Float(*x)),
        _ => MetaValue::text(field.display_value().to_string()),
    }
}

/// Degrees/minutes/seconds rationals to signed decimal degrees.
fn gps_decimal(value: &Value, hemisphere: Option<&str>) -> Option<f64> {
    let Value::Rational(parts) = value else {
        return None;
    };
    if parts.is_empty() || parts.iter().any(|r| r.denom == 0) {
        return None;
    }

    let magnitude = parts
        .iter()
        .take(3)
        .zip([1.0, 60.0, 3600.0])
        .map(|(r, divisor)| r.to_f64() / divisor)
        .sum::<f64>();

    match hemisphere {
        Some(h) if h.eq_ignore_ascii_case("S") || h.eq_ignore_ascii_case("W") => Some(-magnitude),
        _ => Some(magnitude),
    }
}

use serde::{Deserialize, Serialize};

use crate::core::metadata::{FileRecord, MetaValue, Metadata, Scalar};

pub const DEFAULT_LATITUDE_KEY: &str = "EXIF:GPSLatitude";
pub const DEFAULT_LONGITUDE_KEY: &str = "EXIF:GPSLongitude";
pub const DEFAULT_LATITUDE_REF_KEY: &str = "EXIF:GPSLatitudeRef";
pub const DEFAULT_LONGITUDE_REF_KEY: &str = "EXIF:GPSLongitudeRef";
pub const DEFAULT_DESCRIPTION_FIELDS: &[&str] = &[
    "File:FileName",
    "File:FileType",
    "EXIF:Make",
    "EXIF:Model",
    "EXIF:Artist",
];

const NOT_AVAILABLE: &str = "N/A";

/// Which metadata keys carry coordinates and which describe a point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub latitude_key: String,
    pub longitude_key: String,
    /// Hemisphere keys; `S` or `W` makes the coordinate negative.
    pub latitude_ref_key: String,
    pub longitude_ref_key: String,
    pub description_fields: Vec<String>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            latitude_key: DEFAULT_LATITUDE_KEY.to_string(),
            longitude_key: DEFAULT_LONGITUDE_KEY.to_string(),
            latitude_ref_key: DEFAULT_LATITUDE_REF_KEY.to_string(),
            longitude_ref_key: DEFAULT_LONGITUDE_REF_KEY.to_string(),
            description_fields: DEFAULT_DESCRIPTION_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoPoint {
    pub file: String,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    pub metadata: Metadata,
}

impl GeoPoint {
    /// Build a point when both coordinates are present and in range.
    pub fn from_record(record: &FileRecord, config: &GeoConfig) -> Option<Self> {
        let latitude = with_hemisphere(
            coordinate(record.get(&config.latitude_key)?)?,
            record.get(&config.latitude_ref_key),
        );
        let longitude = with_hemisphere(
            coordinate(record.get(&config.longitude_key)?)?,
            record.get(&config.longitude_ref_key),
        );
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            log::debug!(
                "Ignoring out-of-range coordinates ({}, {}) for {}",
                latitude,
                longitude,
                record.name
            );
            return None;
        }

        Some(Self {
            file: record.name.clone(),
            latitude,
            longitude,
            description: describe(&record.metadata, &config.description_fields),
            metadata: record.metadata.clone(),
        })
    }
}

/// `exiftool -n` reports unsigned magnitudes and keeps the sign in the
/// reference tag.
fn with_hemisphere(degrees: f64, reference: Option<&MetaValue>) -> f64 {
    match reference.and_then(MetaValue::as_scalar) {
        Some(Scalar::Text(text))
            if text
                .trim()
                .chars()
                .next()
                .is_some_and(|c| matches!(c.to_ascii_uppercase(), 'S' | 'W')) =>
        {
            -degrees.abs()
        }
        _ => degrees,
    }
}

/// One `field: value` line per description field, `N/A` where absent.
pub fn describe(metadata: &Metadata, fields: &[String]) -> String {
    fields
        .iter()
        .map(|field| {
            let value = metadata
                .get(field)
                .filter(|v| !v.is_absent())
                .map(MetaValue::to_cell)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string());
            format!("{}: {}", field, value)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decimal degrees from a numeric value or a text such as `52.5`,
/// `52 deg 30' 0.00" N` or `13 30 0 W`.
pub fn coordinate(value: &MetaValue) -> Option<f64> {
    let scalar = match value {
        MetaValue::Scalar(s) => s,
        MetaValue::Sequence(items) if items.len() == 1 => &items[0],
        _ => return None,
    };

    let degrees = match scalar {
        Scalar::Text(text) => parse_coordinate_text(text)?,
        other => other.as_f64()?,
    };
    degrees.is_finite().then_some(degrees)
}

fn parse_coordinate_text(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = text.parse::<f64>() {
        return Some(value);
    }

    let negative = text.starts_with('-')
        || text
            .chars()
            .last()
            .is_some_and(|c| matches!(c.to_ascii_uppercase(), 'S' | 'W'));

    let parts: Vec<f64> = text
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter(|p| !p.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .ok()?;

    let magnitude = match parts.as_slice() {
        [d] => *d,
        [d, m] => d + m / 60.0,
        [d, m, s] => d + m / 60.0 + s / 3600.0,
        _ => return None,
    };

    Some(if negative { -magnitude } else { magnitude })
}

/// Bounding box of all points, used to fit a map view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoBounds {
    pub min_latitude: f64,
    pub min_longitude: f64,
    pub max_latitude: f64,
    pub max_longitude: f64,
}

impl GeoBounds {
    pub fn of(points: &[GeoPoint]) -> Option<Self> {
        let first = points.first()?;
        let init = GeoBounds {
            min_latitude: first.latitude,
            min_longitude: first.longitude,
            max_latitude: first.latitude,
            max_longitude: first.longitude,
        };
        Some(points.iter().skip(1).fold(init, |b, p| GeoBounds {
            min_latitude: b.min_latitude.min(p.latitude),
            min_longitude: b.min_longitude.min(p.longitude),
            max_latitude: b.max_latitude.max(p.latitude),
            max_longitude: b.max_longitude.max(p.longitude),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::hash_bytes;

    fn record(entries: &[(&str, MetaValue)]) -> FileRecord {
        let metadata = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        FileRecord::new("photo.jpg", hash_bytes(b"photo"), metadata)
    }

    #[test]
    fn test_point_from_numeric_coordinates() {
        let rec = record(&[
            ("EXIF:GPSLatitude", 10i64.into()),
            ("EXIF:GPSLongitude", 20i64.into()),
            ("EXIF:Make", "Canon".into()),
        ]);

        let point = GeoPoint::from_record(&rec, &GeoConfig::default()).unwrap();
        assert_eq!(point.latitude, 10.0);
        assert_eq!(point.longitude, 20.0);
        assert_eq!(point.file, "photo.jpg");
        assert!(point.description.contains("EXIF:Make: Canon"));
        assert!(point.description.contains("EXIF:Model: N/A"));
    }

    #[test]
    fn test_missing_coordinates_are_excluded() {
        let config = GeoConfig::default();
        assert!(GeoPoint::from_record(&record(&[]), &config).is_none());
        assert!(
            GeoPoint::from_record(&record(&[("EXIF:GPSLatitude", 10i64.into())]), &config)
                .is_none()
        );
        let nulls = record(&[
            ("EXIF:GPSLatitude", MetaValue::Missing),
            ("EXIF:GPSLongitude", 20i64.into()),
        ]);
        assert!(GeoPoint::from_record(&nulls, &config).is_none());
    }

    #[test]
    fn test_hemisphere_reference_sets_sign() {
        let rec = record(&[
            ("EXIF:GPSLatitude", 33.8688f64.into()),
            ("EXIF:GPSLatitudeRef", "S".into()),
            ("EXIF:GPSLongitude", 151.2093f64.into()),
            ("EXIF:GPSLongitudeRef", "E".into()),
        ]);
        let point = GeoPoint::from_record(&rec, &GeoConfig::default()).unwrap();
        assert_eq!(point.latitude, -33.8688);
        assert_eq!(point.longitude, 151.2093);

        // Already signed values are not flipped back.
        let rec = record(&[
            ("EXIF:GPSLatitude", 40.0f64.into()),
            ("EXIF:GPSLongitude", (-74.0f64).into()),
            ("EXIF:GPSLongitudeRef", "West".into()),
        ]);
        let point = GeoPoint::from_record(&rec, &GeoConfig::default()).unwrap();
        assert_eq!(point.longitude, -74.0);
    }

    #[test]
    fn test_out_of_range_is_excluded() {
        let rec = record(&[
            ("EXIF:GPSLatitude", 95.0f64.into()),
            ("EXIF:GPSLongitude", 20.0f64.into()),
        ]);
        assert!(GeoPoint::from_record(&rec, &GeoConfig::default()).is_none());
    }

    #[test]
    fn test_parse_coordinate_text() {
        assert_eq!(parse_coordinate_text("52.5"), Some(52.5));
        assert_eq!(parse_coordinate_text("-13.25"), Some(-13.25));
        assert_eq!(parse_coordinate_text("52 deg 30' 0.00\" N"), Some(52.5));
        assert_eq!(parse_coordinate_text("13 deg 15' 0.00\" W"), Some(-13.25));
        assert_eq!(parse_coordinate_text("north"), None);
        assert_eq!(parse_coordinate_text(""), None);
    }

    #[test]
    fn test_bounds() {
        let config = GeoConfig::default();
        let points: Vec<_> = [(10.0, 20.0), (-5.0, 40.0), (3.0, -7.5)]
            .into_iter()
            .filter_map(|(lat, lon)| {
                let rec = record(&[
                    ("EXIF:GPSLatitude", MetaValue::from(lat)),
                    ("EXIF:GPSLongitude", MetaValue::from(lon)),
                ]);
                GeoPoint::from_record(&rec, &config)
            })
            .collect();

        let bounds = GeoBounds::of(&points).unwrap();
        assert_eq!(bounds.min_latitude, -5.0);
        assert_eq!(bounds.max_latitude, 10.0);
        assert_eq!(bounds.min_longitude, -7.5);
        assert_eq!(bounds.max_longitude, 40.0);
        assert!(GeoBounds::of(&[]).is_none());
    }
}

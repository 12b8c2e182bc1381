use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PointpackError;

static EPSG_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:epsg\s*:\s*)?(\d+)$").expect("static EPSG pattern compiles")
});

pub const WGS84_CODE: u32 = 4326;

/// A coordinate reference system identified by its registry (EPSG) code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpatialReference(u32);

impl SpatialReference {
    pub const WGS84: SpatialReference = SpatialReference(WGS84_CODE);

    pub fn code(self) -> u32 {
        self.0
    }

    pub fn label(self) -> Option<&'static str> {
        match self.0 {
            4326 => Some("WGS 84"),
            3857 => Some("WGS 84 / Pseudo-Mercator"),
            3376 => Some("GDM2000 / East Malaysia BRSO"),
            3380 => Some("GDM2000 / Selangor Grid"),
            _ => None,
        }
    }
}

impl Default for SpatialReference {
    fn default() -> Self {
        Self::WGS84
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for SpatialReference {
    type Err = PointpackError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let code = EPSG_CODE
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .and_then(|digits| digits.as_str().parse::<u32>().ok())
            .filter(|code| *code > 0)
            .ok_or_else(|| PointpackError::InvalidCrs(value.to_string()))?;
        Ok(Self(code))
    }
}

/// What to do when the CRS input is blank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CrsPolicy {
    #[default]
    DefaultWgs84,
    RequireExplicit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub latitude: String,
    pub longitude: String,
}

impl ColumnSelection {
    pub fn new(latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        Self {
            latitude: latitude.into(),
            longitude: longitude.into(),
        }
    }
}

impl Default for ColumnSelection {
    fn default() -> Self {
        Self::new("lat", "lon")
    }
}

/// Output stem shared by every file written for one source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseName(String);

impl BaseName {
    /// Derives the stem from a source file name: directories and the final
    /// extension are dropped (a trailing `.gz` is peeled off first), unsafe
    /// characters become `_`, and the result is cut to `max_len` characters.
    pub fn from_source_name(
        source_name: &str,
        max_len: Option<usize>,
    ) -> Result<Self, PointpackError> {
        let file_name = source_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(source_name);
        let without_gz = strip_extension_ci(file_name, "gz").unwrap_or(file_name);
        let stem = match without_gz.rfind('.') {
            Some(idx) => &without_gz[..idx],
            None => without_gz,
        };

        let mut sanitized: String = stem
            .chars()
            .map(|ch| {
                if ch.is_control() || ch.is_whitespace() || matches!(ch, '/' | '\\' | ':') {
                    '_'
                } else {
                    ch
                }
            })
            .collect();
        sanitized = sanitized.trim_start_matches('.').to_string();
        if let Some(max_len) = max_len {
            sanitized = sanitized.chars().take(max_len).collect();
        }

        if sanitized.is_empty() {
            return Err(PointpackError::InvalidSourceName(source_name.to_string()));
        }
        Ok(Self(sanitized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key used for collision checks; case-folded so outputs stay distinct on
    /// case-insensitive filesystems.
    pub fn collision_key(&self) -> String {
        self.0.to_lowercase()
    }

    /// True when `file_name` is `<base>.<ext>` with a single extension.
    pub fn owns_file(&self, file_name: &str) -> bool {
        file_name
            .strip_prefix(self.0.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .map(|ext| !ext.is_empty() && !ext.contains('.'))
            .unwrap_or(false)
    }
}

impl fmt::Display for BaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn strip_extension_ci<'a>(name: &'a str, ext: &str) -> Option<&'a str> {
    let idx = name.rfind('.')?;
    (idx > 0 && name[idx + 1..].eq_ignore_ascii_case(ext)).then(|| &name[..idx])
}

/// Identity of one conversion run; names its scratch directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = PointpackError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !is_valid {
            return Err(PointpackError::WorkspaceIo(format!(
                "invalid run id: {value:?}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_spatial_reference_forms() {
        let plain: SpatialReference = "4326".parse().unwrap();
        assert_eq!(plain.code(), 4326);
        let prefixed: SpatialReference = " epsg:3857 ".parse().unwrap();
        assert_eq!(prefixed.code(), 3857);
        assert_eq!(prefixed.to_string(), "EPSG:3857");
    }

    #[test]
    fn parse_spatial_reference_invalid() {
        assert_matches!(
            "0".parse::<SpatialReference>(),
            Err(PointpackError::InvalidCrs(_))
        );
        assert_matches!(
            "-4326".parse::<SpatialReference>(),
            Err(PointpackError::InvalidCrs(_))
        );
        assert_matches!(
            "WGS84".parse::<SpatialReference>(),
            Err(PointpackError::InvalidCrs(_))
        );
        assert_matches!(
            "99999999999".parse::<SpatialReference>(),
            Err(PointpackError::InvalidCrs(_))
        );
    }

    #[test]
    fn base_name_strips_extensions() {
        let name = BaseName::from_source_name("data/sites.csv", None).unwrap();
        assert_eq!(name.as_str(), "sites");
        let gz = BaseName::from_source_name("wells.CSV.GZ", None).unwrap();
        assert_eq!(gz.as_str(), "wells");
        let spaced = BaseName::from_source_name("field survey.csv", None).unwrap();
        assert_eq!(spaced.as_str(), "field_survey");
    }

    #[test]
    fn base_name_truncates() {
        let name = BaseName::from_source_name("sites_backup.csv", Some(5)).unwrap();
        assert_eq!(name.as_str(), "sites");
    }

    #[test]
    fn base_name_rejects_empty() {
        assert_matches!(
            BaseName::from_source_name(".csv", None),
            Err(PointpackError::InvalidSourceName(_))
        );
    }

    #[test]
    fn owns_file_matches_exact_stem() {
        let name = BaseName::from_source_name("sites.csv", None).unwrap();
        assert!(name.owns_file("sites.shp"));
        assert!(name.owns_file("sites.dbf"));
        assert!(!name.owns_file("sites_2.shp"));
        assert!(!name.owns_file("sites"));
        assert!(!name.owns_file("sites.shp.xml"));
    }
}

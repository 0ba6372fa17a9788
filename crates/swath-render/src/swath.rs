//! Swath filename parsing.
//!
//! Swath files follow `<dir>/<platform>-<instrument>-<start>-<end>.nc` where
//! both timestamps are `YYYYmmddHHMMSS`. Passes of several instruments on the
//! same platform and acquisition window share a directory and are processed
//! together.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use tracing::debug;

use crate::error::{RenderError, RenderResult};

/// Directory layout of the polar swath archive.
pub const ARCHIVE_PREFIX_PATTERN: &str = r".*satellite-thredds/polar-swath/\d{4}/\d{2}/\d{2}/";

/// Accepts any directory, or none.
pub const ANY_PREFIX_PATTERN: &str = r"(?:.*/)?";

const PLATFORMS: &str = "metopa|metopb|metopc|noaa18|noaa19|noaa20|npp|aqua|terra|fy3d";
const INSTRUMENTS: &str = "avhrr|viirs-mband|viirs-dnb|modis-1km|mersi2-1k";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Compiled swath filename pattern.
#[derive(Debug, Clone)]
pub struct SwathPattern {
    regex: Regex,
}

impl SwathPattern {
    /// Build a pattern accepting `prefix` in front of the filename.
    pub fn new(prefix: &str) -> RenderResult<Self> {
        let regex = Regex::new(&format!(
            r"^({prefix})({PLATFORMS})-({INSTRUMENTS})-(\d{{14}})-(\d{{14}})\.nc$"
        ))?;
        Ok(Self { regex })
    }

    /// Parse a swath path.
    pub fn parse(&self, path: &str) -> RenderResult<SwathFile> {
        let invalid = || RenderError::InvalidFilename(path.to_string());
        let caps = self.regex.captures(path).ok_or_else(invalid)?;

        let start = caps[4].to_string();
        let end = caps[5].to_string();
        let start_time = NaiveDateTime::parse_from_str(&start, TIMESTAMP_FORMAT)
            .map_err(|_| invalid())?;
        NaiveDateTime::parse_from_str(&end, TIMESTAMP_FORMAT).map_err(|_| invalid())?;

        Ok(SwathFile {
            path: PathBuf::from(path),
            directory: caps[1].to_string(),
            platform: caps[2].to_string(),
            instrument: caps[3].to_string(),
            start,
            end,
            start_time: Utc.from_utc_datetime(&start_time),
        })
    }
}

/// A parsed swath file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwathFile {
    pub path: PathBuf,
    /// Directory part including the trailing slash, empty for bare filenames
    pub directory: String,
    pub platform: String,
    pub instrument: String,
    /// Raw start timestamp as found in the filename
    pub start: String,
    /// Raw end timestamp as found in the filename
    pub end: String,
    pub start_time: DateTime<Utc>,
}

impl SwathFile {
    /// Whether `name` is a swath of the same platform and acquisition window.
    fn is_sibling_name(&self, name: &str) -> bool {
        let prefix = format!("{}-", self.platform);
        let suffix = format!("-{}-{}.nc", self.start, self.end);
        name.len() >= prefix.len() + suffix.len()
            && name.starts_with(&prefix)
            && name.ends_with(&suffix)
    }

    fn directory_path(&self) -> &Path {
        if self.directory.is_empty() {
            Path::new(".")
        } else {
            Path::new(&self.directory)
        }
    }

    /// All swath files of this pass, sorted, including this one.
    pub async fn similar_files(&self) -> RenderResult<Vec<PathBuf>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Err(RenderError::FileNotFound(self.path.clone()));
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(self.directory_path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if self.is_sibling_name(name) {
                files.push(PathBuf::from(format!("{}{}", self.directory, name)));
            }
        }

        if !files.contains(&self.path) {
            files.push(self.path.clone());
        }
        files.sort();
        debug!("Found {} swath files for {}", files.len(), self.path.display());
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARCHIVED: &str = "/lustre/storeB/immutable/archive/projects/remotesensing/satellite-thredds/polar-swath/2023/01/13/noaa19-avhrr-20230113072221-20230113073600.nc";

    #[test]
    fn test_parse_archive_path() {
        let swath = SwathPattern::new(ARCHIVE_PREFIX_PATTERN)
            .unwrap()
            .parse(ARCHIVED)
            .unwrap();
        assert_eq!(swath.platform, "noaa19");
        assert_eq!(swath.instrument, "avhrr");
        assert_eq!(swath.start, "20230113072221");
        assert_eq!(swath.end, "20230113073600");
        assert!(swath.directory.ends_with("polar-swath/2023/01/13/"));
        assert_eq!(
            swath.start_time.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "2023-01-13T07:22:21"
        );
    }

    #[test]
    fn test_parse_rejects_outside_archive() {
        let err = SwathPattern::new(ARCHIVE_PREFIX_PATTERN)
            .unwrap()
            .parse("/tmp/noaa19-avhrr-20230113072221-20230113073600.nc")
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidFilename(_)));
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        let pattern = SwathPattern::new(ANY_PREFIX_PATTERN).unwrap();
        for name in [
            "garbage.nc",
            "noaa19-avhrr-20230113072221.nc",
            "sentinel1-avhrr-20230113072221-20230113073600.nc",
            "noaa19-avhrr-20230113072221-20230113073600.tif",
            "noaa19-avhrr-20231313072221-20230113073600.nc",
        ] {
            assert!(
                matches!(pattern.parse(name), Err(RenderError::InvalidFilename(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_relaxed_prefix() {
        let pattern = SwathPattern::new(ANY_PREFIX_PATTERN).unwrap();
        let bare = pattern.parse("npp-viirs-dnb-20230113072221-20230113073600.nc").unwrap();
        assert_eq!(bare.directory, "");
        assert_eq!(bare.instrument, "viirs-dnb");

        let nested = pattern
            .parse("/data/swaths/metopb-avhrr-20230113072221-20230113073600.nc")
            .unwrap();
        assert_eq!(nested.directory, "/data/swaths/");
    }

    #[tokio::test]
    async fn test_similar_files() {
        let dir = tempfile::tempdir().unwrap();
        let window = "20230113072221-20230113073600";
        for name in [
            format!("npp-viirs-mband-{window}.nc"),
            format!("npp-viirs-dnb-{window}.nc"),
            format!("noaa20-viirs-dnb-{window}.nc"),
            "npp-viirs-dnb-20230113080000-20230113081000.nc".to_string(),
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let requested = format!("{}/npp-viirs-dnb-{window}.nc", dir.path().display());
        let swath = SwathPattern::new(ANY_PREFIX_PATTERN)
            .unwrap()
            .parse(&requested)
            .unwrap();
        let files = swath.similar_files().await.unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                format!("npp-viirs-dnb-{window}.nc"),
                format!("npp-viirs-mband-{window}.nc"),
            ]
        );
        assert!(files.contains(&swath.path));
    }

    #[tokio::test]
    async fn test_similar_files_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let requested = format!(
            "{}/noaa19-avhrr-20230113072221-20230113073600.nc",
            dir.path().display()
        );
        let swath = SwathPattern::new(ANY_PREFIX_PATTERN)
            .unwrap()
            .parse(&requested)
            .unwrap();
        assert!(matches!(
            swath.similar_files().await.unwrap_err(),
            RenderError::FileNotFound(_)
        ));
    }
}

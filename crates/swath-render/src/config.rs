//! Rendering configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::swath::ARCHIVE_PREFIX_PATTERN;

/// Configuration of the external tools and the work directory.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Directory receiving rasters and mapfiles
    pub work_dir: PathBuf,
    /// Satellite toolkit command producing GeoTIFFs
    pub raster_cmd: String,
    /// Raster metadata command
    pub gdalinfo_cmd: String,
    /// MapServer CGI executable
    pub mapserv_cmd: String,
    /// Directory prefix accepted in front of swath filenames (regex)
    pub swath_prefix_pattern: String,
    /// Base of the `wms_onlineresource` metadata; the swath path is appended
    pub online_resource_base: String,
    /// Upper bound for a single tool invocation
    pub command_timeout: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            raster_cmd: "satpy-geotiff".to_string(),
            gdalinfo_cmd: "gdalinfo".to_string(),
            mapserv_cmd: "mapserv".to_string(),
            swath_prefix_pattern: ARCHIVE_PREFIX_PATTERN.to_string(),
            online_resource_base: "http://localhost:8000/api/get_quicklook/".to_string(),
            command_timeout: Duration::from_secs(1800),
        }
    }
}

impl RenderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("SWATH_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            raster_cmd: std::env::var("SWATH_RASTER_CMD").unwrap_or(defaults.raster_cmd),
            gdalinfo_cmd: std::env::var("GDALINFO_CMD").unwrap_or(defaults.gdalinfo_cmd),
            mapserv_cmd: std::env::var("MAPSERV_CMD").unwrap_or(defaults.mapserv_cmd),
            swath_prefix_pattern: std::env::var("SWATH_PREFIX_PATTERN")
                .unwrap_or(defaults.swath_prefix_pattern),
            online_resource_base: std::env::var("WMS_ONLINE_RESOURCE")
                .unwrap_or(defaults.online_resource_base),
            command_timeout: std::env::var("SWATH_COMMAND_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.command_timeout),
        }
    }
}

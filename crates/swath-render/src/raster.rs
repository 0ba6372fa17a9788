//! Raster product generation.
//!
//! The satellite toolkit is driven as a CLI: it reads the swath files,
//! resamples them onto an oblique mercator area fitted to the pass and writes
//! one GeoTIFF per requested product. Georeferencing of the result is read
//! back with `gdalinfo`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use scopeguard::ScopeGuard;
use tracing::{debug, info, warn};

use crate::command::ToolCommand;
use crate::config::RenderConfig;
use crate::error::{RenderError, RenderResult};
use crate::lock::KeyedLock;

/// One product to write for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRequest {
    pub product: String,
    pub output: PathBuf,
}

impl ProductRequest {
    /// `<work_dir>/<product>-<YYYYmmddHHMMSS>.tif`
    pub fn for_pass(product: &str, start_time: DateTime<Utc>, work_dir: &Path) -> Self {
        Self {
            product: product.to_string(),
            output: work_dir.join(format!("{}-{}.tif", product, start_time.format("%Y%m%d%H%M%S"))),
        }
    }
}

/// Extent of a raster in its own projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub ll_x: f64,
    pub ll_y: f64,
    pub ur_x: f64,
    pub ur_y: f64,
}

impl Bounds {
    /// Value of the `wms_extent` layer metadata.
    pub fn wms_extent(&self) -> String {
        format!("{} {} {} {}", self.ll_x, self.ll_y, self.ur_x, self.ur_y)
    }
}

/// Georeferencing of a generated raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    pub path: PathBuf,
    pub proj4: String,
    pub bounds: Bounds,
}

/// Satellite data toolkit.
#[async_trait]
pub trait RasterToolkit: Send + Sync {
    /// Write every requested product from the given swath files.
    async fn generate(&self, sources: &[PathBuf], products: &[ProductRequest]) -> RenderResult<()>;

    /// Read projection and extent of a raster.
    async fn describe(&self, raster: &Path) -> RenderResult<RasterInfo>;
}

/// Generate the products whose output file does not exist yet.
///
/// Output files are locked for the whole check-and-generate sequence so two
/// tasks never write the same file. Outputs of a failed or abandoned run are
/// removed, so a partial file is never reused.
pub async fn ensure_products(
    toolkit: &dyn RasterToolkit,
    locks: &KeyedLock<PathBuf>,
    sources: &[PathBuf],
    products: &[ProductRequest],
) -> RenderResult<()> {
    let mut outputs: Vec<&PathBuf> = products.iter().map(|p| &p.output).collect();
    outputs.sort();
    outputs.dedup();

    // Always acquired in path order
    let mut guards = Vec::with_capacity(outputs.len());
    for output in outputs {
        guards.push(locks.lock(output).await);
    }

    let mut missing = Vec::new();
    for request in products {
        if tokio::fs::try_exists(&request.output).await? {
            debug!("Reusing {}", request.output.display());
        } else {
            missing.push(request.clone());
        }
    }

    if missing.is_empty() {
        info!("No products need to be generated");
        return Ok(());
    }

    let names: Vec<&str> = missing.iter().map(|p| p.product.as_str()).collect();
    info!("Generating products: {}", names.join(", "));

    let partial: Vec<PathBuf> = missing.iter().map(|p| p.output.clone()).collect();
    let cleanup = scopeguard::guard(partial, |paths| remove_partial(&paths));

    toolkit.generate(sources, &missing).await?;

    for request in &missing {
        if !tokio::fs::try_exists(&request.output).await? {
            return Err(RenderError::MissingOutput(request.output.clone()));
        }
    }

    ScopeGuard::into_inner(cleanup);
    Ok(())
}

fn remove_partial(paths: &[PathBuf]) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => warn!("Removed partial output {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
        }
    }
}

/// Toolkit driven through the `satpy-geotiff` and `gdalinfo` commands.
#[derive(Debug, Clone)]
pub struct SatpyToolkit {
    raster_cmd: String,
    gdalinfo_cmd: String,
    timeout: Duration,
}

impl SatpyToolkit {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            raster_cmd: config.raster_cmd.clone(),
            gdalinfo_cmd: config.gdalinfo_cmd.clone(),
            timeout: config.command_timeout,
        }
    }

    /// Build the generation command.
    pub fn generate_command(&self, sources: &[PathBuf], products: &[ProductRequest]) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.raster_cmd)
            .args(["--reader", "satpy_cf_nc"])
            .args(["--projection", "omerc", "--ellps", "WGS84", "--resolution", "7500"])
            .timeout(self.timeout);
        for request in products {
            cmd = cmd
                .args(["--product", request.product.as_str()])
                .arg("--output")
                .path_arg(&request.output);
        }
        for source in sources {
            cmd = cmd.path_arg(source);
        }
        cmd
    }
}

#[async_trait]
impl RasterToolkit for SatpyToolkit {
    async fn generate(&self, sources: &[PathBuf], products: &[ProductRequest]) -> RenderResult<()> {
        self.generate_command(sources, products).run().await?;
        Ok(())
    }

    async fn describe(&self, raster: &Path) -> RenderResult<RasterInfo> {
        let output = ToolCommand::new(&self.gdalinfo_cmd)
            .args(["-json", "-proj4"])
            .path_arg(raster)
            .timeout(self.timeout)
            .run()
            .await?;
        parse_gdalinfo(raster, &output.stdout)
    }
}

/// `gdalinfo -json -proj4` output, reduced to what layers need.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GdalInfo {
    coordinate_system: Option<GdalCoordinateSystem>,
    corner_coordinates: Option<GdalCorners>,
}

#[derive(Debug, Deserialize)]
struct GdalCoordinateSystem {
    proj4: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GdalCorners {
    lower_left: [f64; 2],
    upper_right: [f64; 2],
}

/// Extract projection and bounds from `gdalinfo` JSON.
pub fn parse_gdalinfo(path: &Path, json: &[u8]) -> RenderResult<RasterInfo> {
    let info: GdalInfo = serde_json::from_slice(json)?;

    let proj4 = info
        .coordinate_system
        .and_then(|cs| cs.proj4)
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            RenderError::invalid_output(format!("{} has no proj4 definition", path.display()))
        })?;

    let corners = info.corner_coordinates.ok_or_else(|| {
        RenderError::invalid_output(format!("{} has no corner coordinates", path.display()))
    })?;

    Ok(RasterInfo {
        path: path.to_path_buf(),
        proj4,
        bounds: Bounds {
            ll_x: corners.lower_left[0],
            ll_y: corners.lower_left[1],
            ur_x: corners.upper_right[0],
            ur_y: corners.upper_right[1],
        },
    })
}

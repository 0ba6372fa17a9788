//! External collaborators of the swath process.
//!
//! This crate provides:
//! - Swath filename parsing and sibling file lookup
//! - Raster product generation through the satellite toolkit CLI
//! - Mapfile generation for the produced rasters
//! - WMS GetMap rendering through the `mapserv` CGI executable

pub mod command;
pub mod config;
pub mod error;
pub mod lock;
pub mod mapfile;
pub mod mapserver;
pub mod raster;
pub mod swath;
pub mod wms;

pub use command::{ToolCommand, ToolOutput};
pub use config::RenderConfig;
pub use error::{RenderError, RenderResult};
pub use lock::KeyedLock;
pub use mapfile::{MapFile, MapLayer};
pub use mapserver::{parse_cgi_response, MapRenderer, MapservRenderer, RenderedMap};
pub use raster::{
    ensure_products, parse_gdalinfo, Bounds, ProductRequest, RasterInfo, RasterToolkit, SatpyToolkit,
};
pub use swath::{SwathFile, SwathPattern, ARCHIVE_PREFIX_PATTERN, ANY_PREFIX_PATTERN};
pub use wms::GetMapRequest;

//! MapServer mapfile generation.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::RenderResult;
use crate::raster::RasterInfo;

const WMS_TITLE: &str = "WMS senda fastapi localhost";
const WMS_SRS: &str = "EPSG:25833 EPSG:3978 EPSG:4326 EPSG:4269 EPSG:3857";
const MAP_SIZE: u32 = 10000;

/// A raster layer of the map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapLayer {
    pub name: String,
    pub data: PathBuf,
    /// proj4 definition of the raster
    pub projection: String,
    pub metadata: Vec<(String, String)>,
}

impl MapLayer {
    /// Layer serving one product raster at the pass start time.
    pub fn raster(product: &str, info: &RasterInfo, start_time: DateTime<Utc>) -> Self {
        let time = start_time.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        Self {
            name: product.to_string(),
            data: info.path.clone(),
            projection: info.proj4.clone(),
            metadata: vec![
                ("wms_title".to_string(), product.to_string()),
                ("wms_extent".to_string(), info.bounds.wms_extent()),
                ("wms_timeextent".to_string(), format!("{time}/{time}")),
                ("wms_default".to_string(), time),
            ],
        }
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// In-memory mapfile.
#[derive(Debug, Clone, PartialEq)]
pub struct MapFile {
    pub name: String,
    pub size: (u32, u32),
    pub units: String,
    pub projection: String,
    pub web_metadata: Vec<(String, String)>,
    pub layers: Vec<MapLayer>,
}

impl MapFile {
    /// Map with the web metadata for a swath source.
    pub fn for_swath(source: &str, online_resource_base: &str) -> Self {
        Self {
            name: "satpy-products".to_string(),
            size: (MAP_SIZE, MAP_SIZE),
            units: "DD".to_string(),
            projection: "AUTO".to_string(),
            web_metadata: vec![
                ("wms_title".to_string(), WMS_TITLE.to_string()),
                (
                    "wms_onlineresource".to_string(),
                    format!("{online_resource_base}{source}"),
                ),
                ("wms_srs".to_string(), WMS_SRS.to_string()),
                ("wms_enable_request".to_string(), "*".to_string()),
            ],
            layers: Vec::new(),
        }
    }

    /// `satpy-products-<YYYYmmddHHMMSS>.map`
    pub fn filename(start_time: DateTime<Utc>) -> String {
        format!("satpy-products-{}.map", start_time.format("%Y%m%d%H%M%S"))
    }

    /// Append a layer and return its index.
    pub fn insert_layer(&mut self, layer: MapLayer) -> usize {
        self.layers.push(layer);
        self.layers.len() - 1
    }

    pub fn web_metadata(&self, key: &str) -> Option<&str> {
        self.web_metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Mapfile text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "MAP")?;
        writeln!(out, "  NAME {}", quote(&self.name))?;
        writeln!(out, "  SIZE {} {}", self.size.0, self.size.1)?;
        writeln!(out, "  UNITS {}", self.units)?;
        write_projection(out, "  ", &self.projection)?;
        writeln!(out, "  WEB")?;
        write_metadata(out, "    ", &self.web_metadata)?;
        writeln!(out, "  END")?;

        for layer in &self.layers {
            writeln!(out, "  LAYER")?;
            writeln!(out, "    NAME {}", quote(&layer.name))?;
            writeln!(out, "    TYPE RASTER")?;
            writeln!(out, "    STATUS ON")?;
            writeln!(out, "    DATA {}", quote(&layer.data.to_string_lossy()))?;
            write_projection(out, "    ", &layer.projection)?;
            write_metadata(out, "    ", &layer.metadata)?;
            writeln!(out, "  END")?;
        }

        writeln!(out, "END")
    }

    /// Write the mapfile to `path`.
    pub async fn save(&self, path: &Path) -> RenderResult<()> {
        tokio::fs::write(path, self.render()).await?;
        Ok(())
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `AUTO` stays a single token; proj4 definitions become one entry per parameter.
fn write_projection(out: &mut String, indent: &str, projection: &str) -> std::fmt::Result {
    writeln!(out, "{indent}PROJECTION")?;
    for token in projection.split_whitespace() {
        let token = token.trim_start_matches('+');
        if !token.is_empty() {
            writeln!(out, "{indent}  {}", quote(token))?;
        }
    }
    writeln!(out, "{indent}END")
}

fn write_metadata(out: &mut String, indent: &str, metadata: &[(String, String)]) -> std::fmt::Result {
    writeln!(out, "{indent}METADATA")?;
    for (key, value) in metadata {
        writeln!(out, "{indent}  {} {}", quote(key), quote(value))?;
    }
    writeln!(out, "{indent}END")
}

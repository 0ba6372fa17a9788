//! WMS GetMap requests.

use chrono::{DateTime, Utc};

/// A WMS 1.3.0 GetMap request.
#[derive(Debug, Clone, PartialEq)]
pub struct GetMapRequest {
    /// `min_lat,min_lon,max_lat,max_lon` (EPSG:4326 axis order)
    pub bbox: [f64; 4],
    pub crs: String,
    pub width: u32,
    pub height: u32,
    pub layers: Vec<String>,
    pub time: Option<DateTime<Utc>>,
    pub format: String,
    pub dpi: u32,
    pub transparent: bool,
}

impl GetMapRequest {
    /// Overview of the northern European sector at the given time.
    pub fn default_view(layer: &str, time: DateTime<Utc>) -> Self {
        Self {
            bbox: [50.0, -10.0, 80.0, 50.0],
            crs: "EPSG:4326".to_string(),
            width: 800,
            height: 1200,
            layers: vec![layer.to_string()],
            time: Some(time),
            format: "image/png".to_string(),
            dpi: 96,
            transparent: true,
        }
    }

    /// Query string as understood by `mapserv`.
    pub fn query_string(&self) -> String {
        let bbox = self
            .bbox
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let layers = self
            .layers
            .iter()
            .map(|l| urlencoding::encode(l).into_owned())
            .collect::<Vec<_>>()
            .join(",");

        let mut params = vec![
            ("SERVICE", "WMS".to_string()),
            ("VERSION", "1.3.0".to_string()),
            ("REQUEST", "GetMap".to_string()),
            ("BBOX", bbox),
            ("CRS", self.crs.clone()),
            ("WIDTH", self.width.to_string()),
            ("HEIGHT", self.height.to_string()),
            ("LAYERS", layers),
            ("STYLES", String::new()),
        ];
        if let Some(time) = self.time {
            params.push(("TIME", time.format("%Y-%m-%dT%H:%M:%SZ").to_string()));
        }
        params.extend([
            ("FORMAT", self.format.clone()),
            ("DPI", self.dpi.to_string()),
            ("MAP_RESOLUTION", self.dpi.to_string()),
            ("FORMAT_OPTIONS", format!("dpi:{}", self.dpi)),
            (
                "TRANSPARENT",
                if self.transparent { "TRUE" } else { "FALSE" }.to_string(),
            ),
        ]);

        params
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

//! Process inputs and the process description document.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Identifier of the swath rendering process.
pub const PROCESS_ID: &str = "process-netcdf";

/// Product rendered when the caller does not request a layer.
pub const DEFAULT_PRODUCT: &str = "overview";

/// Input validation failure, raised before anything is enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Missing required input '{0}'")]
    Missing(&'static str),

    #[error("Input '{name}' is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Job identifier must not be empty")]
    EmptyJobId,
}

/// Inputs of the swath rendering process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInputs {
    /// Path of the swath NetCDF file
    pub netcdf_file: String,
    /// Product/layer to render, defaults to [`DEFAULT_PRODUCT`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
}

impl ProcessInputs {
    pub fn new(netcdf_file: impl Into<String>) -> Self {
        Self {
            netcdf_file: netcdf_file.into(),
            layer: None,
        }
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    /// Parse and validate the `inputs` object of an execute request.
    pub fn from_value(value: &Value) -> Result<Self, InputError> {
        let object = value.as_object().ok_or(InputError::Invalid {
            name: "inputs",
            reason: "expected a JSON object".to_string(),
        })?;

        let netcdf_file = match object.get("netcdf_file") {
            None | Some(Value::Null) => return Err(InputError::Missing("netcdf_file")),
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(InputError::Invalid {
                    name: "netcdf_file",
                    reason: "expected a string".to_string(),
                })
            }
        };

        let layer = match object.get("layer") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(InputError::Invalid {
                    name: "layer",
                    reason: "expected a string".to_string(),
                })
            }
        };

        let inputs = Self { netcdf_file, layer };
        inputs.validate()?;
        Ok(inputs)
    }

    /// Check required values are present.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.netcdf_file.trim().is_empty() {
            return Err(InputError::Missing("netcdf_file"));
        }
        if let Some(layer) = &self.layer {
            if layer.trim().is_empty() {
                return Err(InputError::Invalid {
                    name: "layer",
                    reason: "must not be empty".to_string(),
                });
            }
            if !layer
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(InputError::Invalid {
                    name: "layer",
                    reason: "only letters, digits, '_' and '-' are allowed".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Requested product, or the default one.
    pub fn product(&self) -> &str {
        self.layer.as_deref().unwrap_or(DEFAULT_PRODUCT)
    }
}

/// Process description served at `/processes/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDescription {
    pub id: String,
    pub version: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    #[serde(rename = "jobControlOptions")]
    pub job_control_options: Vec<String>,
    pub inputs: Value,
    pub outputs: Value,
    pub example: Value,
}

impl ProcessDescription {
    /// Description of the swath rendering process.
    pub fn netcdf() -> Self {
        Self {
            id: PROCESS_ID.to_string(),
            version: "0.0.1".to_string(),
            title: "netcdf".to_string(),
            description: "Renders a polar swath NetCDF file as a WMS GetMap image. \
                          The swath is resampled to a GeoTIFF product, registered as a \
                          map layer and rendered for a fixed default view."
                .to_string(),
            keywords: vec![
                "satellite".to_string(),
                "swath".to_string(),
                "netcdf".to_string(),
                "wms".to_string(),
            ],
            job_control_options: vec!["async-execute".to_string()],
            inputs: json!({
                "netcdf_file": {
                    "title": "NetCDF file",
                    "description": "Path of the swath file to render",
                    "schema": { "type": "string" },
                    "minOccurs": 1,
                    "maxOccurs": 1
                },
                "layer": {
                    "title": "Layer",
                    "description": format!("Product to render (default: {})", DEFAULT_PRODUCT),
                    "schema": { "type": "string" },
                    "minOccurs": 0,
                    "maxOccurs": 1
                }
            }),
            outputs: json!({
                "image": {
                    "title": "Rendered map",
                    "description": "WMS GetMap response for the rendered product",
                    "schema": {
                        "type": "string",
                        "contentMediaType": "image/png"
                    }
                }
            }),
            example: json!({
                "inputs": {
                    "netcdf_file": "/lustre/storeB/immutable/archive/projects/remotesensing/satellite-thredds/polar-swath/2023/01/13/noaa19-avhrr-20230113072221-20230113073600.nc"
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_default_product() {
        let inputs = ProcessInputs::from_value(&json!({
            "netcdf_file": "noaa19-avhrr-20230113072221-20230113073600.nc"
        }))
        .unwrap();
        assert_eq!(inputs.layer, None);
        assert_eq!(inputs.product(), "overview");
    }

    #[test]
    fn test_inputs_requested_layer() {
        let inputs = ProcessInputs::from_value(&json!({
            "netcdf_file": "a.nc",
            "layer": "night_overview"
        }))
        .unwrap();
        assert_eq!(inputs.product(), "night_overview");
    }

    #[test]
    fn test_inputs_missing_source() {
        assert_eq!(
            ProcessInputs::from_value(&json!({ "layer": "overview" })),
            Err(InputError::Missing("netcdf_file"))
        );
        assert_eq!(
            ProcessInputs::from_value(&json!({ "netcdf_file": "" })),
            Err(InputError::Missing("netcdf_file"))
        );
    }

    #[test]
    fn test_inputs_wrong_types() {
        assert!(ProcessInputs::from_value(&json!([])).is_err());
        assert!(ProcessInputs::from_value(&json!({ "netcdf_file": 3 })).is_err());
        assert!(ProcessInputs::from_value(&json!({ "netcdf_file": "a.nc", "layer": "../x" })).is_err());
    }

    #[test]
    fn test_description_lists_inputs() {
        let description = ProcessDescription::netcdf();
        assert_eq!(description.id, PROCESS_ID);
        assert!(description.inputs.get("netcdf_file").is_some());
        assert!(description.inputs.get("layer").is_some());
    }
}

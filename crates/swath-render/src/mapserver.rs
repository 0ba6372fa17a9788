//! Map rendering through the MapServer CGI executable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::command::ToolCommand;
use crate::config::RenderConfig;
use crate::error::{RenderError, RenderResult};
use crate::wms::GetMapRequest;

/// A rendered map response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMap {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Map rendering engine.
#[async_trait]
pub trait MapRenderer: Send + Sync {
    /// Dispatch a GetMap request against a mapfile.
    async fn render(&self, mapfile: &Path, request: &GetMapRequest) -> RenderResult<RenderedMap>;
}

/// Renderer running `mapserv` once per request.
#[derive(Debug, Clone)]
pub struct MapservRenderer {
    mapserv_cmd: String,
    work_dir: PathBuf,
    timeout: Duration,
}

impl MapservRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            mapserv_cmd: config.mapserv_cmd.clone(),
            work_dir: config.work_dir.clone(),
            timeout: config.command_timeout,
        }
    }

    /// Build the CGI invocation.
    pub fn command(&self, mapfile: &Path, request: &GetMapRequest) -> ToolCommand {
        let query = format!(
            "map={}&{}",
            urlencoding::encode(&mapfile.to_string_lossy()),
            request.query_string()
        );
        ToolCommand::new(&self.mapserv_cmd)
            .env("REQUEST_METHOD", "GET")
            .env("QUERY_STRING", query)
            .current_dir(&self.work_dir)
            .timeout(self.timeout)
    }
}

#[async_trait]
impl MapRenderer for MapservRenderer {
    async fn render(&self, mapfile: &Path, request: &GetMapRequest) -> RenderResult<RenderedMap> {
        let output = self.command(mapfile, request).run().await?;
        let rendered = expect_format(parse_cgi_response(&output.stdout)?, &request.format)?;
        debug!(
            "Rendered {} bytes of {}",
            rendered.body.len(),
            rendered.content_type
        );
        Ok(rendered)
    }
}

/// Longest slice of a non-image body carried into the error.
const EXCEPTION_EXCERPT: usize = 512;

/// Accept the response only if it carries the requested image format.
///
/// Service exceptions come back as XML with a zero exit status.
pub fn expect_format(rendered: RenderedMap, format: &str) -> RenderResult<RenderedMap> {
    let media_type = rendered
        .content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();

    if !media_type.to_ascii_lowercase().starts_with("image/") {
        let text = String::from_utf8_lossy(&rendered.body);
        let message: String = text.trim().chars().take(EXCEPTION_EXCERPT).collect();
        warn!(
            "mapserv answered with {} instead of an image ({} bytes)",
            rendered.content_type,
            rendered.body.len()
        );
        return Err(RenderError::ServiceException {
            content_type: rendered.content_type,
            message,
        });
    }

    if !media_type.eq_ignore_ascii_case(format.trim()) {
        return Err(RenderError::invalid_output(format!(
            "requested {} but mapserv produced {}",
            format, rendered.content_type
        )));
    }

    Ok(rendered)
}

/// Split a CGI response into its content type and body.
pub fn parse_cgi_response(raw: &[u8]) -> RenderResult<RenderedMap> {
    let crlf = find(raw, b"\r\n\r\n").map(|i| (i, 4));
    let lf = find(raw, b"\n\n").map(|i| (i, 2));
    let (end, sep_len) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => {
            return Err(RenderError::invalid_output(
                "CGI response has no header terminator",
            ))
        }
    };

    let headers = String::from_utf8_lossy(&raw[..end]);
    let content_type = headers
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| RenderError::invalid_output("CGI response has no Content-Type header"))?;

    Ok(RenderedMap {
        content_type,
        body: raw[end + sep_len..].to_vec(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

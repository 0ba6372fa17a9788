//! Processes runnable by the worker.
//!
//! A process turns validated inputs into a result envelope. It knows nothing
//! about queues or job records; the executor owns that lifecycle.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use swath_models::{JobId, ProcessInputs, ResultEnvelope, PROCESS_ID};
use swath_render::{
    ensure_products, GetMapRequest, KeyedLock, MapFile, MapLayer, MapRenderer, MapservRenderer,
    ProductRequest, RasterToolkit, RenderConfig, SatpyToolkit, SwathPattern,
};

use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// A unit of work the worker can execute.
#[async_trait]
pub trait Process: Send + Sync {
    /// Identifier the process is dispatched under.
    fn id(&self) -> &str;

    /// Run the process for one job.
    async fn execute(&self, job_id: &JobId, inputs: &ProcessInputs) -> WorkerResult<ResultEnvelope>;
}

/// Processes known to a worker, keyed by identifier.
#[derive(Default, Clone)]
pub struct ProcessRegistry {
    processes: HashMap<String, Arc<dyn Process>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, process: Arc<dyn Process>) -> Self {
        self.processes.insert(process.id().to_string(), process);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Process>> {
        self.processes.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.processes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Renders a swath pass as a WMS image.
///
/// Steps: parse the swath filename, collect the sibling files of the pass,
/// generate the product raster if it is not on disk yet, register it in a
/// mapfile, then run the default GetMap against that mapfile.
pub struct NetcdfProcess {
    pattern: SwathPattern,
    work_dir: PathBuf,
    online_resource_base: String,
    toolkit: Arc<dyn RasterToolkit>,
    renderer: Arc<dyn MapRenderer>,
    locks: KeyedLock<PathBuf>,
}

impl NetcdfProcess {
    pub fn new(
        config: &RenderConfig,
        toolkit: Arc<dyn RasterToolkit>,
        renderer: Arc<dyn MapRenderer>,
    ) -> WorkerResult<Self> {
        Ok(Self {
            pattern: SwathPattern::new(&config.swath_prefix_pattern)?,
            work_dir: config.work_dir.clone(),
            online_resource_base: config.online_resource_base.clone(),
            toolkit,
            renderer,
            locks: KeyedLock::new(),
        })
    }

    /// Process backed by the satellite toolkit and `mapserv` commands.
    pub fn from_config(config: &RenderConfig) -> WorkerResult<Self> {
        Self::new(
            config,
            Arc::new(SatpyToolkit::new(config)),
            Arc::new(MapservRenderer::new(config)),
        )
    }
}

#[async_trait]
impl Process for NetcdfProcess {
    fn id(&self) -> &str {
        PROCESS_ID
    }

    async fn execute(&self, job_id: &JobId, inputs: &ProcessInputs) -> WorkerResult<ResultEnvelope> {
        let logger = JobLogger::new(job_id, PROCESS_ID);
        inputs.validate()?;

        let swath = self.pattern.parse(&inputs.netcdf_file)?;
        let sources = swath.similar_files().await?;
        logger.log_step(
            "swath",
            &format!("{} {} pass with {} file(s)", swath.platform, swath.start, sources.len()),
        );

        let product = inputs.product();
        let requests = vec![ProductRequest::for_pass(product, swath.start_time, &self.work_dir)];
        ensure_products(self.toolkit.as_ref(), &self.locks, &sources, &requests).await?;

        let mut map = MapFile::for_swath(&inputs.netcdf_file, &self.online_resource_base);
        for request in &requests {
            let info = self.toolkit.describe(&request.output).await?;
            map.insert_layer(MapLayer::raster(&request.product, &info, swath.start_time));
        }

        // Products of one pass share the mapfile name
        let mapfile = self.work_dir.join(MapFile::filename(swath.start_time));
        let rendered = {
            let _guard = self.locks.lock(&mapfile).await;
            map.save(&mapfile).await?;
            logger.log_step("mapfile", &format!("Saved {}", mapfile.display()));

            let request = GetMapRequest::default_view(product, swath.start_time);
            self.renderer.render(&mapfile, &request).await?
        };

        Ok(ResultEnvelope::new(rendered.content_type, rendered.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use std::path::Path;
    use std::sync::Mutex;
    use swath_render::{
        parse_gdalinfo, RasterInfo, RenderError, RenderResult, RenderedMap, ANY_PREFIX_PATTERN,
    };

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', 1, 2, 3];

    #[derive(Default)]
    struct FakeToolkit {
        generated: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RasterToolkit for FakeToolkit {
        async fn generate(&self, _sources: &[PathBuf], products: &[ProductRequest]) -> RenderResult<()> {
            for request in products {
                self.generated.lock().unwrap().push(request.product.clone());
                tokio::fs::write(&request.output, b"tif").await?;
            }
            Ok(())
        }

        async fn describe(&self, raster: &Path) -> RenderResult<RasterInfo> {
            parse_gdalinfo(
                raster,
                br#"{"coordinateSystem": {"proj4": "+proj=omerc +ellps=WGS84"},
                     "cornerCoordinates": {"lowerLeft": [-10, -20], "upperRight": [10, 20]}}"#,
            )
        }
    }

    #[derive(Default)]
    struct FakeRenderer {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MapRenderer for FakeRenderer {
        async fn render(&self, mapfile: &Path, request: &GetMapRequest) -> RenderResult<RenderedMap> {
            let text = tokio::fs::read_to_string(mapfile).await?;
            if !text.contains("TYPE RASTER") {
                return Err(RenderError::invalid_output("no raster layer"));
            }
            self.queries.lock().unwrap().push(request.query_string());
            Ok(RenderedMap {
                content_type: "image/png".to_string(),
                body: PNG.to_vec(),
            })
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        toolkit: Arc<FakeToolkit>,
        renderer: Arc<FakeRenderer>,
        process: NetcdfProcess,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig {
            work_dir: dir.path().to_path_buf(),
            swath_prefix_pattern: ANY_PREFIX_PATTERN.to_string(),
            ..RenderConfig::default()
        };
        let toolkit = Arc::new(FakeToolkit::default());
        let renderer = Arc::new(FakeRenderer::default());
        let process = NetcdfProcess::new(&config, toolkit.clone(), renderer.clone()).unwrap();
        Fixture {
            dir,
            toolkit,
            renderer,
            process,
        }
    }

    fn swath_file(dir: &Path) -> String {
        let path = dir.join("noaa19-avhrr-20230113072221-20230113073600.nc");
        std::fs::write(&path, b"netcdf").unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_default_product_renders_png() {
        let fx = fixture();
        let inputs = ProcessInputs::new(swath_file(fx.dir.path()));

        let envelope = fx.process.execute(&JobId::from("job-1"), &inputs).await.unwrap();
        assert_eq!(envelope.content_type, "image/png");
        assert!(!envelope.payload.is_empty());

        assert_eq!(*fx.toolkit.generated.lock().unwrap(), vec!["overview".to_string()]);
        assert!(fx.dir.path().join("overview-20230113072221.tif").exists());
        assert!(fx.dir.path().join("satpy-products-20230113072221.map").exists());

        let queries = fx.renderer.queries.lock().unwrap();
        assert!(queries[0].contains("LAYERS=overview&"));
        assert!(queries[0].contains("TIME=2023-01-13T07:22:21Z"));
    }

    #[tokio::test]
    async fn test_existing_product_is_reused() {
        let fx = fixture();
        let inputs = ProcessInputs::new(swath_file(fx.dir.path()));
        fx.process.execute(&JobId::from("job-1"), &inputs).await.unwrap();
        fx.process.execute(&JobId::from("job-2"), &inputs).await.unwrap();
        assert_eq!(fx.toolkit.generated.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_requested_layer() {
        let fx = fixture();
        let inputs = ProcessInputs::new(swath_file(fx.dir.path())).with_layer("night_overview");
        fx.process.execute(&JobId::from("job-1"), &inputs).await.unwrap();
        assert!(fx.dir.path().join("night_overview-20230113072221.tif").exists());
        assert!(fx.renderer.queries.lock().unwrap()[0].contains("LAYERS=night_overview&"));
    }

    #[tokio::test]
    async fn test_malformed_filename_is_invalid_parameter() {
        let fx = fixture();
        let err = fx
            .process
            .execute(&JobId::from("job-1"), &ProcessInputs::new("/tmp/garbage.nc"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "InvalidParameterValue");
        assert!(fx.toolkit.generated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_is_invalid_parameter() {
        let fx = fixture();
        let missing = fx
            .dir
            .path()
            .join("noaa19-avhrr-20230113072221-20230113073600.nc");
        let err = fx
            .process
            .execute(
                &JobId::from("job-1"),
                &ProcessInputs::new(missing.to_string_lossy()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Render(RenderError::FileNotFound(_))));
        assert_eq!(err.code(), "InvalidParameterValue");
    }

    #[test]
    fn test_registry() {
        let fx = fixture();
        let registry = ProcessRegistry::new().register(Arc::new(fx.process));
        assert!(registry.get(PROCESS_ID).is_some());
        assert!(registry.get("hello-world").is_none());
        assert_eq!(registry.ids(), vec![PROCESS_ID]);
    }
}

use std::sync::Arc;

use rayon::prelude::*;

use crate::assets::lut::Lut3d;
use crate::foundation::core::Extent;
use crate::foundation::error::{CamflowError, CamflowResult};
use crate::render::{
    BackendKind, DrawPass, FrameRGBA, RenderBackend, RenderSettings, ResourceLedger,
    TrackedResource,
};
use crate::stage::shade_pixel;
use crate::stage::transform::DisplayTransform;

/// Software backend: samples the source per target pixel, rows in parallel.
pub struct CpuBackend {
    pool: rayon::ThreadPool,
    ledger: ResourceLedger,
    lut: Option<Arc<Lut3d>>,
    lut_texture: Option<TrackedResource>,
    source_texture: Option<(Extent, TrackedResource)>,
    released: bool,
}

impl CpuBackend {
    pub fn new(settings: &RenderSettings, ledger: ResourceLedger) -> CamflowResult<Self> {
        Ok(Self {
            pool: build_thread_pool(settings.threads)?,
            ledger,
            lut: None,
            lut_texture: None,
            source_texture: None,
            released: false,
        })
    }

    fn bind_source(&mut self, extent: Extent) {
        let stale = self
            .source_texture
            .as_ref()
            .map(|(e, _)| *e != extent)
            .unwrap_or(true);
        if stale {
            // Replace first so the old slot is released before the new one is counted.
            self.source_texture = None;
            self.source_texture = Some((extent, self.ledger.track("source_texture")));
        }
    }
}

impl RenderBackend for CpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn set_lut(&mut self, lut: Arc<Lut3d>) -> CamflowResult<()> {
        if self.released {
            return Err(CamflowError::render("cpu backend already released"));
        }
        self.lut_texture = None;
        self.lut_texture = Some(self.ledger.track("lut_texture"));
        self.lut = Some(lut);
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all, fields(mode = %pass.mode))]
    fn draw(&mut self, pass: &DrawPass<'_>, target: &mut FrameRGBA) -> CamflowResult<()> {
        if self.released {
            return Err(CamflowError::render("cpu backend already released"));
        }
        let extent = target.extent();
        if extent.is_empty() {
            return Ok(());
        }
        let clear = pass.clear_rgba;
        let Some(src) = pass.source else {
            target.fill(clear);
            return Ok(());
        };
        self.bind_source(src.extent);

        let lut = if pass.mode.uses_lut() {
            Some(
                self.lut
                    .as_deref()
                    .ok_or_else(|| CamflowError::render("no lookup table uploaded"))?,
            )
        } else {
            None
        };
        let mode = pass.mode;
        let xf = DisplayTransform::fit(src.extent, src.orientation, extent);
        let row_bytes = extent.width as usize * 4;

        self.pool.install(|| {
            target
                .data
                .par_chunks_mut(row_bytes)
                .enumerate()
                .for_each(|(y, row)| {
                    for (x, px) in row.chunks_exact_mut(4).enumerate() {
                        let out = match xf.source_texel(x as u32, y as u32, extent, src.extent) {
                            Some((sx, sy)) => shade_pixel(mode, src.pixel(sx, sy), lut),
                            None => clear,
                        };
                        px.copy_from_slice(&out);
                    }
                });
        });
        Ok(())
    }

    fn release(&mut self) {
        self.source_texture = None;
        self.lut_texture = None;
        self.lut = None;
        self.released = true;
    }
}

fn build_thread_pool(threads: Option<usize>) -> CamflowResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(CamflowError::validation(
            "render 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("camflow-raster-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| CamflowError::initialization(format!("failed to build raster pool: {e}")))
}

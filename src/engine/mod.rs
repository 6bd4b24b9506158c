//! The engine handle.
//!
//! An [`Engine`] owns one serial render worker. Every state change (mode, frame, target) and
//! every render is a command on the worker's queue, so renders never overlap and a frame never
//! observes a half-applied reconfiguration. Dropping the engine tears it down.

pub mod opts;
pub(crate) mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;

use crate::assets::lut::Lut3d;
use crate::assets::source::AssetSource;
use crate::foundation::core::{Extent, Orientation};
use crate::foundation::error::{CamflowError, CamflowResult};
use crate::frame::buffer::HardwareBuffer;
use crate::frame::import::import_buffer;
use crate::frame::yuv::PlanarFrame;
use crate::present::Surface;
use crate::render::{RenderBackend, ResourceLedger, create_backend};
use crate::stage::EngineMode;

pub use opts::EngineOpts;
use worker::{Command, Shared, Worker};

/// What one render did.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct FrameReport {
    /// Render counter for this engine, starting at 1.
    pub seq: u64,
    pub mode: EngineMode,
    /// Sequence of the submitted frame that was drawn, if any.
    pub source_seq: Option<u64>,
    /// Size of the presented image; `None` when nothing was presented.
    pub extent: Option<Extent>,
}

impl FrameReport {
    pub fn presented(&self) -> bool {
        self.extent.is_some()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct EngineStats {
    pub frames_submitted: u64,
    pub frames_rendered: u64,
    pub frames_presented: u64,
    pub transient_failures: u64,
    pub swapchain_rebuilds: u64,
    pub loops_started: u64,
    pub last_report: Option<FrameReport>,
}

pub struct Engine {
    shared: Arc<Shared>,
    commands: mpsc::SyncSender<Command>,
    worker: Option<JoinHandle<()>>,
    ledger: ResourceLedger,
    next_source_seq: AtomicU64,
}

impl Engine {
    /// Create an engine: backend, grading table, worker thread.
    ///
    /// Any failure is reported as [`CamflowError::Initialization`].
    #[tracing::instrument(skip(assets, opts), fields(backend = %opts.backend))]
    pub fn create(assets: &dyn AssetSource, opts: EngineOpts) -> CamflowResult<Self> {
        let ledger = ResourceLedger::new();
        let backend = create_backend(opts.backend, &opts.render, &ledger)
            .map_err(|e| as_init_error("render backend", e))?;
        Self::create_with_backend(assets, opts, backend, ledger)
    }

    /// Like [`Engine::create`] with a caller-provided backend. `ledger` must be the one the
    /// backend tracks its objects with.
    pub fn create_with_backend(
        assets: &dyn AssetSource,
        opts: EngineOpts,
        mut backend: Box<dyn RenderBackend>,
        ledger: ResourceLedger,
    ) -> CamflowResult<Self> {
        opts.validate().map_err(|e| as_init_error("options", e))?;

        let lut = assets
            .read(&opts.lut_asset)
            .and_then(|bytes| Lut3d::decode(&bytes))
            .map_err(|e| as_init_error(&format!("lut '{}'", opts.lut_asset), e))?;
        backend
            .set_lut(Arc::new(lut))
            .map_err(|e| as_init_error("lut upload", e))?;

        let shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::sync_channel(opts.command_capacity);
        let worker = Worker::new(shared.clone(), backend, ledger.clone(), &opts);
        let handle = std::thread::Builder::new()
            .name("camflow-render".to_owned())
            .spawn(move || worker.run(rx))
            .map_err(|e| CamflowError::initialization(format!("spawn render worker: {e}")))?;

        tracing::info!(lut = %opts.lut_asset, "engine created");
        Ok(Self {
            shared,
            commands: tx,
            worker: Some(handle),
            ledger,
            next_source_seq: AtomicU64::new(1),
        })
    }

    fn send(&self, cmd: Command) -> CamflowResult<()> {
        self.commands
            .send(cmd)
            .map_err(|_| CamflowError::invalid_handle("render worker is gone"))
    }

    /// Switch the processing stage for subsequent frames.
    pub fn configure(&self, mode: EngineMode) -> CamflowResult<()> {
        self.send(Command::Configure(mode))
    }

    /// Copy `buffer` into the engine and queue it for the next render.
    ///
    /// The buffer is only borrowed for the duration of the call. Returns the frame's sequence
    /// number.
    pub fn submit_frame(
        &self,
        buffer: &dyn HardwareBuffer,
        orientation: Orientation,
    ) -> CamflowResult<u64> {
        let seq = self.next_source_seq.fetch_add(1, Ordering::Relaxed);
        let frame = import_buffer(buffer, orientation, seq)?;
        self.send(Command::SubmitFrame(frame))?;
        Ok(seq)
    }

    /// Set (or clear, with `None`) the presentation target.
    pub fn bind_surface(
        &self,
        surface: Option<Box<dyn Surface>>,
        extent: Extent,
    ) -> CamflowResult<()> {
        self.send(Command::BindSurface { surface, extent })
    }

    /// Update the target size; the swapchain is rebuilt before the next frame.
    pub fn resize(&self, surface: Option<Box<dyn Surface>>, extent: Extent) -> CamflowResult<()> {
        self.send(Command::Resize { surface, extent })
    }

    /// Render one frame on the worker and wait for it.
    pub fn render_once(&self) -> CamflowResult<FrameReport> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.send(Command::RenderOnce(tx))?;
        rx.recv()
            .map_err(|_| CamflowError::invalid_handle("render worker exited mid-frame"))?
    }

    /// Start continuous rendering. Returns `false` when a loop was already running.
    ///
    /// The worker owns the loop state, so concurrent start and stop calls apply in queue order.
    pub fn start_loop(&self) -> CamflowResult<bool> {
        if let Some(err) = self.fatal_error() {
            return Err(err);
        }
        let (tx, rx) = mpsc::sync_channel(1);
        self.send(Command::StartLoop(tx))?;
        rx.recv()
            .map_err(|_| CamflowError::invalid_handle("render worker exited before starting"))?
    }

    /// Stop the loop after the in-flight frame and wait until the worker is idle.
    pub fn stop_loop(&self) -> CamflowResult<()> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.send(Command::StopLoop(tx))?;
        rx.recv()
            .map_err(|_| CamflowError::invalid_handle("render worker exited before stopping"))
    }

    /// `true` starts the loop, `false` renders a single frame.
    pub fn start_render(&self, looping: bool) -> CamflowResult<()> {
        if looping {
            self.start_loop().map(|_| ())
        } else {
            self.render_once().map(|_| ())
        }
    }

    pub fn is_looping(&self) -> bool {
        self.shared.looping.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> EngineStats {
        self.shared.stats.lock().clone()
    }

    /// Latest NV21 conversion produced in [`EngineMode::BufferToPlanarYuv`].
    pub fn latest_planar(&self) -> Option<Arc<PlanarFrame>> {
        self.shared.planar.lock().clone()
    }

    /// The fatal error that stopped rendering, if any.
    pub fn fatal_error(&self) -> Option<CamflowError> {
        self.shared
            .fatal
            .lock()
            .as_ref()
            .map(|msg| CamflowError::device_lost(msg.clone()))
    }

    pub fn resource_ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// Tear the engine down: stop the loop, detach the target, release the backend, join the
    /// worker.
    pub fn destroy(mut self) -> CamflowResult<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> CamflowResult<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        let (tx, rx) = mpsc::sync_channel(1);
        if self.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.recv();
        }
        handle
            .join()
            .map_err(|_| CamflowError::Other(anyhow::anyhow!("render worker panicked")))?;
        tracing::info!(live_resources = self.ledger.live(), "engine destroyed");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::error!(error = %e, "engine teardown failed");
        }
    }
}

fn as_init_error(what: &str, err: CamflowError) -> CamflowError {
    match err {
        CamflowError::Initialization(_) => err,
        other => CamflowError::initialization(format!("{what}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::source::MemoryAssets;
    use crate::frame::buffer::CpuBuffer;
    use crate::present::InMemorySurface;

    fn assets() -> MemoryAssets {
        let lut = Lut3d::identity(4).unwrap();
        let mut png = Vec::new();
        lut.to_strip_image()
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        MemoryAssets::new()
            .with(opts::DEFAULT_LUT_ASSET, png)
            .unwrap()
    }

    fn fast_opts() -> EngineOpts {
        EngineOpts {
            frame_interval_ms: 0,
            ..EngineOpts::default()
        }
    }

    #[test]
    fn missing_lut_is_an_initialization_error() {
        let err = Engine::create(&MemoryAssets::new(), EngineOpts::default())
            .err()
            .unwrap();
        assert!(matches!(err, CamflowError::Initialization(_)), "{err}");
    }

    #[test]
    fn render_without_target_reports_not_presented() {
        let engine = Engine::create(&assets(), fast_opts()).unwrap();
        let report = engine.render_once().unwrap();
        assert_eq!(report.seq, 1);
        assert_eq!(report.source_seq, None);
        assert!(!report.presented());
        engine.destroy().unwrap();
    }

    #[test]
    fn submitted_frames_get_increasing_sequence_numbers() {
        let engine = Engine::create(&assets(), fast_opts()).unwrap();
        let buf = CpuBuffer::solid_rgba8(2, 2, [1, 2, 3, 255]).unwrap();
        assert_eq!(engine.submit_frame(&buf, Orientation::IDENTITY).unwrap(), 1);
        assert_eq!(engine.submit_frame(&buf, Orientation::IDENTITY).unwrap(), 2);
        let report = engine.render_once().unwrap();
        assert_eq!(report.source_seq, Some(2));
        assert_eq!(engine.stats().frames_submitted, 2);
    }

    #[test]
    fn planar_output_follows_the_latest_frame() {
        let engine = Engine::create(&assets(), fast_opts()).unwrap();
        engine.configure(EngineMode::BufferToPlanarYuv).unwrap();
        let buf = CpuBuffer::solid_rgba8(4, 2, [255, 255, 255, 255]).unwrap();
        engine.submit_frame(&buf, Orientation::IDENTITY).unwrap();
        engine.render_once().unwrap();
        let planar = engine.latest_planar().unwrap();
        assert_eq!(planar.extent(), Extent::new(4, 2));
        assert!(planar.y.iter().all(|&y| y == 235));
        assert_eq!(planar.source_seq, 1);
    }

    #[test]
    fn drop_releases_everything() {
        let surface = InMemorySurface::new(Extent::new(8, 8));
        let engine = Engine::create(&assets(), fast_opts()).unwrap();
        let ledger = engine.resource_ledger().clone();
        engine
            .bind_surface(Some(surface.boxed()), Extent::new(8, 8))
            .unwrap();
        engine.render_once().unwrap();
        assert!(ledger.live() > 0);
        drop(engine);
        assert_eq!(ledger.live(), 0);
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::engine::opts::EngineOpts;
use crate::engine::{EngineStats, FrameReport};
use crate::foundation::core::Extent;
use crate::foundation::error::{CamflowError, CamflowResult};
use crate::frame::import::SourceFrame;
use crate::frame::yuv::{PlanarFrame, rgba_to_nv21};
use crate::present::Surface;
use crate::present::target::PresentationTarget;
use crate::render::{DrawPass, RenderBackend, ResourceLedger};
use crate::stage::EngineMode;

pub(crate) type Reply<T> = mpsc::SyncSender<T>;

pub(crate) enum Command {
    Configure(EngineMode),
    SubmitFrame(SourceFrame),
    BindSurface {
        surface: Option<Box<dyn Surface>>,
        extent: Extent,
    },
    Resize {
        surface: Option<Box<dyn Surface>>,
        extent: Extent,
    },
    RenderOnce(Reply<CamflowResult<FrameReport>>),
    StartLoop(Reply<CamflowResult<bool>>),
    StopLoop(Reply<()>),
    Shutdown(Reply<()>),
}

/// State readable from any thread while the worker owns the render path.
///
/// `looping` is only written by the worker.
#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) looping: AtomicBool,
    pub(crate) stats: Mutex<EngineStats>,
    pub(crate) planar: Mutex<Option<Arc<PlanarFrame>>>,
    pub(crate) fatal: Mutex<Option<String>>,
}

enum Flow {
    Continue,
    Exit,
}

pub(crate) struct Worker {
    shared: Arc<Shared>,
    backend: Box<dyn RenderBackend>,
    ledger: ResourceLedger,
    clear_rgba: [u8; 4],
    swapchain_images: u32,
    frame_interval: Duration,

    mode: EngineMode,
    source: Option<SourceFrame>,
    planar_seq: Option<u64>,
    target: Option<PresentationTarget>,
    looping: bool,
    next_frame_at: Instant,
    frame_seq: u64,
    lost: Option<String>,
}

impl Worker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        backend: Box<dyn RenderBackend>,
        ledger: ResourceLedger,
        opts: &EngineOpts,
    ) -> Self {
        Self {
            shared,
            backend,
            ledger,
            clear_rgba: opts.clear_rgba,
            swapchain_images: opts.swapchain_images,
            frame_interval: opts.frame_interval(),
            mode: EngineMode::default(),
            source: None,
            planar_seq: None,
            target: None,
            looping: false,
            next_frame_at: Instant::now(),
            frame_seq: 0,
            lost: None,
        }
    }

    /// Service commands until shutdown. While looping, every queued command is applied before
    /// the next frame, so a frame always sees the latest mode, target and buffer; while idle the
    /// worker blocks on the queue.
    pub(crate) fn run(mut self, rx: mpsc::Receiver<Command>) {
        tracing::debug!(backend = %self.backend.kind(), "render worker started");
        loop {
            if !self.looping {
                let Ok(cmd) = rx.recv() else { break };
                if let Flow::Exit = self.handle(cmd) {
                    return;
                }
                continue;
            }

            match self.drain(&rx) {
                Some(Flow::Continue) => {}
                Some(Flow::Exit) => return,
                None => break,
            }
            if !self.looping {
                continue;
            }

            let wait = self.next_frame_at.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                match rx.recv_timeout(wait) {
                    Ok(cmd) => {
                        if let Flow::Exit = self.handle(cmd) {
                            return;
                        }
                        continue;
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
            self.loop_tick();
            self.next_frame_at = Instant::now() + self.frame_interval;
        }
        tracing::debug!("command queue closed");
        self.teardown();
    }

    /// Apply every command already queued. Only the newest submitted frame survives.
    /// `None` once the queue is closed.
    fn drain(&mut self, rx: &mpsc::Receiver<Command>) -> Option<Flow> {
        loop {
            match rx.try_recv() {
                Ok(cmd) => {
                    if let Flow::Exit = self.handle(cmd) {
                        return Some(Flow::Exit);
                    }
                }
                Err(mpsc::TryRecvError::Empty) => return Some(Flow::Continue),
                Err(mpsc::TryRecvError::Disconnected) => return None,
            }
        }
    }

    fn handle(&mut self, cmd: Command) -> Flow {
        match cmd {
            Command::Configure(mode) => {
                if mode != self.mode {
                    tracing::debug!(from = %self.mode, to = %mode, "mode changed");
                }
                self.mode = mode;
            }
            Command::SubmitFrame(frame) => {
                tracing::trace!(seq = frame.seq, extent = %frame.extent, "frame queued");
                self.shared.stats.lock().frames_submitted += 1;
                self.source = Some(frame);
            }
            Command::BindSurface { surface, extent } => {
                self.target = surface.map(|s| PresentationTarget::new(s, extent));
                tracing::debug!(bound = self.target.is_some(), %extent, "presentation target set");
            }
            Command::Resize { surface, extent } => match self.target.as_mut() {
                Some(target) => {
                    target.resize(surface, extent);
                    tracing::debug!(%extent, "presentation target resized");
                }
                None => {
                    if let Some(surface) = surface {
                        self.target = Some(PresentationTarget::new(surface, extent));
                        tracing::debug!(%extent, "presentation target bound on resize");
                    } else {
                        tracing::debug!(%extent, "resize without a bound target ignored");
                    }
                }
            },
            Command::RenderOnce(reply) => {
                let res = self.render_frame();
                if let Err(err) = &res {
                    self.note_failure(err);
                }
                let _ = reply.send(res);
            }
            Command::StartLoop(reply) => {
                let res = if let Some(msg) = &self.lost {
                    tracing::warn!(%msg, "loop not started: device lost");
                    Err(CamflowError::device_lost(msg.clone()))
                } else if self.looping {
                    tracing::debug!("render loop already running");
                    Ok(false)
                } else {
                    self.set_looping(true);
                    self.next_frame_at = Instant::now();
                    self.shared.stats.lock().loops_started += 1;
                    tracing::info!("render loop started");
                    Ok(true)
                };
                let _ = reply.send(res);
            }
            Command::StopLoop(ack) => {
                if self.looping {
                    self.set_looping(false);
                    tracing::info!("render loop stopped");
                }
                let _ = ack.send(());
            }
            Command::Shutdown(ack) => {
                self.teardown();
                let _ = ack.send(());
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    fn set_looping(&mut self, on: bool) {
        self.looping = on;
        self.shared.looping.store(on, Ordering::Release);
    }

    fn loop_tick(&mut self) {
        if let Err(err) = self.render_frame() {
            self.note_failure(&err);
        }
    }

    fn note_failure(&mut self, err: &CamflowError) {
        if err.is_fatal() {
            if self.lost.is_none() {
                tracing::error!(error = %err, "fatal render error; rendering stopped");
                let msg = err.to_string();
                *self.shared.fatal.lock() = Some(msg.clone());
                self.lost = Some(msg);
            }
            self.set_looping(false);
        } else {
            tracing::warn!(error = %err, "frame failed");
            self.shared.stats.lock().transient_failures += 1;
        }
    }

    #[tracing::instrument(level = "trace", skip(self), fields(mode = %self.mode))]
    fn render_frame(&mut self) -> CamflowResult<FrameReport> {
        if let Some(msg) = &self.lost {
            return Err(CamflowError::device_lost(msg.clone()));
        }
        self.frame_seq += 1;

        if self.mode == EngineMode::BufferToPlanarYuv {
            self.convert_planar();
        }

        let pass = DrawPass {
            mode: self.mode,
            source: self.source.as_ref(),
            clear_rgba: self.clear_rgba,
        };
        let presented = match self.target.as_mut() {
            Some(target) => target.render(
                self.backend.as_mut(),
                &pass,
                self.swapchain_images,
                &self.ledger,
            )?,
            None => None,
        };

        let report = FrameReport {
            seq: self.frame_seq,
            mode: self.mode,
            source_seq: self.source.as_ref().map(|s| s.seq),
            extent: presented.map(|p| p.extent),
        };
        let mut stats = self.shared.stats.lock();
        stats.frames_rendered += 1;
        if let Some(p) = presented {
            stats.frames_presented += 1;
            if p.rebuilt {
                stats.swapchain_rebuilds += 1;
            }
        }
        stats.last_report = Some(report.clone());
        Ok(report)
    }

    fn convert_planar(&mut self) {
        let Some(src) = self.source.as_ref() else {
            return;
        };
        if self.planar_seq == Some(src.seq) {
            return;
        }
        let planar = rgba_to_nv21(src.extent, &src.rgba, src.seq);
        *self.shared.planar.lock() = Some(Arc::new(planar));
        self.planar_seq = Some(src.seq);
    }

    /// Stop the loop, detach the target, then release backend objects.
    fn teardown(&mut self) {
        self.set_looping(false);
        self.target = None;
        self.source = None;
        self.backend.release();
        tracing::debug!(live = self.ledger.live(), "render worker torn down");
    }
}

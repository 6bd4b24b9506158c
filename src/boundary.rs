//! Integer-handle API for embedding behind an FFI layer.
//!
//! Handles are non-zero `u64` ids into a process-wide table; `0` means "no engine". None of these
//! functions panic or return errors: failures are logged and the call becomes a no-op.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;

use crate::assets::source::AssetSource;
use crate::engine::{Engine, EngineOpts, EngineStats};
use crate::foundation::core::{Extent, Orientation};
use crate::foundation::error::{CamflowError, CamflowResult};
use crate::frame::buffer::HardwareBuffer;
use crate::present::Surface;
use crate::render::{RenderBackend, ResourceLedger};
use crate::stage::EngineMode;

pub type EngineHandle = u64;

#[derive(Default)]
struct HandleTable {
    next: EngineHandle,
    engines: HashMap<EngineHandle, Arc<Engine>>,
}

fn table() -> &'static Mutex<HandleTable> {
    static TABLE: OnceLock<Mutex<HandleTable>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HandleTable::default()))
}

fn register(engine: Engine) -> EngineHandle {
    let mut t = table().lock();
    t.next += 1;
    let handle = t.next;
    t.engines.insert(handle, Arc::new(engine));
    handle
}

fn lookup(handle: EngineHandle) -> Option<Arc<Engine>> {
    if handle == 0 {
        return None;
    }
    table().lock().engines.get(&handle).cloned()
}

/// Run `op` against the engine behind `handle`, logging instead of failing.
fn with_engine(
    handle: EngineHandle,
    op: &'static str,
    f: impl FnOnce(&Engine) -> CamflowResult<()>,
) {
    let Some(engine) = lookup(handle) else {
        let err = CamflowError::invalid_handle(format!("{handle}"));
        tracing::debug!(op, error = %err, "ignored");
        return;
    };
    if let Err(err) = f(&engine) {
        if err.is_fatal() {
            tracing::error!(op, handle, error = %err, "engine failed");
        } else {
            tracing::warn!(op, handle, error = %err, "engine call failed");
        }
    }
}

/// Create an engine with default options. Returns `0` on failure.
pub fn init(assets: &dyn AssetSource) -> EngineHandle {
    init_with_opts(assets, EngineOpts::default())
}

pub fn init_with_opts(assets: &dyn AssetSource, opts: EngineOpts) -> EngineHandle {
    match Engine::create(assets, opts) {
        Ok(engine) => {
            let handle = register(engine);
            tracing::info!(handle, "engine handle created");
            handle
        }
        Err(err) => {
            tracing::error!(error = %err, "engine init failed");
            0
        }
    }
}

/// Create an engine around a caller-provided backend. Returns `0` on failure.
pub fn init_with_backend(
    assets: &dyn AssetSource,
    opts: EngineOpts,
    backend: Box<dyn RenderBackend>,
    ledger: ResourceLedger,
) -> EngineHandle {
    match Engine::create_with_backend(assets, opts, backend, ledger) {
        Ok(engine) => register(engine),
        Err(err) => {
            tracing::error!(error = %err, "engine init failed");
            0
        }
    }
}

pub fn config_engine(handle: EngineHandle, mode: i32) {
    with_engine(handle, "config_engine", |e| {
        e.configure(EngineMode::from_ordinal(mode)?)
    });
}

pub fn set_window(
    handle: EngineHandle,
    surface: Option<Box<dyn Surface>>,
    width: i32,
    height: i32,
) {
    with_engine(handle, "set_window", |e| {
        e.bind_surface(surface, Extent::from_signed(width, height)?)
    });
}

pub fn on_window_size_changed(
    handle: EngineHandle,
    surface: Option<Box<dyn Surface>>,
    width: i32,
    height: i32,
) {
    with_engine(handle, "on_window_size_changed", |e| {
        e.resize(surface, Extent::from_signed(width, height)?)
    });
}

/// Import `buffer`; `orientation` is the sensor rotation in degrees.
pub fn prepare_hardware_buffer(
    handle: EngineHandle,
    buffer: &dyn HardwareBuffer,
    orientation: i32,
) {
    with_engine(handle, "prepare_hardware_buffer", |e| {
        e.submit_frame(buffer, Orientation::from_degrees(orientation)?)
            .map(|_| ())
    });
}

pub fn start_render(handle: EngineHandle, looping: bool) {
    with_engine(handle, "start_render", |e| e.start_render(looping));
}

pub fn stop_loop_render(handle: EngineHandle) {
    with_engine(handle, "stop_loop_render", |e| e.stop_loop());
}

/// Destroy the engine. The handle is invalid afterwards; a second call is a no-op.
///
/// Boundary calls still running on other threads finish first; teardown has completed and the
/// render worker has stopped when this returns.
pub fn un_init(handle: EngineHandle) {
    if handle == 0 {
        return;
    }
    let Some(mut engine) = table().lock().engines.remove(&handle) else {
        tracing::debug!(handle, "un_init on unknown handle ignored");
        return;
    };
    let engine = loop {
        match Arc::try_unwrap(engine) {
            Ok(engine) => break engine,
            Err(shared) => {
                tracing::trace!(handle, "un_init waiting for in-flight calls");
                engine = shared;
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    };
    if let Err(err) = engine.destroy() {
        tracing::error!(handle, error = %err, "engine teardown failed");
    }
    tracing::info!(handle, "engine handle destroyed");
}

/// `true` once the engine behind `handle` hit a fatal device loss.
pub fn device_lost(handle: EngineHandle) -> bool {
    lookup(handle)
        .map(|e| e.fatal_error().is_some())
        .unwrap_or(false)
}

/// Counters of the engine behind `handle`, if it is live.
pub fn stats(handle: EngineHandle) -> Option<EngineStats> {
    lookup(handle).map(|e| e.stats())
}

pub fn is_valid(handle: EngineHandle) -> bool {
    lookup(handle).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::source::MemoryAssets;
    use crate::frame::buffer::CpuBuffer;

    #[test]
    fn zero_and_unknown_handles_are_ignored() {
        let buf = CpuBuffer::solid_rgba8(1, 1, [0, 0, 0, 255]).unwrap();
        for handle in [0, u64::MAX] {
            config_engine(handle, 2);
            set_window(handle, None, 10, 10);
            on_window_size_changed(handle, None, 10, 10);
            prepare_hardware_buffer(handle, &buf, 90);
            start_render(handle, true);
            stop_loop_render(handle);
            un_init(handle);
            assert!(!device_lost(handle));
            assert!(!is_valid(handle));
            assert!(stats(handle).is_none());
        }
    }

    #[test]
    fn failed_init_returns_zero() {
        assert_eq!(init(&MemoryAssets::new()), 0);
    }

    fn assets() -> MemoryAssets {
        let lut = crate::assets::lut::Lut3d::identity(4).unwrap();
        let mut png = Vec::new();
        lut.to_strip_image()
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        MemoryAssets::new()
            .with(crate::engine::opts::DEFAULT_LUT_ASSET, png)
            .unwrap()
    }

    #[test]
    fn un_init_waits_for_in_flight_calls() {
        let handle = init(&assets());
        assert_ne!(handle, 0);
        let held = lookup(handle).unwrap();
        let ledger = held.resource_ledger().clone();
        held.bind_surface(
            Some(crate::present::InMemorySurface::new(Extent::new(4, 4)).boxed()),
            Extent::new(4, 4),
        )
        .unwrap();
        held.render_once().unwrap();
        assert!(ledger.live() > 0);

        let caller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            drop(held);
        });
        un_init(handle);
        assert_eq!(ledger.live(), 0);
        assert!(!is_valid(handle));
        caller.join().unwrap();
    }
}

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::foundation::core::Extent;
use crate::render::FrameRGBA;

/// Why a presentation attempt did not reach the screen.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceError {
    /// The surface changed size or format; the swapchain must be rebuilt.
    #[error("surface is outdated")]
    Outdated,
    /// No presentation image became available in time; the frame is skipped.
    #[error("timed out waiting for a presentation image")]
    Timeout,
    /// The native window went away.
    #[error("surface lost")]
    Lost,
}

/// A platform window (or anything else) that accepts finished frames.
pub trait Surface: Send {
    /// Current size of the native window, or an empty extent when unknown.
    fn native_extent(&self) -> Extent;

    fn present(&mut self, image: &FrameRGBA) -> Result<(), SurfaceError>;
}

const HISTORY_LIMIT: usize = 256;

#[derive(Debug, Default)]
struct SurfaceState {
    native: Extent,
    presented: u64,
    history: VecDeque<Extent>,
    last: Option<FrameRGBA>,
    pending_failures: VecDeque<SurfaceError>,
}

/// Headless [`Surface`] that records what was presented.
///
/// Clones share state, so a test (or the CLI) keeps one handle while the engine owns another.
/// Frames whose size differs from the native extent are rejected as [`SurfaceError::Outdated`],
/// which is how a real swapchain reacts to a window resized behind its back.
#[derive(Clone, Debug, Default)]
pub struct InMemorySurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl InMemorySurface {
    pub fn new(native: Extent) -> Self {
        let surface = Self::default();
        surface.set_native_extent(native);
        surface
    }

    pub fn set_native_extent(&self, native: Extent) {
        self.state.lock().native = native;
    }

    /// Make the next present attempts fail with `err`, in order.
    pub fn fail_next(&self, err: SurfaceError) {
        self.state.lock().pending_failures.push_back(err);
    }

    pub fn frames_presented(&self) -> u64 {
        self.state.lock().presented
    }

    /// Extents of recently presented frames, oldest first.
    pub fn presented_extents(&self) -> Vec<Extent> {
        self.state.lock().history.iter().copied().collect()
    }

    pub fn last_frame(&self) -> Option<FrameRGBA> {
        self.state.lock().last.clone()
    }

    pub fn boxed(&self) -> Box<dyn Surface> {
        Box::new(self.clone())
    }
}

impl Surface for InMemorySurface {
    fn native_extent(&self) -> Extent {
        self.state.lock().native
    }

    fn present(&mut self, image: &FrameRGBA) -> Result<(), SurfaceError> {
        let mut st = self.state.lock();
        if let Some(err) = st.pending_failures.pop_front() {
            return Err(err);
        }
        if !st.native.is_empty() && image.extent() != st.native {
            return Err(SurfaceError::Outdated);
        }
        st.presented += 1;
        if st.history.len() == HISTORY_LIMIT {
            st.history.pop_front();
        }
        st.history.push_back(image.extent());
        st.last = Some(image.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_presented_frames() {
        let surface = InMemorySurface::new(Extent::new(2, 2));
        let mut handle = surface.boxed();
        handle.present(&FrameRGBA::new(Extent::new(2, 2))).unwrap();
        assert_eq!(surface.frames_presented(), 1);
        assert_eq!(surface.presented_extents(), vec![Extent::new(2, 2)]);
        assert!(surface.last_frame().is_some());
    }

    #[test]
    fn mismatched_frames_are_outdated() {
        let mut surface = InMemorySurface::new(Extent::new(2, 2));
        let err = surface
            .present(&FrameRGBA::new(Extent::new(3, 2)))
            .unwrap_err();
        assert_eq!(err, SurfaceError::Outdated);
        assert_eq!(surface.frames_presented(), 0);
    }

    #[test]
    fn injected_failures_are_consumed_in_order() {
        let mut surface = InMemorySurface::new(Extent::new(1, 1));
        surface.fail_next(SurfaceError::Timeout);
        surface.fail_next(SurfaceError::Lost);
        let frame = FrameRGBA::new(Extent::new(1, 1));
        assert_eq!(surface.present(&frame), Err(SurfaceError::Timeout));
        assert_eq!(surface.present(&frame), Err(SurfaceError::Lost));
        assert_eq!(surface.present(&frame), Ok(()));
    }
}

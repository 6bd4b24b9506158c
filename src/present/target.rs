use crate::foundation::core::Extent;
use crate::foundation::error::{CamflowError, CamflowResult};
use crate::present::surface::{Surface, SurfaceError};
use crate::present::swapchain::SwapChain;
use crate::render::{DrawPass, RenderBackend, ResourceLedger};

/// Outcome of one successful presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Presented {
    pub extent: Extent,
    /// A new swapchain was built for this frame.
    pub rebuilt: bool,
}

/// Bound surface plus the swapchain sized for it.
///
/// The swapchain is built lazily on the render worker, so a resize only has to mark it stale.
/// The native window size wins over the declared one when the two disagree.
pub(crate) struct PresentationTarget {
    surface: Box<dyn Surface>,
    declared: Extent,
    swapchain: Option<SwapChain>,
}

impl PresentationTarget {
    pub(crate) fn new(surface: Box<dyn Surface>, declared: Extent) -> Self {
        Self {
            surface,
            declared,
            swapchain: None,
        }
    }

    /// Apply a window size change; `surface` replaces the bound one when given.
    pub(crate) fn resize(&mut self, surface: Option<Box<dyn Surface>>, declared: Extent) {
        if let Some(surface) = surface {
            self.surface = surface;
        }
        self.declared = declared;
        self.swapchain = None;
    }

    pub(crate) fn desired_extent(&self) -> Extent {
        let native = self.surface.native_extent();
        if native.is_empty() {
            self.declared
        } else {
            native
        }
    }

    /// Draw `pass` into the next swapchain image and present it.
    ///
    /// Returns `Ok(None)` when the target has no area. Presentation failures are transient render
    /// errors; an outdated or lost surface also drops the swapchain so the next frame rebuilds it.
    pub(crate) fn render(
        &mut self,
        backend: &mut dyn RenderBackend,
        pass: &DrawPass<'_>,
        images: u32,
        ledger: &ResourceLedger,
    ) -> CamflowResult<Option<Presented>> {
        let extent = self.desired_extent();
        if extent.is_empty() {
            tracing::trace!("presentation target has no area; skipping frame");
            return Ok(None);
        }

        let mut rebuilt = false;
        if self.swapchain.as_ref().map(SwapChain::extent) != Some(extent) {
            self.swapchain = None;
            if extent != self.declared {
                tracing::debug!(
                    declared = %self.declared,
                    native = %extent,
                    "native surface size overrides declared size"
                );
            }
            self.swapchain = Some(SwapChain::new(extent, images, ledger)?);
            rebuilt = true;
        }
        let Some(chain) = self.swapchain.as_mut() else {
            return Err(CamflowError::render("swapchain unavailable"));
        };

        let image = chain.acquire();
        backend.draw(pass, image)?;
        match self.surface.present(image) {
            Ok(()) => Ok(Some(Presented { extent, rebuilt })),
            Err(SurfaceError::Timeout) => Err(CamflowError::render(
                "presentation timed out; frame skipped",
            )),
            Err(err @ (SurfaceError::Outdated | SurfaceError::Lost)) => {
                self.swapchain = None;
                Err(CamflowError::render(format!(
                    "present failed ({err}); swapchain will be rebuilt"
                )))
            }
        }
    }
}

use crate::foundation::core::Extent;
use crate::foundation::error::{CamflowError, CamflowResult};
use crate::render::{FrameRGBA, ResourceLedger, TrackedResource};

struct SwapImage {
    frame: FrameRGBA,
    _tracked: TrackedResource,
}

/// Fixed-size ring of presentation images, all of one extent.
pub(crate) struct SwapChain {
    extent: Extent,
    images: Vec<SwapImage>,
    next: usize,
}

impl SwapChain {
    pub(crate) fn new(extent: Extent, count: u32, ledger: &ResourceLedger) -> CamflowResult<Self> {
        if extent.is_empty() {
            return Err(CamflowError::validation(format!(
                "cannot build a swapchain for empty extent {extent}"
            )));
        }
        if count == 0 {
            return Err(CamflowError::validation("swapchain needs at least one image"));
        }
        let images = (0..count)
            .map(|_| SwapImage {
                frame: FrameRGBA::new(extent),
                _tracked: ledger.track("swapchain_image"),
            })
            .collect();
        tracing::debug!(%extent, count, "swapchain created");
        Ok(Self {
            extent,
            images,
            next: 0,
        })
    }

    pub(crate) fn extent(&self) -> Extent {
        self.extent
    }

    /// Next image in round-robin order.
    pub(crate) fn acquire(&mut self) -> &mut FrameRGBA {
        let i = self.next;
        self.next = (self.next + 1) % self.images.len();
        &mut self.images[i].frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_rotate_and_are_tracked() {
        let ledger = ResourceLedger::new();
        let mut chain = SwapChain::new(Extent::new(2, 2), 3, &ledger).unwrap();
        assert_eq!(ledger.live(), 3);
        for i in 0..4u8 {
            chain.acquire().data[0] = i;
        }
        // Fourth write landed on the first image again.
        assert_eq!(chain.acquire().data[0], 1);
        drop(chain);
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn empty_extent_is_rejected() {
        let ledger = ResourceLedger::new();
        assert!(SwapChain::new(Extent::new(0, 4), 2, &ledger).is_err());
        assert!(SwapChain::new(Extent::new(4, 4), 0, &ledger).is_err());
        assert_eq!(ledger.live(), 0);
    }
}

use rgfx_core::backend::DeviceBackend;
use rgfx_core::descriptor::{PresentDescriptor, SubmitInfo};
use rgfx_core::{
    BufferHandle, Error, Extent3D, Origin3D, Result, SwapchainHandle,
    TextureHandle, TextureLayout,
};

use crate::command::{CommandEncoder, EncoderInner};
use crate::device::{Device, DeviceInner};
use crate::dispatch::mismatch;

/// The device's single queue.
///
/// Submissions execute in the order they are made. Calls that submit must
/// come from one thread at a time, in the order the work should run.
#[derive(Debug, Clone)]
pub struct Queue {
    device: Device,
}

impl Queue {
    pub(crate) fn new(device: Device) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Ends every encoder still recording and submits them in slice order.
    /// Waits on `info.wait_semaphores` first, then signals
    /// `info.signal_semaphores` and `info.signal_fence` on completion.
    pub fn submit(
        &self,
        encoders: &mut [&mut CommandEncoder],
        info: &SubmitInfo<'_>,
    ) -> Result<()> {
        if let Some(foreign) =
            encoders.iter().find(|e| !e.device().same_device(&self.device))
        {
            return Err(Error::invalid_argument(format!(
                "encoder {:?} was created on another device",
                foreign.label()
            )));
        }
        match self.device.inner() {
            #[cfg(feature = "vulkan")]
            DeviceInner::Vulkan(d) => {
                let mut natives = encoders
                    .iter_mut()
                    .map(|e| match e.inner_mut() {
                        EncoderInner::Vulkan(e) => Ok(e),
                        #[allow(unreachable_patterns)]
                        other => Err(mismatch(
                            rgfx_core::BackendKind::Vulkan,
                            other.backend(),
                        )),
                    })
                    .collect::<Result<Vec<_>>>()?;
                d.submit(&mut natives, info)
            }
            #[cfg(feature = "webgpu")]
            DeviceInner::WebGpu(d) => {
                let mut natives = encoders
                    .iter_mut()
                    .map(|e| match e.inner_mut() {
                        EncoderInner::WebGpu(e) => Ok(e),
                        #[allow(unreachable_patterns)]
                        other => Err(mismatch(
                            rgfx_core::BackendKind::WebGpu,
                            other.backend(),
                        )),
                    })
                    .collect::<Result<Vec<_>>>()?;
                d.submit(&mut natives, info)
            }
        }
    }

    /// Upload `data` into `buffer` at `offset`, ordered before any later
    /// submission.
    pub fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        dispatch!(self.device.inner(), DeviceInner, d => {
            d.write_buffer(buffer, offset, data)
        })
    }

    /// Upload tightly packed texels into one mip level, leaving the
    /// written mip in `final_layout`.
    pub fn write_texture(
        &self,
        texture: TextureHandle,
        origin: Origin3D,
        mip_level: u32,
        data: &[u8],
        extent: Extent3D,
        final_layout: TextureLayout,
    ) -> Result<()> {
        dispatch!(self.device.inner(), DeviceInner, d => {
            d.write_texture(texture, origin, mip_level, data, extent, final_layout)
        })
    }

    pub fn present(
        &self,
        swapchain: SwapchainHandle,
        desc: &PresentDescriptor<'_>,
    ) -> Result<()> {
        self.device.present(swapchain, desc)
    }

    pub fn wait_idle(&self) -> Result<()> {
        dispatch!(self.device.inner(), DeviceInner, d => d.queue_wait_idle())
    }
}

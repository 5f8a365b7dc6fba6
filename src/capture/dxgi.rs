//! DXGI desktop duplication backend
//!
//! Per physical output this backend owns one D3D11 device, one
//! `IDXGIOutputDuplication` and one CPU-readable staging texture. Outputs are
//! keyed by device name (`\\.\DISPLAY1`) so they line up with GDI's names.
//!
//! ```text
//! initialize()                          capture_screen(screen)
//!   teardown every OutputDuplication      sleep(settle_delay)
//!   CreateDXGIFactory1                    AcquireNextFrame(timeout)
//!   └─ EnumAdapters1 ─ EnumOutputs          ├─ WAIT_TIMEOUT → last frame (or Transient)
//!        ├─ D3D11CreateDevice                ├─ ACCESS_LOST  → DisplayTopologyChanged
//!        ├─ DuplicateOutput                  └─ ok → CopyResource → Map → rotate → Unmap
//!        └─ CreateTexture2D (staging)      ReleaseFrame (guard)
//! ```
//!
//! Adapter and output interfaces obtained during enumeration are dropped at
//! the end of each loop iteration, error paths included.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, trace, warn};
use windows::core::Interface;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_UNKNOWN;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D, D3D11_CPU_ACCESS_READ,
    D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_READ, D3D11_SDK_VERSION,
    D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_MODE_ROTATION, DXGI_MODE_ROTATION_ROTATE180, DXGI_MODE_ROTATION_ROTATE270,
    DXGI_MODE_ROTATION_ROTATE90, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, IDXGIAdapter, IDXGIAdapter1, IDXGIFactory1, IDXGIOutput, IDXGIOutput1,
    IDXGIOutputDuplication, IDXGIResource, DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_NOT_FOUND, DXGI_ERROR_WAIT_TIMEOUT,
    DXGI_OUTDUPL_DESC, DXGI_OUTDUPL_FRAME_INFO,
};

use super::encode::rotate_bgra;
use super::{
    CaptureBackendKind, CaptureError, FrameSource, RawFrame, Result, Rotation, ScreenDescriptor, ScreenRect,
    BYTES_PER_PIXEL,
};
use crate::cursor::CursorOverlay;

/// Default `AcquireNextFrame` timeout
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(100);

/// Default pause before each acquisition
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1);

fn map_rotation(rotation: DXGI_MODE_ROTATION) -> Rotation {
    if rotation == DXGI_MODE_ROTATION_ROTATE90 {
        Rotation::Rotate90
    } else if rotation == DXGI_MODE_ROTATION_ROTATE180 {
        Rotation::Rotate180
    } else if rotation == DXGI_MODE_ROTATION_ROTATE270 {
        Rotation::Rotate270
    } else {
        Rotation::Identity
    }
}

fn staging_texture(device: &ID3D11Device, width: u32, height: u32) -> Result<ID3D11Texture2D> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: width,
        Height: height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Usage: D3D11_USAGE_STAGING,
        BindFlags: 0,
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags: 0,
    };
    let mut texture = None;
    // SAFETY: desc is fully initialized; texture receives the new interface.
    unsafe { device.CreateTexture2D(&desc, None, Some(&mut texture)) }
        .map_err(|e| CaptureError::Os(format!("CreateTexture2D(staging) failed: {e}")))?;
    texture.ok_or_else(|| CaptureError::Os("CreateTexture2D returned no texture".into()))
}

/// Everything needed to duplicate one output.
///
/// Field order is release order: children before the objects they came from.
struct OutputDuplication {
    staging: ID3D11Texture2D,
    duplication: IDXGIOutputDuplication,
    context: ID3D11DeviceContext,
    device: ID3D11Device,
    adapter: IDXGIAdapter1,
    descriptor: ScreenDescriptor,
    /// Native (unrotated) texture size
    texture_size: (u32, u32),
    last_frame: Option<RawFrame>,
}

impl OutputDuplication {
    fn open(adapter: &IDXGIAdapter1, output: &IDXGIOutput) -> Result<Self> {
        // SAFETY: output is a live interface from EnumOutputs.
        let desc = unsafe { output.GetDesc() }?;
        if !desc.AttachedToDesktop.as_bool() {
            return Err(CaptureError::Unsupported("output not attached to desktop".into()));
        }

        let base: IDXGIAdapter = adapter.cast()?;
        let mut device = None;
        let mut context = None;
        // SAFETY: out-pointers are valid; D3D_DRIVER_TYPE_UNKNOWN is required with an explicit adapter.
        unsafe {
            D3D11CreateDevice(
                &base,
                D3D_DRIVER_TYPE_UNKNOWN,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
        }
        .map_err(|e| CaptureError::Unsupported(format!("D3D11CreateDevice failed: {e}")))?;
        let device: ID3D11Device = device.ok_or_else(|| CaptureError::Os("no D3D11 device".into()))?;
        let context: ID3D11DeviceContext = context.ok_or_else(|| CaptureError::Os("no D3D11 context".into()))?;

        let output1: IDXGIOutput1 = output.cast()?;
        // SAFETY: device belongs to the adapter that owns this output.
        let duplication = unsafe { output1.DuplicateOutput(&device) }
            .map_err(|e| CaptureError::Unsupported(format!("DuplicateOutput failed: {e}")))?;

        let mut dupl_desc = DXGI_OUTDUPL_DESC::default();
        // SAFETY: dupl_desc is a valid out-parameter.
        unsafe { duplication.GetDesc(&mut dupl_desc) };
        let texture_size = (dupl_desc.ModeDesc.Width, dupl_desc.ModeDesc.Height);
        let staging = staging_texture(&device, texture_size.0, texture_size.1)?;

        let rc = desc.DesktopCoordinates;
        let len = desc.DeviceName.iter().position(|&c| c == 0).unwrap_or(desc.DeviceName.len());
        let descriptor = ScreenDescriptor {
            name: String::from_utf16_lossy(&desc.DeviceName[..len]),
            is_primary: rc.left == 0 && rc.top == 0,
            bounds: ScreenRect::new(rc.left, rc.top, (rc.right - rc.left) as u32, (rc.bottom - rc.top) as u32),
            rotation: map_rotation(desc.Rotation),
        };

        Ok(Self {
            staging,
            duplication,
            context,
            device,
            adapter: adapter.clone(),
            descriptor,
            texture_size,
            last_frame: None,
        })
    }

    /// Release every COM reference, children first
    fn teardown(self) {
        let OutputDuplication {
            staging,
            duplication,
            context,
            device,
            adapter,
            descriptor,
            ..
        } = self;
        drop(staging);
        drop(duplication);
        drop(context);
        drop(device);
        drop(adapter);
        trace!(screen = %descriptor.name, "Output duplication released");
    }

    fn acquire(&mut self, timeout: Duration) -> Result<Option<RawFrame>> {
        let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;
        let timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;

        // SAFETY: info and resource are valid out-parameters.
        match unsafe { self.duplication.AcquireNextFrame(timeout_ms, &mut info, &mut resource) } {
            Ok(()) => {}
            Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => return Ok(None),
            Err(e) if e.code() == DXGI_ERROR_ACCESS_LOST => {
                return Err(CaptureError::DisplayTopologyChanged(format!(
                    "{}: duplication access lost",
                    self.descriptor.name
                )))
            }
            Err(e) => return Err(CaptureError::Transient(format!("AcquireNextFrame failed: {e}"))),
        }

        let _frame = AcquiredFrame(&self.duplication);
        let texture: ID3D11Texture2D = resource
            .ok_or_else(|| CaptureError::Transient("AcquireNextFrame returned no resource".into()))?
            .cast()?;

        let mut desc = D3D11_TEXTURE2D_DESC::default();
        // SAFETY: desc is a valid out-parameter.
        unsafe { texture.GetDesc(&mut desc) };
        if (desc.Width, desc.Height) != self.texture_size {
            debug!(
                screen = %self.descriptor.name,
                width = desc.Width,
                height = desc.Height,
                "Duplicated surface changed size, recreating staging texture"
            );
            self.staging = staging_texture(&self.device, desc.Width, desc.Height)?;
            self.texture_size = (desc.Width, desc.Height);
        }

        // SAFETY: both textures belong to self.device and share format and size.
        unsafe { self.context.CopyResource(&self.staging, &texture) };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        // SAFETY: staging is CPU-readable; mapped is a valid out-parameter.
        unsafe { self.context.Map(&self.staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped)) }
            .map_err(|e| CaptureError::Transient(format!("Map(staging) failed: {e}")))?;
        let _mapping = MappedStaging {
            context: &self.context,
            staging: &self.staging,
        };

        let (width, height) = self.texture_size;
        let pitch = mapped.RowPitch as usize;
        if mapped.pData.is_null() || pitch < width as usize * BYTES_PER_PIXEL {
            return Err(CaptureError::Transient("staging texture mapped without data".into()));
        }
        let len = pitch * (height as usize).saturating_sub(1) + width as usize * BYTES_PER_PIXEL;
        // SAFETY: the mapping covers RowPitch * Height bytes until Unmap in MappedStaging::drop.
        let pixels = unsafe { std::slice::from_raw_parts(mapped.pData.cast::<u8>(), len) };

        rotate_bgra(pixels, width, height, pitch, self.descriptor.rotation).map(Some)
    }
}

/// Releases an acquired duplication frame
struct AcquiredFrame<'a>(&'a IDXGIOutputDuplication);

impl Drop for AcquiredFrame<'_> {
    fn drop(&mut self) {
        // SAFETY: a frame was acquired on this duplication and not yet released.
        if let Err(e) = unsafe { self.0.ReleaseFrame() } {
            trace!("ReleaseFrame failed: {}", e);
        }
    }
}

/// Unmaps the staging texture
struct MappedStaging<'a> {
    context: &'a ID3D11DeviceContext,
    staging: &'a ID3D11Texture2D,
}

impl Drop for MappedStaging<'_> {
    fn drop(&mut self) {
        // SAFETY: subresource 0 was mapped by Map above.
        unsafe { self.context.Unmap(self.staging, 0) };
    }
}

/// Desktop duplication capturer
pub struct DxgiCapturer {
    outputs: HashMap<String, OutputDuplication>,
    order: Vec<String>,
    acquire_timeout: Duration,
    settle_delay: Duration,
    cursor: CursorOverlay,
}

// SAFETY: D3D11 devices and DXGI duplication objects are free-threaded;
// CaptureService serializes all access under its backend lock.
unsafe impl Send for DxgiCapturer {}

impl DxgiCapturer {
    /// Create an uninitialized capturer
    pub fn new(acquire_timeout: Duration, settle_delay: Duration) -> Self {
        Self {
            outputs: HashMap::new(),
            order: Vec::new(),
            acquire_timeout,
            settle_delay,
            cursor: CursorOverlay::new(),
        }
    }

    fn teardown(&mut self) {
        self.order.clear();
        for (_, output) in self.outputs.drain() {
            output.teardown();
        }
    }

    fn enumerate(&mut self) -> Result<()> {
        // SAFETY: plain factory creation.
        let factory: IDXGIFactory1 = unsafe { CreateDXGIFactory1() }?;

        for adapter_index in 0.. {
            // SAFETY: enumeration ends with DXGI_ERROR_NOT_FOUND.
            let adapter = match unsafe { factory.EnumAdapters1(adapter_index) } {
                Ok(adapter) => adapter,
                Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(e) => return Err(CaptureError::Os(format!("EnumAdapters1 failed: {e}"))),
            };

            for output_index in 0.. {
                // SAFETY: enumeration ends with DXGI_ERROR_NOT_FOUND.
                let output = match unsafe { adapter.EnumOutputs(output_index) } {
                    Ok(output) => output,
                    Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                    Err(e) => {
                        warn!(adapter_index, "EnumOutputs failed: {}", e);
                        break;
                    }
                };

                match OutputDuplication::open(&adapter, &output) {
                    Ok(duplication) => {
                        let name = duplication.descriptor.name.clone();
                        debug!(
                            screen = %name,
                            rotation = duplication.descriptor.rotation.degrees(),
                            "Output duplication ready"
                        );
                        self.order.push(name.clone());
                        if let Some(replaced) = self.outputs.insert(name, duplication) {
                            replaced.teardown();
                        }
                    }
                    Err(e) => debug!(adapter_index, output_index, "Skipping output: {}", e),
                }
            }
        }
        Ok(())
    }
}

impl Default for DxgiCapturer {
    fn default() -> Self {
        Self::new(DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_SETTLE_DELAY)
    }
}

impl Drop for DxgiCapturer {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl FrameSource for DxgiCapturer {
    fn kind(&self) -> CaptureBackendKind {
        CaptureBackendKind::Dxgi
    }

    fn initialize(&mut self) -> Result<()> {
        self.teardown();
        if let Err(e) = self.enumerate() {
            self.teardown();
            return Err(e);
        }
        if self.outputs.is_empty() {
            return Err(CaptureError::Unsupported("no output could be duplicated".into()));
        }
        info!(outputs = self.outputs.len(), "DXGI duplication initialized");
        Ok(())
    }

    fn screens(&self) -> Vec<ScreenDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.outputs.get(name))
            .map(|o| o.descriptor.clone())
            .collect()
    }

    fn capture_screen(&mut self, screen: &ScreenDescriptor, draw_cursor: bool) -> Result<RawFrame> {
        let output = self
            .outputs
            .get_mut(&screen.name)
            .ok_or_else(|| CaptureError::DisplayTopologyChanged(format!("{} no longer duplicated", screen.name)))?;

        std::thread::sleep(self.settle_delay);

        let mut frame = match output.acquire(self.acquire_timeout)? {
            Some(frame) => {
                output.last_frame = Some(frame.clone());
                frame
            }
            // no desktop update within the timeout: reuse the previous image
            None => output
                .last_frame
                .clone()
                .ok_or_else(|| CaptureError::Transient("no frame available yet".into()))?,
        };

        if draw_cursor {
            self.cursor.draw_onto_frame(&mut frame, &screen.bounds);
        }
        Ok(frame)
    }
}

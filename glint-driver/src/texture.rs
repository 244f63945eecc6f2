//! Texture manager
//!
//! The device has 230 texture slots (id 0 is the frame buffer itself) and
//! a slow link, so re-sending pixel data every frame is out of the
//! question. The manager caches which images are resident under which
//! slot, tracks loads and unloads since the last sync, and streams only
//! that delta when [`apply_changes`](TextureManager::apply_changes) runs.
//!
//! Image decoding is someone else's job: a [`PixelSource`] hands over
//! ready-made RGB565 buffers by name, and sub-rectangles of a sprite
//! sheet are carved out here.

use alloc::borrow::ToOwned;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use glint_protocol::color::Rgb565;
use glint_protocol::framer::MAX_OPERATION_SIZE;
use glint_protocol::operations::Operation;

use crate::error::GpuError;
use crate::gpu::Gpu;
use crate::transport::GpuTransport;

/// Lowest assignable slot; 0 addresses the frame buffer
pub const FIRST_TEXTURE_ID: u8 = 1;

/// Highest assignable slot
pub const LAST_TEXTURE_ID: u8 = 230;

/// RGB565 is two bytes per pixel
const BYTES_PER_PIXEL: usize = 2;

/// Upper bound for one AppendTexturePixels payload
const TEXTURE_CHUNK_BYTES: usize = 512;

/// Opcode, texture id and byte length in front of every pixel chunk
const APPEND_HEADER_BYTES: usize = 4;

/// Pixels drawn in this color show through to what is underneath
const TRANSPARENCY_KEY: Rgb565 = Rgb565::from_rgb888(255, 0, 255);

/// Errors from the texture layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TextureError {
    /// All 230 slots are occupied
    SlotsExhausted,
    /// The pixel source could not produce the named image
    SourceFailed,
    /// A buffer's byte length disagrees with its dimensions
    InvalidBuffer,
    /// A sub-texture rectangle reaches outside its sprite sheet
    FrameOutOfBounds,
    /// Sending the delta to the device failed
    Gpu(GpuError),
}

impl From<GpuError> for TextureError {
    fn from(e: GpuError) -> Self {
        TextureError::Gpu(e)
    }
}

/// An RGB565 pixel buffer, row-major, 2 bytes per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBuffer {
    pub width: u16,
    pub height: u16,
    pub bytes: Vec<u8>,
}

impl TextureBuffer {
    fn byte_len(&self) -> usize {
        usize::from(self.width) * usize::from(self.height) * BYTES_PER_PIXEL
    }
}

/// External collaborator that loads and decodes image files
pub trait PixelSource {
    /// Produce the named image as an RGB565 buffer
    fn load_rgb565(&mut self, name: &str) -> Result<TextureBuffer, TextureError>;
}

/// A named sub-rectangle of a sprite sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureFrame<'a> {
    /// Sprite sheet name, as the pixel source knows it
    pub sheet: &'a str,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl TextureFrame<'_> {
    /// The cache key this frame is resident under
    fn derived_name(&self) -> String {
        format!(
            "{}___{}_{}_{}_{}",
            self.sheet, self.x, self.y, self.width, self.height
        )
    }
}

/// Where a texture ended up on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TextureInfo {
    pub id: u8,
    pub width: u16,
    pub height: u16,
}

/// Reconciles desired textures against the device's slots
pub struct TextureManager<S: PixelSource> {
    source: S,
    textures: BTreeMap<u8, TextureBuffer>,
    lookup: BTreeMap<String, u8>,
    sprite_sheets: BTreeMap<String, TextureBuffer>,
    added: Vec<u8>,
    removed: Vec<u8>,
    announced_slots: u8,
}

impl<S: PixelSource> TextureManager<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            textures: BTreeMap::new(),
            lookup: BTreeMap::new(),
            sprite_sheets: BTreeMap::new(),
            added: Vec::new(),
            removed: Vec::new(),
            announced_slots: 0,
        }
    }

    /// Make a named image resident; no-op if it already is
    pub fn load(&mut self, name: &str) -> Result<(), TextureError> {
        if self.lookup.contains_key(name) {
            return Ok(());
        }

        let buffer = self.source.load_rgb565(name)?;
        if buffer.bytes.len() != buffer.byte_len() {
            return Err(TextureError::InvalidBuffer);
        }

        self.insert(name.to_owned(), buffer)
    }

    /// Make a sprite sheet sub-rectangle resident, returning its cache key
    ///
    /// The sheet itself is loaded (and kept) on first use; the
    /// sub-rectangle is copied out at 2 bytes per pixel.
    pub fn load_sub_texture(&mut self, frame: &TextureFrame<'_>) -> Result<String, TextureError> {
        let name = frame.derived_name();
        if self.lookup.contains_key(&name) {
            return Ok(name);
        }

        if !self.sprite_sheets.contains_key(frame.sheet) {
            let sheet = self.source.load_rgb565(frame.sheet)?;
            if sheet.bytes.len() != sheet.byte_len() {
                return Err(TextureError::InvalidBuffer);
            }
            self.sprite_sheets.insert(frame.sheet.to_owned(), sheet);
        }

        let sheet = &self.sprite_sheets[frame.sheet];
        if u32::from(frame.x) + u32::from(frame.width) > u32::from(sheet.width)
            || u32::from(frame.y) + u32::from(frame.height) > u32::from(sheet.height)
        {
            return Err(TextureError::FrameOutOfBounds);
        }

        let mut bytes =
            Vec::with_capacity(usize::from(frame.width) * usize::from(frame.height) * BYTES_PER_PIXEL);
        let sheet_stride = usize::from(sheet.width) * BYTES_PER_PIXEL;
        let row_len = usize::from(frame.width) * BYTES_PER_PIXEL;
        for row in 0..usize::from(frame.height) {
            let start = (usize::from(frame.y) + row) * sheet_stride
                + usize::from(frame.x) * BYTES_PER_PIXEL;
            bytes.extend_from_slice(&sheet.bytes[start..start + row_len]);
        }

        let buffer = TextureBuffer {
            width: frame.width,
            height: frame.height,
            bytes,
        };
        self.insert(name.clone(), buffer)?;

        Ok(name)
    }

    /// Evict a texture (or sub-texture, by its derived name)
    ///
    /// The slot is freed for reuse by the very next load; the device is
    /// told on the next sync.
    pub fn unload(&mut self, name: &str) {
        let id = match self.lookup.remove(name) {
            Some(id) => id,
            None => return,
        };
        self.textures.remove(&id);

        // A texture that never reached the device needs no removal sent
        if let Some(index) = self.added.iter().position(|&added| added == id) {
            self.added.remove(index);
        } else {
            self.removed.push(id);
        }
    }

    /// Stream every change since the last sync to the device
    ///
    /// Removals go first (freeing device memory before new definitions),
    /// then each addition as a DefineTexture followed by its pixel chunks.
    /// Everything is queued and flushed once so chunk ordering is
    /// preserved. With no pending changes this sends nothing.
    pub fn apply_changes<T: GpuTransport>(&mut self, gpu: &mut Gpu<T>) -> Result<(), TextureError> {
        if self.removed.is_empty() && self.added.is_empty() {
            return Ok(());
        }

        for id in self.removed.drain(..) {
            let free: Operation = Operation::DefineTexture {
                texture_id: id,
                width: 0,
                height: 0,
                transparent_color: Rgb565::from_rgb888(0, 0, 0),
            };
            gpu.enqueue(&free)?;
        }

        // Grow (never shrink) the device's slot table to cover every live id
        let highest = self.textures.keys().next_back().copied().unwrap_or(0);
        if highest > self.announced_slots {
            let count: Operation = Operation::SetTextureCount { count: highest };
            gpu.enqueue(&count)?;
            self.announced_slots = highest;
        }

        let chunk_len = chunk_payload_len(gpu.max_op_bytes());
        for id in self.added.drain(..) {
            let texture = &self.textures[&id];
            let define: Operation = Operation::DefineTexture {
                texture_id: id,
                width: texture.width,
                height: texture.height,
                transparent_color: TRANSPARENCY_KEY,
            };
            gpu.enqueue(&define)?;

            for chunk in texture.bytes.chunks(chunk_len) {
                let append: Operation = Operation::AppendTexturePixels {
                    texture_id: id,
                    pixel_bytes: chunk,
                };
                gpu.enqueue(&append)?;
            }
        }

        gpu.flush_queued()?;
        Ok(())
    }

    /// Slot and dimensions of a resident texture
    pub fn texture_info(&self, name: &str) -> Option<TextureInfo> {
        let id = *self.lookup.get(name)?;
        let texture = self.textures.get(&id)?;
        Some(TextureInfo {
            id,
            width: texture.width,
            height: texture.height,
        })
    }

    /// Slot and dimensions of a resident sub-texture
    pub fn frame_info(&self, frame: &TextureFrame<'_>) -> Option<TextureInfo> {
        self.texture_info(&frame.derived_name())
    }

    fn insert(&mut self, name: String, buffer: TextureBuffer) -> Result<(), TextureError> {
        let id = self.next_free_id()?;
        self.textures.insert(id, buffer);
        self.lookup.insert(name, id);
        self.added.push(id);
        Ok(())
    }

    /// Lowest free slot id
    fn next_free_id(&self) -> Result<u8, TextureError> {
        (FIRST_TEXTURE_ID..=LAST_TEXTURE_ID)
            .find(|id| !self.textures.contains_key(id))
            .ok_or(TextureError::SlotsExhausted)
    }
}

/// Pixel bytes per AppendTexturePixels, honoring the frame size cap and
/// the device's negotiated operation byte limit; always whole pixels
fn chunk_payload_len(max_op_bytes: u16) -> usize {
    let frame_cap = MAX_OPERATION_SIZE - APPEND_HEADER_BYTES;
    let negotiated = if max_op_bytes == 0 {
        frame_cap
    } else {
        usize::from(max_op_bytes).saturating_sub(APPEND_HEADER_BYTES)
    };
    TEXTURE_CHUNK_BYTES.min(frame_cap).min(negotiated) & !1
}

//! Operations the host can request from the GPU
//!
//! Every operation is a fixed big-endian layout behind a one-byte opcode.
//! Variable-length payloads (text, pixel data) are length-prefixed and
//! borrowed, so building an operation never copies or allocates; the bytes
//! are read once when the operation is encoded for the wire.
//!
//! Operations come in two kinds: fire-and-forget (no reply) and responsive
//! (a typed reply follows, see [`crate::responses`]). Responsive operations
//! must be sent on a transport's immediate path so a reply is never matched
//! against the wrong request.

use crate::color::{ColorFormat, Rgb565};

// Opcodes, byte 0 of every operation payload
pub const OP_INITIALIZE: u8 = 1;
pub const OP_DRAW_RECTANGLE: u8 = 2;
pub const OP_DRAW_TRIANGLE: u8 = 3;
pub const OP_GET_STATUS: u8 = 4;
pub const OP_GET_LAST_MESSAGE: u8 = 5;
pub const OP_PRESENT_FRAMEBUFFER: u8 = 6;
pub const OP_BATCH: u8 = 7;
pub const OP_SET_TEXTURE_COUNT: u8 = 8;
pub const OP_DEFINE_TEXTURE: u8 = 9;
pub const OP_APPEND_TEXTURE_PIXELS: u8 = 10;
pub const OP_DRAW_TEXTURE: u8 = 11;
pub const OP_DRAW_CHARS: u8 = 12;
pub const OP_RESET: u8 = 189;

/// Magic bytes that must follow [`OP_RESET`] so a corrupted read cannot
/// reset the device by accident
pub const RESET_MAGIC: [u8; 3] = [0x09, 0x13, 0xAC];

/// Longest text a single [`Operation::DrawChars`] can carry
pub const MAX_DRAW_CHARS: usize = 255;

/// Errors that can occur while serializing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// Output buffer is smaller than [`Operation::encoded_len`]
    BufferTooSmall,
    /// DrawChars text exceeds [`MAX_DRAW_CHARS`] bytes
    TextTooLong,
}

/// Fonts baked into GPU firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Font {
    Font8x12 = 5,
    Font12x16 = 7,
}

impl Font {
    /// Glyph width in pixels
    pub fn char_width(self) -> u16 {
        match self {
            Font::Font8x12 => 8,
            Font::Font12x16 => 12,
        }
    }

    /// Glyph height in pixels
    pub fn char_height(self) -> u16 {
        match self {
            Font::Font8x12 => 12,
            Font::Font12x16 => 16,
        }
    }
}

/// A drawing or control operation, ready to encode for the wire
///
/// Generic over the color format the device was negotiated into; RGB565 is
/// the default and currently the only one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Operation<'a, C: ColorFormat = Rgb565> {
    /// Allocate the frame buffer and become drawable
    ///
    /// `frame_buffer_scale` divides the display resolution; the device
    /// upscales on present.
    Initialize { frame_buffer_scale: u8 },
    /// Fill an axis-aligned rectangle on a texture (0 = frame buffer)
    DrawRectangle {
        texture_id: u8,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        color: C,
    },
    /// Fill an arbitrary triangle on a texture (0 = frame buffer)
    DrawTriangle {
        texture_id: u8,
        x0: u16,
        y0: u16,
        x1: u16,
        y1: u16,
        x2: u16,
        y2: u16,
        color: C,
    },
    /// Ask for the device capability/state snapshot (responsive)
    GetStatus,
    /// Ask for the device's last diagnostic message (responsive)
    GetLastMessage,
    /// Swap the frame buffer to the display
    PresentFramebuffer,
    /// Several operations packed into one payload, see
    /// [`crate::batch::BatchPacker`]
    Batch { bytes: &'a [u8] },
    /// Declare how many texture slots the device should reserve
    SetTextureCount { count: u8 },
    /// Allocate or resize a texture slot; width and height of 0 frees it
    DefineTexture {
        texture_id: u8,
        width: u16,
        height: u16,
        transparent_color: C,
    },
    /// Stream pixel data into a previously defined texture
    AppendTexturePixels {
        texture_id: u8,
        pixel_bytes: &'a [u8],
    },
    /// Blit a texture rectangle onto another texture (or the frame buffer)
    ///
    /// Destination coordinates are signed; placing a source partly or fully
    /// off-target is legal and clipped by the device.
    DrawTexture {
        source_texture_id: u8,
        target_texture_id: u8,
        source_x: u16,
        source_y: u16,
        source_width: u16,
        source_height: u16,
        target_x: i16,
        target_y: i16,
        ignore_transparency: bool,
    },
    /// Render ASCII text with a firmware font
    DrawChars {
        font: Font,
        texture_id: u8,
        color: C,
        x: u16,
        y: u16,
        text: &'a str,
    },
    /// Soft-reset the device (guarded by magic bytes)
    Reset,
}

impl<'a, C: ColorFormat> Operation<'a, C> {
    /// The opcode this operation encodes behind
    pub fn opcode(&self) -> u8 {
        match self {
            Operation::Initialize { .. } => OP_INITIALIZE,
            Operation::DrawRectangle { .. } => OP_DRAW_RECTANGLE,
            Operation::DrawTriangle { .. } => OP_DRAW_TRIANGLE,
            Operation::GetStatus => OP_GET_STATUS,
            Operation::GetLastMessage => OP_GET_LAST_MESSAGE,
            Operation::PresentFramebuffer => OP_PRESENT_FRAMEBUFFER,
            Operation::Batch { .. } => OP_BATCH,
            Operation::SetTextureCount { .. } => OP_SET_TEXTURE_COUNT,
            Operation::DefineTexture { .. } => OP_DEFINE_TEXTURE,
            Operation::AppendTexturePixels { .. } => OP_APPEND_TEXTURE_PIXELS,
            Operation::DrawTexture { .. } => OP_DRAW_TEXTURE,
            Operation::DrawChars { .. } => OP_DRAW_CHARS,
            Operation::Reset => OP_RESET,
        }
    }

    /// True when the device answers this operation with a response frame
    pub fn expects_response(&self) -> bool {
        matches!(self, Operation::GetStatus | Operation::GetLastMessage)
    }

    /// Exact number of bytes [`encode`](Self::encode) will produce
    ///
    /// The batch packer and the framer's capacity checks rely on this never
    /// under-reporting.
    pub fn encoded_len(&self) -> usize {
        match self {
            Operation::Initialize { .. } => 2,
            Operation::DrawRectangle { color, .. } => 10 + color.encoded_size(),
            Operation::DrawTriangle { color, .. } => 14 + color.encoded_size(),
            Operation::GetStatus => 1,
            Operation::GetLastMessage => 1,
            Operation::PresentFramebuffer => 1,
            Operation::Batch { bytes } => 3 + bytes.len(),
            Operation::SetTextureCount { .. } => 2,
            Operation::DefineTexture {
                transparent_color, ..
            } => 6 + transparent_color.encoded_size(),
            Operation::AppendTexturePixels { pixel_bytes, .. } => 4 + pixel_bytes.len(),
            Operation::DrawTexture { .. } => 16,
            Operation::DrawChars { color, text, .. } => 8 + color.encoded_size() + text.len(),
            Operation::Reset => 4,
        }
    }

    /// Serialize into `out`, returning the number of bytes written
    ///
    /// Network byte order throughout.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, EncodeError> {
        let size = self.encoded_len();
        if out.len() < size {
            return Err(EncodeError::BufferTooSmall);
        }

        out[0] = self.opcode();
        match self {
            Operation::Initialize { frame_buffer_scale } => {
                out[1] = *frame_buffer_scale;
            }
            Operation::DrawRectangle {
                texture_id,
                x,
                y,
                width,
                height,
                color,
            } => {
                out[1] = *texture_id;
                out[2..4].copy_from_slice(&x.to_be_bytes());
                out[4..6].copy_from_slice(&y.to_be_bytes());
                out[6..8].copy_from_slice(&width.to_be_bytes());
                out[8..10].copy_from_slice(&height.to_be_bytes());
                color.write_bytes(&mut out[10..]);
            }
            Operation::DrawTriangle {
                texture_id,
                x0,
                y0,
                x1,
                y1,
                x2,
                y2,
                color,
            } => {
                out[1] = *texture_id;
                out[2..4].copy_from_slice(&x0.to_be_bytes());
                out[4..6].copy_from_slice(&y0.to_be_bytes());
                out[6..8].copy_from_slice(&x1.to_be_bytes());
                out[8..10].copy_from_slice(&y1.to_be_bytes());
                out[10..12].copy_from_slice(&x2.to_be_bytes());
                out[12..14].copy_from_slice(&y2.to_be_bytes());
                color.write_bytes(&mut out[14..]);
            }
            Operation::GetStatus
            | Operation::GetLastMessage
            | Operation::PresentFramebuffer => {}
            Operation::Batch { bytes } => {
                out[1..3].copy_from_slice(&(bytes.len() as u16).to_be_bytes());
                out[3..3 + bytes.len()].copy_from_slice(bytes);
            }
            Operation::SetTextureCount { count } => {
                out[1] = *count;
            }
            Operation::DefineTexture {
                texture_id,
                width,
                height,
                transparent_color,
            } => {
                out[1] = *texture_id;
                out[2..4].copy_from_slice(&width.to_be_bytes());
                out[4..6].copy_from_slice(&height.to_be_bytes());
                transparent_color.write_bytes(&mut out[6..]);
            }
            Operation::AppendTexturePixels {
                texture_id,
                pixel_bytes,
            } => {
                out[1] = *texture_id;
                out[2..4].copy_from_slice(&(pixel_bytes.len() as u16).to_be_bytes());
                out[4..4 + pixel_bytes.len()].copy_from_slice(pixel_bytes);
            }
            Operation::DrawTexture {
                source_texture_id,
                target_texture_id,
                source_x,
                source_y,
                source_width,
                source_height,
                target_x,
                target_y,
                ignore_transparency,
            } => {
                out[1] = *source_texture_id;
                out[2] = *target_texture_id;
                out[3..5].copy_from_slice(&source_x.to_be_bytes());
                out[5..7].copy_from_slice(&source_y.to_be_bytes());
                out[7..9].copy_from_slice(&source_width.to_be_bytes());
                out[9..11].copy_from_slice(&source_height.to_be_bytes());
                out[11..13].copy_from_slice(&target_x.to_be_bytes());
                out[13..15].copy_from_slice(&target_y.to_be_bytes());
                out[15] = u8::from(*ignore_transparency);
            }
            Operation::DrawChars {
                font,
                texture_id,
                color,
                x,
                y,
                text,
            } => {
                if text.len() > MAX_DRAW_CHARS {
                    return Err(EncodeError::TextTooLong);
                }
                out[1] = *font as u8;
                out[2] = *texture_id;
                let mut index = 3;
                index += color.write_bytes(&mut out[3..]);
                out[index..index + 2].copy_from_slice(&x.to_be_bytes());
                out[index + 2..index + 4].copy_from_slice(&y.to_be_bytes());
                out[index + 4] = text.len() as u8;
                out[index + 5..index + 5 + text.len()].copy_from_slice(text.as_bytes());
            }
            Operation::Reset => {
                out[1..4].copy_from_slice(&RESET_MAGIC);
            }
        }

        Ok(size)
    }
}

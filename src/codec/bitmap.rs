//! WebP to 32bpp bitmap transcoding
//!
//! Layout of the produced file (little-endian throughout):
//!
//! | offset | size | content                                   |
//! |--------|------|-------------------------------------------|
//! | 0      | 14   | file header                               |
//! | 14     | 124  | V5 info header                            |
//! | 138    | 12   | blue, green, red channel masks (RGBQUAD)  |
//! | 150    | ...  | BGRA pixel rows, top-down                 |

use super::{CodecError, function_error};
use super::functions::bytes_arg;
use byteorder::{LittleEndian, WriteBytesExt};
use image_webp::WebPDecoder;
use rusqlite::functions::Context;
use rusqlite::types::Value;
use std::io::{self, Cursor};

pub const FILE_HEADER_SIZE: usize = 14;
pub const INFO_HEADER_SIZE: usize = 124;
pub const COLOR_MASKS_SIZE: usize = 12;
/// Bytes before the first pixel row
pub const HEADERS_SIZE: usize = FILE_HEADER_SIZE + INFO_HEADER_SIZE + COLOR_MASKS_SIZE;

const BITMAP_SIGNATURE: u16 = 0x4D42; // "BM"
const BI_BITFIELDS: u32 = 3;
const LCS_WINDOWS_COLOR_SPACE: u32 = 0x5769_6E20; // "Win "
const PELS_PER_METER_96DPI: i32 = 3780;

const RED_MASK: u32 = 0x00FF_0000;
const GREEN_MASK: u32 = 0x0000_FF00;
const BLUE_MASK: u32 = 0x0000_00FF;
const ALPHA_MASK: u32 = 0xFF00_0000;

/// Round `value` up to a multiple of `alignment` (a power of two)
pub fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

struct FileHeader {
    file_size: u32,
    pixel_offset: u32,
}

impl FileHeader {
    fn write_to(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.write_u16::<LittleEndian>(BITMAP_SIGNATURE)?;
        out.write_u32::<LittleEndian>(self.file_size)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(self.pixel_offset)
    }
}

struct InfoHeaderV5 {
    width: i32,
    /// Negative for top-down row order
    height: i32,
    image_size: u32,
}

impl InfoHeaderV5 {
    fn write_to(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.write_u32::<LittleEndian>(INFO_HEADER_SIZE as u32)?;
        out.write_i32::<LittleEndian>(self.width)?;
        out.write_i32::<LittleEndian>(self.height)?;
        out.write_u16::<LittleEndian>(1)?; // planes
        out.write_u16::<LittleEndian>(32)?; // bits per pixel
        out.write_u32::<LittleEndian>(BI_BITFIELDS)?;
        out.write_u32::<LittleEndian>(self.image_size)?;
        out.write_i32::<LittleEndian>(PELS_PER_METER_96DPI)?;
        out.write_i32::<LittleEndian>(PELS_PER_METER_96DPI)?;
        out.write_u32::<LittleEndian>(0)?; // colors used
        out.write_u32::<LittleEndian>(0)?; // colors important
        out.write_u32::<LittleEndian>(RED_MASK)?;
        out.write_u32::<LittleEndian>(GREEN_MASK)?;
        out.write_u32::<LittleEndian>(BLUE_MASK)?;
        out.write_u32::<LittleEndian>(ALPHA_MASK)?;
        out.write_u32::<LittleEndian>(LCS_WINDOWS_COLOR_SPACE)?;
        // endpoints (36), gamma (12), intent, profile data, profile size, reserved
        for _ in 0..(36 + 12 + 16) / 4 {
            out.write_u32::<LittleEndian>(0)?;
        }
        Ok(())
    }
}

/// RGBQUAD entries in blue, green, red order
fn write_color_masks(out: &mut Vec<u8>) -> io::Result<()> {
    for quad in [[0xFFu8, 0, 0, 0], [0, 0xFF, 0, 0], [0, 0, 0xFF, 0]] {
        out.extend_from_slice(&quad);
    }
    Ok(())
}

fn write_headers(out: &mut Vec<u8>, file_header: &FileHeader, info_header: &InfoHeaderV5) -> io::Result<()> {
    file_header.write_to(out)?;
    info_header.write_to(out)?;
    write_color_masks(out)
}

/// Decode a WebP image into a top-down 32bpp BGRA bitmap file
pub fn webp_to_bitmap(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = WebPDecoder::new(Cursor::new(data))
        .map_err(|e| CodecError::InvalidImageHeader(e.to_string()))?;

    let (width, height) = decoder.dimensions();
    let too_large = || CodecError::ImageTooLarge { width, height };
    let stride = align_up(width as usize * 4, 4);
    let image_size = stride.checked_mul(height as usize).ok_or_else(too_large)?;
    let file_size = image_size.checked_add(HEADERS_SIZE).ok_or_else(too_large)?;
    if file_size > u32::MAX as usize || width > i32::MAX as u32 || height > i32::MAX as u32 {
        return Err(too_large());
    }

    let channels = if decoder.has_alpha() { 4 } else { 3 };
    let mut pixels = vec![0u8; decoder.output_buffer_size().ok_or_else(too_large)?];
    decoder
        .read_image(&mut pixels)
        .map_err(|e| CodecError::ImageDecode(e.to_string()))?;

    let file_header = FileHeader { file_size: file_size as u32, pixel_offset: HEADERS_SIZE as u32 };
    let info_header = InfoHeaderV5 { width: width as i32, height: -(height as i32), image_size: image_size as u32 };
    let mut out = Vec::with_capacity(file_size);
    write_headers(&mut out, &file_header, &info_header).map_err(|e| CodecError::ImageDecode(e.to_string()))?;
    debug_assert_eq!(out.len(), HEADERS_SIZE);

    let row_len = width as usize * channels;
    for row in pixels.chunks_exact(row_len.max(1)).take(height as usize) {
        let start = out.len();
        for pixel in row.chunks_exact(channels) {
            let alpha = if channels == 4 { pixel[3] } else { 0xFF };
            out.extend_from_slice(&[pixel[2], pixel[1], pixel[0], alpha]);
        }
        out.resize(start + stride, 0);
    }

    if out.len() != file_size {
        return Err(CodecError::ImageDecode(format!(
            "decoded {} bytes, expected {}",
            out.len() - HEADERS_SIZE,
            image_size
        )));
    }
    Ok(out)
}

pub(super) fn sql_webpdecode(ctx: &Context<'_>) -> rusqlite::Result<Value> {
    match bytes_arg(ctx, 0) {
        Some(data) if !data.is_empty() => webp_to_bitmap(&data).map(Value::Blob).map_err(function_error),
        _ => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::register_functions;
    use image_webp::{ColorType, WebPEncoder};
    use rusqlite::Connection;

    fn encode_webp(width: u32, height: u32, color: ColorType) -> Vec<u8> {
        let channels = match color {
            ColorType::Rgba8 => 4,
            _ => 3,
        };
        let pixels: Vec<u8> = (0..width * height * channels).map(|i| (i % 251) as u8).collect();
        let mut out = Vec::new();
        WebPEncoder::new(&mut out).encode(&pixels, width, height, color).unwrap();
        out
    }

    fn read_u32(data: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
    }

    fn read_i32(data: &[u8], offset: usize) -> i32 {
        i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(5, 4), 8);
        assert_eq!(align_up(12, 4), 12);
    }

    #[test]
    fn test_bitmap_length_and_headers() {
        let (width, height) = (7, 5);
        let bitmap = webp_to_bitmap(&encode_webp(width, height, ColorType::Rgba8)).unwrap();

        let stride = align_up(width as usize * 4, 4);
        assert_eq!(bitmap.len(), HEADERS_SIZE + stride * height as usize);
        assert_eq!(&bitmap[0..2], b"BM");
        assert_eq!(read_u32(&bitmap, 2) as usize, bitmap.len());
        assert_eq!(read_u32(&bitmap, 10) as usize, HEADERS_SIZE);
        assert_eq!(read_u32(&bitmap, 14) as usize, INFO_HEADER_SIZE);
        assert_eq!(read_i32(&bitmap, 18), width as i32);
        assert_eq!(read_i32(&bitmap, 22), -(height as i32));
        assert_eq!(read_u32(&bitmap, 30), BI_BITFIELDS);
        assert_eq!(read_u32(&bitmap, 54), RED_MASK);
        assert_eq!(read_u32(&bitmap, 66), ALPHA_MASK);
        assert_eq!(&bitmap[138..150], &[0xFF, 0, 0, 0, 0, 0xFF, 0, 0, 0, 0, 0xFF, 0]);
    }

    #[test]
    fn test_bitmap_pixels_are_bgra() {
        let webp = encode_webp(2, 1, ColorType::Rgba8);
        let bitmap = webp_to_bitmap(&webp).unwrap();
        // lossless encoding keeps the source pixels: (0,1,2,3) and (4,5,6,7)
        assert_eq!(&bitmap[HEADERS_SIZE..], &[2, 1, 0, 3, 6, 5, 4, 7]);
    }

    #[test]
    fn test_opaque_image_gets_full_alpha() {
        let bitmap = webp_to_bitmap(&encode_webp(3, 2, ColorType::Rgb8)).unwrap();
        assert_eq!(bitmap.len(), HEADERS_SIZE + 12 * 2);
        assert!(bitmap[HEADERS_SIZE..].chunks(4).all(|px| px[3] == 0xFF));
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let err = webp_to_bitmap(b"definitely not a webp image").unwrap_err();
        assert!(matches!(err, CodecError::InvalidImageHeader(_)));
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let webp = encode_webp(16, 16, ColorType::Rgba8);
        assert!(webp_to_bitmap(&webp[..webp.len() / 2]).is_err());
    }

    #[test]
    fn test_sql_webpdecode() {
        let conn = Connection::open_in_memory().unwrap();
        register_functions(&conn).unwrap();

        let webp = encode_webp(4, 4, ColorType::Rgb8);
        let len: i64 = conn
            .query_row("SELECT length(webpdecode(?1))", [&webp], |row| row.get(0))
            .unwrap();
        assert_eq!(len as usize, HEADERS_SIZE + 16 * 4);

        let null: Option<Vec<u8>> = conn.query_row("SELECT webpdecode(NULL)", [], |row| row.get(0)).unwrap();
        assert!(null.is_none());

        let bad = conn.query_row("SELECT webpdecode(x'00010203')", [], |row| row.get::<_, Vec<u8>>(0));
        assert!(bad.unwrap_err().to_string().contains("invalid webp header"));
    }
}

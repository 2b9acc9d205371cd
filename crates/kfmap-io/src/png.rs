use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use kfmap_image::{Image, ImageSize};
use png::{BitDepth, ColorType, Decoder, Encoder};

use crate::error::IoError;

/// Read a PNG image with three channels (rgb8).
///
/// # Arguments
///
/// * `file_path` - The path to the PNG file.
pub fn read_image_png_rgb8(file_path: impl AsRef<Path>) -> Result<Image<u8, 3>, IoError> {
    let (buf, size, color, depth) = read_png_impl(file_path)?;
    if color != ColorType::Rgb || depth != BitDepth::Eight {
        return Err(IoError::PngDecodeError(format!(
            "expected rgb8 data, got {color:?}/{depth:?}"
        )));
    }
    Ok(Image::new(size, buf)?)
}

/// Read a PNG image with a single channel of 16 bits (mono16).
///
/// # Arguments
///
/// * `file_path` - The path to the PNG file.
pub fn read_image_png_mono16(file_path: impl AsRef<Path>) -> Result<Image<u16, 1>, IoError> {
    let (buf, size, color, depth) = read_png_impl(file_path)?;
    if color != ColorType::Grayscale || depth != BitDepth::Sixteen {
        return Err(IoError::PngDecodeError(format!(
            "expected mono16 data, got {color:?}/{depth:?}"
        )));
    }
    Ok(Image::new(size, convert_buf_u8_u16(buf))?)
}

/// Write a PNG image with three channels (rgb8).
///
/// # Arguments
///
/// * `file_path` - The path to the PNG file.
/// * `image` - The image to write.
pub fn write_image_png_rgb8(
    file_path: impl AsRef<Path>,
    image: &Image<u8, 3>,
) -> Result<(), IoError> {
    write_png_impl(
        file_path,
        image.size(),
        ColorType::Rgb,
        BitDepth::Eight,
        image.as_slice(),
    )
}

/// Write a PNG image with a single channel of 16 bits (mono16).
///
/// # Arguments
///
/// * `file_path` - The path to the PNG file.
/// * `image` - The image to write.
pub fn write_image_png_mono16(
    file_path: impl AsRef<Path>,
    image: &Image<u16, 1>,
) -> Result<(), IoError> {
    let buf = convert_buf_u16_u8(image.as_slice());
    write_png_impl(
        file_path,
        image.size(),
        ColorType::Grayscale,
        BitDepth::Sixteen,
        &buf,
    )
}

fn read_png_impl(
    file_path: impl AsRef<Path>,
) -> Result<(Vec<u8>, ImageSize, ColorType, BitDepth), IoError> {
    let file_path = file_path.as_ref();
    if !file_path.exists() {
        return Err(IoError::FileDoesNotExist(file_path.to_path_buf()));
    }

    let file = File::open(file_path)?;
    let decoder = Decoder::new(BufReader::new(file));
    let mut reader = decoder
        .read_info()
        .map_err(|e| IoError::PngDecodeError(e.to_string()))?;

    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| IoError::PngDecodeError(e.to_string()))?;
    buf.truncate(info.buffer_size());

    let size = ImageSize {
        width: info.width as usize,
        height: info.height as usize,
    };

    Ok((buf, size, info.color_type, info.bit_depth))
}

fn write_png_impl(
    file_path: impl AsRef<Path>,
    size: ImageSize,
    color: ColorType,
    depth: BitDepth,
    data: &[u8],
) -> Result<(), IoError> {
    let file = File::create(file_path)?;
    let mut encoder = Encoder::new(BufWriter::new(file), size.width as u32, size.height as u32);
    encoder.set_color(color);
    encoder.set_depth(depth);

    let mut writer = encoder
        .write_header()
        .map_err(|e| IoError::PngEncodingError(e.to_string()))?;
    writer
        .write_image_data(data)
        .map_err(|e| IoError::PngEncodingError(e.to_string()))?;

    Ok(())
}

/// Utility function to convert 16-bit `Vec<u8>` to `Vec<u16>`.
fn convert_buf_u8_u16(buf: Vec<u8>) -> Vec<u16> {
    let mut buf_u16 = Vec::with_capacity(buf.len() / 2);
    for chunk in buf.chunks_exact(2) {
        buf_u16.push(u16::from_be_bytes([chunk[0], chunk[1]]));
    }

    buf_u16
}

/// Utility function to convert `&[u16]` to a 16-bit `Vec<u8>`.
fn convert_buf_u16_u8(buf: &[u16]) -> Vec<u8> {
    let mut buf_u8 = Vec::with_capacity(buf.len() * 2);
    for val in buf {
        buf_u8.extend_from_slice(&val.to_be_bytes());
    }

    buf_u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use kfmap_image::ImageSize;

    #[test]
    fn rgb8_roundtrip() -> Result<(), IoError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("image.png");

        let size = ImageSize {
            width: 3,
            height: 2,
        };
        let data: Vec<u8> = (0..18).collect();
        let image = Image::<u8, 3>::new(size, data)?;

        write_image_png_rgb8(&path, &image)?;
        let loaded = read_image_png_rgb8(&path)?;

        assert_eq!(loaded.size(), size);
        assert_eq!(loaded.as_slice(), image.as_slice());
        Ok(())
    }

    #[test]
    fn mono16_roundtrip() -> Result<(), IoError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("depth.png");

        let size = ImageSize {
            width: 2,
            height: 2,
        };
        let image = Image::<u16, 1>::new(size, vec![0, 1000, 65535, 42])?;

        write_image_png_mono16(&path, &image)?;
        let loaded = read_image_png_mono16(&path)?;

        assert_eq!(loaded.size(), size);
        assert_eq!(loaded.as_slice(), image.as_slice());
        Ok(())
    }

    #[test]
    fn read_missing_file_fails() {
        let res = read_image_png_rgb8("/nonexistent/missing.png");
        assert!(matches!(res, Err(IoError::FileDoesNotExist(_))));
    }
}

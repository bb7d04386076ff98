use athena_tonic_core::proto::ImageFormat;

/// Detects an encoded image format from its leading magic bytes.
///
/// Returns [`ImageFormat::Unspecified`] for empty or unrecognised data.
pub fn detect_image_format(data: &[u8]) -> ImageFormat {
    match data {
        [0x89, b'P', b'N', b'G', ..] => ImageFormat::Png,
        [0xFF, 0xD8, 0xFF, ..] => ImageFormat::Jpeg,
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => ImageFormat::Gif,
        [b'B', b'M', ..] => ImageFormat::Bmp,
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => ImageFormat::Webp,
        [b'I', b'I', b'*', 0x00, ..] | [b'M', b'M', 0x00, b'*', ..] => ImageFormat::Tiff,
        _ => ImageFormat::Unspecified,
    }
}

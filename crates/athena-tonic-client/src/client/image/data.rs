use super::format::detect_image_format;
use athena_tonic_core::{
    ClassificationItem,
    proto::{HashType, ImageFormat, ImageHash, RequestEncoding},
};
use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Encoded image bytes plus the digests of every version they went through.
///
/// Creation records one SHA-256 and one MD5 digest of the original bytes.
/// Transforms that change the visual content (resizing, format conversion)
/// call [`ImageData::add_transformation_hashes`] after replacing the data;
/// lossless re-encodings keep the existing chain. Chains are oldest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    data: Bytes,
    format: ImageFormat,
    sha256_hashes: Vec<String>,
    md5_hashes: Vec<String>,
}

impl ImageData {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let format = detect_image_format(&data);
        let mut image = Self {
            data,
            format,
            sha256_hashes: Vec::with_capacity(1),
            md5_hashes: Vec::with_capacity(1),
        };
        image.add_transformation_hashes();
        image
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub const fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn sha256_hashes(&self) -> &[String] {
        &self.sha256_hashes
    }

    pub fn md5_hashes(&self) -> &[String] {
        &self.md5_hashes
    }

    /// Swaps in new bytes and re-detects the format. The hash chain is left
    /// untouched.
    pub fn replace_data(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
        self.format = detect_image_format(&self.data);
    }

    /// Overrides the detected format, e.g. for raw pixel buffers.
    pub fn set_format(&mut self, format: ImageFormat) {
        self.format = format;
    }

    /// Appends digests of the current bytes to both chains.
    pub fn add_transformation_hashes(&mut self) {
        self.sha256_hashes
            .push(hex::encode(Sha256::digest(&self.data)));
        self.md5_hashes
            .push(format!("{:x}", md5::compute(&self.data)));
    }

    /// Builds the wire item, carrying the MD5 chain as provenance hashes.
    pub fn into_input(
        self,
        affiliate: impl Into<String>,
        correlation_id: impl Into<String>,
        encoding: RequestEncoding,
    ) -> ClassificationItem {
        let hashes = self
            .md5_hashes
            .into_iter()
            .map(|value| ImageHash {
                value,
                r#type: HashType::Md5 as i32,
            })
            .collect();

        ClassificationItem {
            affiliate: affiliate.into(),
            correlation_id: correlation_id.into(),
            encoding: encoding as i32,
            data: self.data,
            format: self.format as i32,
            hashes,
        }
    }
}

impl From<Vec<u8>> for ImageData {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<Bytes> for ImageData {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nrest-of-image";

    #[test]
    fn creation_records_one_digest_of_each_kind() {
        let image = ImageData::new(Bytes::from_static(b"abc"));
        assert_eq!(
            image.sha256_hashes(),
            ["ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"]
        );
        assert_eq!(image.md5_hashes(), ["900150983cd24fb0d6963f7d28e17f72"]);
        assert_eq!(image.format(), ImageFormat::Unspecified);
    }

    #[test]
    fn transformations_extend_the_chain_oldest_first() {
        let mut image = ImageData::new(Bytes::from_static(PNG));
        assert_eq!(image.format(), ImageFormat::Png);
        let original = image.md5_hashes()[0].clone();

        image.replace_data(Bytes::from_static(b"\xFF\xD8\xFFresized"));
        assert_eq!(image.format(), ImageFormat::Jpeg);
        assert_eq!(image.md5_hashes().len(), 1);

        image.add_transformation_hashes();
        assert_eq!(image.md5_hashes().len(), 2);
        assert_eq!(image.sha256_hashes().len(), 2);
        assert_eq!(image.md5_hashes()[0], original);
        assert_ne!(image.md5_hashes()[1], original);
    }

    #[test]
    fn into_input_carries_md5_chain() {
        let mut image = ImageData::new(Bytes::from_static(PNG));
        image.add_transformation_hashes();
        let md5 = image.md5_hashes().to_vec();

        let input = image.into_input("affiliate-1", "corr-1", RequestEncoding::Uncompressed);
        assert_eq!(input.affiliate, "affiliate-1");
        assert_eq!(input.correlation_id, "corr-1");
        assert_eq!(input.encoding, RequestEncoding::Uncompressed as i32);
        assert_eq!(input.format, ImageFormat::Png as i32);
        assert_eq!(input.data.as_ref(), PNG);

        let values: Vec<_> = input.hashes.iter().map(|h| h.value.clone()).collect();
        assert_eq!(values, md5);
        assert!(input.hashes.iter().all(|h| h.r#type == HashType::Md5 as i32));
    }
}

use crate::profiles::repo::ProfileError;
use crate::profiles::repo_types::{ImageAsset, ImageCodec};

/// The `picture` blob cell.
///
/// Layout: one byte holding the extension length, the extension bytes
/// (with the leading dot), then the raw image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureCell(pub Option<Vec<u8>>);

impl ImageCodec for PictureCell {
    fn encode(asset: &ImageAsset) -> Self {
        let ext = asset.file_extension().as_bytes();
        let mut cell = Vec::with_capacity(1 + ext.len() + asset.data().len());
        // ImageAsset caps the extension well below 256 bytes
        cell.push(ext.len() as u8);
        cell.extend_from_slice(ext);
        cell.extend_from_slice(asset.data());
        Self(Some(cell))
    }

    fn decode(self) -> Result<Option<ImageAsset>, ProfileError> {
        let raw = match self.0 {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(None),
        };
        let ext_len = raw[0] as usize;
        if ext_len == 0 || raw.len() < 1 + ext_len {
            return Err(ProfileError::Store(format!(
                "corrupt picture cell: extension length {} in {} bytes",
                ext_len,
                raw.len()
            )));
        }
        let ext = std::str::from_utf8(&raw[1..1 + ext_len])
            .map_err(|e| ProfileError::Store(format!("corrupt picture extension: {}", e)))?;
        ImageAsset::new(raw[1 + ext_len..].to_vec(), ext)
            .map(Some)
            .map_err(|e| ProfileError::Store(format!("corrupt picture cell: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_cell_is_length_prefixed_extension_then_bytes() {
        let asset = ImageAsset::new(vec![1, 2, 3, 4], ".png").unwrap();
        let cell = PictureCell::encode(&asset);
        assert_eq!(
            cell.0.as_deref(),
            Some(&[4, b'.', b'p', b'n', b'g', 1, 2, 3, 4][..])
        );
        assert_eq!(cell.decode().unwrap(), Some(asset));
    }

    #[test]
    fn cell_is_not_inflated() {
        let asset = ImageAsset::new(vec![0xab; 4096], ".jpg").unwrap();
        let cell = PictureCell::encode(&asset).0.unwrap();
        assert_eq!(cell.len(), 4096 + 1 + ".jpg".len());
    }

    #[test]
    fn null_or_empty_cell_means_no_picture() {
        assert_eq!(PictureCell(None).decode().unwrap(), None);
        assert_eq!(PictureCell(Some(Vec::new())).decode().unwrap(), None);
    }

    #[test]
    fn garbage_cell_is_a_store_error() {
        for raw in [vec![0, 1, 2], vec![9, b'.', b'p'], vec![4, b'.', b'p', b'n', b'g']] {
            assert!(matches!(
                PictureCell(Some(raw)).decode(),
                Err(ProfileError::Store(_))
            ));
        }
        let bad_utf8 = vec![2, 0xff, 0xfe, 1];
        assert!(matches!(
            PictureCell(Some(bad_utf8)).decode(),
            Err(ProfileError::Store(_))
        ));
    }
}

use serde::Serialize;

use crate::profiles::repo::ProfileError;

/// Role of a profile. Only 1, 2 and 3 are ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserType(u8);

impl UserType {
    pub const DEFAULT: UserType = UserType(1);

    /// Strict parse, used for filters where an unknown type is a caller error.
    pub fn parse(raw: i64) -> Option<Self> {
        match raw {
            1..=3 => Some(Self(raw as u8)),
            _ => None,
        }
    }

    /// Lenient parse used at creation: anything outside {1,2,3} becomes 1.
    pub fn normalize(raw: Option<i64>) -> Self {
        raw.and_then(Self::parse).unwrap_or(Self::DEFAULT)
    }

    pub fn as_i32(self) -> i32 {
        self.0 as i32
    }
}

impl Default for UserType {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Longest accepted extension, dot excluded.
pub const MAX_EXTENSION_LEN: usize = 16;

/// Binary picture attached to a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    data: Vec<u8>,
    file_extension: String,
}

impl ImageAsset {
    /// Both parts must be non-empty. The extension is stored with a leading dot.
    pub fn new(data: Vec<u8>, file_extension: &str) -> Result<Self, ProfileError> {
        if data.is_empty() {
            return Err(ProfileError::Validation("image data is empty".into()));
        }
        let ext = file_extension.trim().trim_start_matches('.');
        if ext.is_empty() {
            return Err(ProfileError::Validation("image file extension is empty".into()));
        }
        if ext.len() > MAX_EXTENSION_LEN {
            return Err(ProfileError::Validation(format!(
                "image file extension longer than {} characters",
                MAX_EXTENSION_LEN
            )));
        }
        Ok(Self {
            data,
            file_extension: format!(".{}", ext.to_ascii_lowercase()),
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }
}

/// Canonical user profile, shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub email: String,
    pub password_hash: String, // argon2 PHC string
    pub picture: Option<ImageAsset>,
    pub state: bool,
    pub user_type: UserType,
}

impl ProfileRecord {
    pub fn new(email: String, password_hash: String, state: bool, user_type: UserType) -> Self {
        Self {
            email,
            password_hash,
            picture: None,
            state,
            user_type,
        }
    }
}

/// How a backend stores an [`ImageAsset`] next to the rest of the record.
///
/// Each adapter has its own stored shape (a binary sub-document, an opaque
/// text cell, a pair of columns). `decode` must reject half-written shapes
/// rather than invent a picture.
pub trait ImageCodec: Sized {
    fn encode(asset: &ImageAsset) -> Self;
    fn decode(self) -> Result<Option<ImageAsset>, ProfileError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_type_out_of_range_normalizes_to_one() {
        assert_eq!(UserType::normalize(Some(9)), UserType::DEFAULT);
        assert_eq!(UserType::normalize(Some(0)), UserType::DEFAULT);
        assert_eq!(UserType::normalize(Some(-3)), UserType::DEFAULT);
        assert_eq!(UserType::normalize(None), UserType::DEFAULT);
        assert_eq!(UserType::normalize(Some(3)).as_i32(), 3);
    }

    #[test]
    fn user_type_parse_is_strict() {
        assert_eq!(UserType::parse(2).map(UserType::as_i32), Some(2));
        assert!(UserType::parse(4).is_none());
    }

    #[test]
    fn image_asset_requires_data_and_extension() {
        assert!(matches!(
            ImageAsset::new(vec![], ".png"),
            Err(ProfileError::Validation(_))
        ));
        assert!(matches!(
            ImageAsset::new(vec![1], "."),
            Err(ProfileError::Validation(_))
        ));
        assert!(matches!(
            ImageAsset::new(vec![1], &"x".repeat(MAX_EXTENSION_LEN + 1)),
            Err(ProfileError::Validation(_))
        ));
        assert!(ImageAsset::new(vec![1], &"x".repeat(MAX_EXTENSION_LEN)).is_ok());
    }

    #[test]
    fn image_asset_extension_gets_single_leading_dot() {
        let a = ImageAsset::new(vec![1, 2], "PNG").unwrap();
        assert_eq!(a.file_extension(), ".png");
        let b = ImageAsset::new(vec![1, 2], ".jpg").unwrap();
        assert_eq!(b.file_extension(), ".jpg");
    }

    #[test]
    fn user_type_serializes_as_plain_number() {
        let json = serde_json::to_string(&UserType::parse(2).unwrap()).unwrap();
        assert_eq!(json, "2");
    }
}

use serde::{Deserialize, Serialize};

use crate::profiles::repo_types::{ProfileRecord, UserType};

/// Request body for profile creation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileRequest {
    pub email: String,
    pub password: String,
    #[serde(default, alias = "usertype", alias = "user_type")]
    pub user_type: Option<i64>,
    #[serde(default)]
    pub state: Option<bool>,
}

/// Any request addressing a single profile by email.
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: String,
    pub state: bool,
}

#[derive(Debug, Deserialize)]
pub struct UsersByTypeRequest {
    #[serde(rename = "userType", alias = "usertype", alias = "user_type")]
    pub user_type: i64,
}

/// Picture metadata; raw bytes never leave through JSON.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PictureSummary {
    pub file_extension: String,
    pub size: usize,
}

/// Public part of a profile returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub email: String,
    pub state: bool,
    pub user_type: UserType,
    pub picture: Option<PictureSummary>,
}

impl From<ProfileRecord> for PublicProfile {
    fn from(r: ProfileRecord) -> Self {
        Self {
            picture: r.picture.as_ref().map(|p| PictureSummary {
                file_extension: p.file_extension().to_string(),
                size: p.data().len(),
            }),
            email: r.email,
            state: r.state,
            user_type: r.user_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(message: impl Into<String>, path: &std::path::Path) -> Self {
        Self {
            message: message.into(),
            path: Some(path.display().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::repo_types::ImageAsset;

    #[test]
    fn create_request_accepts_type_aliases() {
        for body in [
            r#"{"email":"a@x.com","password":"p","userType":2}"#,
            r#"{"email":"a@x.com","password":"p","usertype":2}"#,
            r#"{"email":"a@x.com","password":"p","user_type":2}"#,
        ] {
            let req: CreateProfileRequest = serde_json::from_str(body).unwrap();
            assert_eq!(req.user_type, Some(2));
            assert_eq!(req.state, None);
        }
    }

    #[test]
    fn public_profile_hides_password_and_bytes() {
        let mut record = ProfileRecord::new(
            "a@x.com".into(),
            "$argon2id$secret".into(),
            true,
            UserType::DEFAULT,
        );
        record.picture = Some(ImageAsset::new(vec![1, 2, 3], ".png").unwrap());
        let json = serde_json::to_value(PublicProfile::from(record)).unwrap();
        assert_eq!(json["email"], "a@x.com");
        assert_eq!(json["userType"], 1);
        assert_eq!(json["picture"]["fileExtension"], ".png");
        assert_eq!(json["picture"]["size"], 3);
        assert!(!json.to_string().contains("argon2"));
    }

    #[test]
    fn users_by_type_accepts_aliases() {
        let a: UsersByTypeRequest = serde_json::from_str(r#"{"usertype":3}"#).unwrap();
        let b: UsersByTypeRequest = serde_json::from_str(r#"{"userType":3}"#).unwrap();
        assert_eq!(a.user_type, 3);
        assert_eq!(b.user_type, 3);
    }
}

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use bytes::Bytes;
use tracing::{error, instrument, warn};

use crate::{
    profiles::{
        dto::{
            CreateProfileRequest, DeletedResponse, EmailRequest, MessageResponse, PublicProfile,
            UpdateProfileRequest, UsersByTypeRequest,
        },
        repo::ProfileError,
        repo_types::ImageAsset,
        services::NewProfile,
    },
    state::AppState,
};

const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const ACCEPTED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/jpg"];

type HttpError = (StatusCode, String);

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/createProfile", post(create_profile))
        .route("/getAllUsers", get(get_all_users))
        .route("/getUserProfile", post(get_user_profile))
        .route("/updateProfile", put(update_profile))
        .route("/deleteProfile", delete(delete_profile))
        .route("/deleteProfile/:email", delete(delete_profile_by_path))
        .route("/getProfileImage", post(get_profile_image))
        .route("/createHtmlPage", post(create_html_page))
        .route("/getAllUsersState", post(get_users_by_type))
        .route("/deleteAllDatabase", delete(delete_all_database))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/uploadProfileImage", post(upload_profile_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

fn into_http(e: ProfileError) -> HttpError {
    let status = match &e {
        ProfileError::Validation(_) | ProfileError::AlreadyExists(_) => StatusCode::BAD_REQUEST,
        ProfileError::NotFound(_) => StatusCode::NOT_FOUND,
        ProfileError::Store(_) | ProfileError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn bad_request<E: std::fmt::Display>(e: E) -> HttpError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, HttpError> {
    payload.map(|Json(v)| v).map_err(|e| {
        warn!(error = %e, "malformed request body");
        (StatusCode::BAD_REQUEST, e.body_text())
    })
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

/// Extension of the uploaded file name, falling back to the content type.
fn upload_extension(file_name: Option<&str>, content_type: &str) -> Option<String> {
    file_name
        .and_then(|n| std::path::Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .or_else(|| ext_from_mime(content_type).map(str::to_string))
}

struct UploadedImage {
    content_type: String,
    file_name: Option<String>,
    data: Bytes,
}

impl UploadedImage {
    fn into_asset(self) -> Result<ImageAsset, ProfileError> {
        if !ACCEPTED_IMAGE_TYPES.contains(&self.content_type.as_str()) {
            return Err(ProfileError::Validation(format!(
                "file is not an image (content type `{}`)",
                self.content_type
            )));
        }
        let ext = upload_extension(self.file_name.as_deref(), &self.content_type)
            .ok_or_else(|| ProfileError::Validation("cannot determine image extension".into()))?;
        ImageAsset::new(self.data.to_vec(), &ext)
    }
}

#[instrument(skip(state, payload))]
pub async fn create_profile(
    State(state): State<AppState>,
    payload: Result<Json<CreateProfileRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublicProfile>), HttpError> {
    let req = body(payload)?;
    let created = state
        .profiles
        .create(NewProfile {
            email: req.email,
            password: req.password,
            user_type: req.user_type,
            state: req.state,
        })
        .await
        .map_err(into_http)?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

#[instrument(skip(state))]
pub async fn get_all_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<PublicProfile>>, HttpError> {
    let records = state.profiles.list_all().await.map_err(into_http)?;
    Ok(Json(records.into_iter().map(PublicProfile::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn get_user_profile(
    State(state): State<AppState>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<PublicProfile>, HttpError> {
    let req = body(payload)?;
    let record = state.profiles.fetch(&req.email).await.map_err(into_http)?;
    Ok(Json(record.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<PublicProfile>, HttpError> {
    let req = body(payload)?;
    let record = state
        .profiles
        .update_state(&req.email, req.state)
        .await
        .map_err(into_http)?;
    Ok(Json(record.into()))
}

#[instrument(skip(state, payload))]
pub async fn delete_profile(
    State(state): State<AppState>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<DeletedResponse>, HttpError> {
    let req = body(payload)?;
    let deleted = state.profiles.delete(&req.email).await.map_err(into_http)?;
    Ok(Json(DeletedResponse { deleted }))
}

#[instrument(skip(state))]
pub async fn delete_profile_by_path(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<DeletedResponse>, HttpError> {
    let deleted = state.profiles.delete(&email).await.map_err(into_http)?;
    Ok(Json(DeletedResponse { deleted }))
}

/// POST /uploadProfileImage (multipart)
/// Fields: `image` (jpeg/png file) and `email`.
#[instrument(skip(state, mp))]
pub async fn upload_profile_image(
    State(state): State<AppState>,
    mut mp: Multipart,
) -> Result<Json<MessageResponse>, HttpError> {
    let mut email: Option<String> = None;
    let mut image: Option<UploadedImage> = None;

    while let Some(field) = mp.next_field().await.map_err(bad_request)? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("email") => email = Some(field.text().await.map_err(bad_request)?),
            Some("image") => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let file_name = field.file_name().map(|s| s.to_string());
                let data = field.bytes().await.map_err(bad_request)?;
                image = Some(UploadedImage {
                    content_type,
                    file_name,
                    data,
                });
            }
            _ => {}
        }
    }

    let email = email.ok_or((StatusCode::BAD_REQUEST, "email is required".to_string()))?;
    let image = image.ok_or((StatusCode::BAD_REQUEST, "image is required".to_string()))?;
    let asset = image.into_asset().map_err(into_http)?;

    state
        .profiles
        .attach_image(&email, asset)
        .await
        .map_err(into_http)?;
    Ok(Json(MessageResponse::new("profile picture updated")))
}

#[instrument(skip(state, payload))]
pub async fn get_profile_image(
    State(state): State<AppState>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, HttpError> {
    let req = body(payload)?;
    let path = state
        .profiles
        .export_image(&req.email)
        .await
        .map_err(into_http)?;
    Ok(Json(MessageResponse::with_path("image file written", &path)))
}

#[instrument(skip(state, payload))]
pub async fn create_html_page(
    State(state): State<AppState>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, HttpError> {
    let req = body(payload)?;
    let path = state
        .profiles
        .render_page(&req.email)
        .await
        .map_err(into_http)?;
    Ok(Json(MessageResponse::with_path("html page written", &path)))
}

#[instrument(skip(state, payload))]
pub async fn get_users_by_type(
    State(state): State<AppState>,
    payload: Result<Json<UsersByTypeRequest>, JsonRejection>,
) -> Result<Json<Vec<PublicProfile>>, HttpError> {
    let req = body(payload)?;
    let records = state
        .profiles
        .list_by_type(req.user_type)
        .await
        .map_err(into_http)?;
    Ok(Json(records.into_iter().map(PublicProfile::from).collect()))
}

#[instrument(skip(state))]
pub async fn delete_all_database(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, HttpError> {
    state.profiles.reset().await.map_err(|e| {
        error!(error = %e, backend = state.profiles.backend(), "reset failed");
        into_http(e)
    })?;
    Ok(Json(MessageResponse::new(format!(
        "{} store reset, all profiles deleted",
        state.profiles.backend()
    ))))
}

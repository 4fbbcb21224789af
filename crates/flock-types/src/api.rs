use serde::{Deserialize, Serialize};

use crate::Id;
use crate::models::{Media, User};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Id,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

// -- Users --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub status: Option<String>,
    pub followers_count: i64,
    pub following_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserSearchResult {
    pub id: Id,
    pub username: String,
    pub is_following: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FollowStatus {
    pub is_following: bool,
}

// -- Posts --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub content: Option<String>,
    pub media: Option<Media>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeSummary {
    pub likes: i64,
    pub is_liked_by_user: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub content: String,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

// -- Generic --

/// Result of an idempotent removal (unlike, unfollow).
#[derive(Debug, Serialize, Deserialize)]
pub struct Removed {
    pub removed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

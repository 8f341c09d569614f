use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    Video,
    Image,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSpec {
    #[serde(rename = "type")]
    pub kind: PostKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

/// Profile data for the setup and custom workflows. Every field is optional;
/// a missing field gates the corresponding setup step off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
    /// Up to two posts published as part of profile setup.
    #[serde(default)]
    pub posts: Vec<PostSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_cover_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub username: String,
    pub password: String,
    /// Posts for the post workflow, in publish order.
    #[serde(default)]
    pub posts: Vec<PostSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<SetupProfile>,
}

impl Account {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            posts: Vec::new(),
            setup: None,
        }
    }
}

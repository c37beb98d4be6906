//! Path routing: `/` is the landing view, `/meeting/:id` the meeting view.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Opaque meeting identifier taken from the URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeetingId(String);

impl MeetingId {
    /// A fresh random (UUID v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MeetingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MeetingId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for MeetingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Landing,
    Meeting { id: MeetingId },
    NotFound(String),
}

impl Route {
    /// Match a path or a full URL. Query and fragment are ignored, a single
    /// trailing slash is tolerated and the meeting id is percent-decoded.
    pub fn recognize(location: &str) -> Route {
        let location = location.trim();
        let path = match Url::parse(location) {
            Ok(url) if url.has_host() => url.path().to_string(),
            _ => location
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string(),
        };

        let trimmed = path.strip_suffix('/').unwrap_or(&path);
        if trimmed.is_empty() {
            return Route::Landing;
        }

        let segments: Vec<&str> = trimmed.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            ["meeting", id] if !id.is_empty() => {
                let id = urlencoding::decode(id)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| id.to_string());
                Route::Meeting { id: id.into() }
            }
            _ => Route::NotFound(path),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Landing => "/".to_string(),
            Route::Meeting { id } => format!("/meeting/{}", urlencoding::encode(id.as_str())),
            Route::NotFound(path) => path.clone(),
        }
    }
}

use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::time::Duration;

/// A playable item plus the user who asked for it.
///
/// Built once by a [`TrackResolver`](crate::sources::TrackResolver) and never
/// mutated after it enters a queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    locator: String,
    duration: Option<Duration>,
    thumbnail: Option<String>,
    uploader: String,
    requested_by: UserId,
    added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(title: impl Into<String>, locator: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            title: title.into(),
            locator: locator.into(),
            duration: None,
            thumbnail: None,
            uploader: String::from("Unknown"),
            requested_by,
            added_at: Utc::now(),
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    /// Page or stream reference. Not necessarily directly playable.
    pub fn locator(&self) -> &str {
        &self.locator
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn uploader(&self) -> &str {
        &self.uploader
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    // Builders
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>) -> Self {
        self.uploader = uploader.into();
        self
    }
}

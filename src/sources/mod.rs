//! # Sources
//!
//! Turning user input into [`Track`]s.
//!
//! A [`TrackResolver`] is consulted twice per track:
//!
//! 1. **Enqueue time**: [`TrackResolver::resolve`] fetches catalog metadata so
//!    the queue can be rendered without further network calls.
//! 2. **Play time**: [`TrackResolver::resolve_stream`] fetches a live stream
//!    URL just before playback, since stream URLs expire.

pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::UserId;

use crate::audio::track::Track;
use crate::error::PlaybackResult;

pub use ytdlp::YtDlpResolver;

/// Looks up tracks and their playable streams.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// URL input is looked up directly; free text is searched and the top
    /// result taken. Yields [`NotFound`](crate::error::PlaybackError::NotFound)
    /// when nothing matches.
    async fn resolve(&self, query: &str, requested_by: UserId) -> PlaybackResult<Track>;

    /// Returns a directly playable stream reference for `track`.
    async fn resolve_stream(&self, track: &Track) -> PlaybackResult<String>;
}

/// True for `http(s)` URLs; everything else is a search query.
pub fn is_url(input: &str) -> bool {
    url::Url::parse(input.trim())
        .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some())
        .unwrap_or(false)
}

/// Direct audio files keep a stable locator, so play time can reuse it.
pub fn is_direct_audio_url(input: &str) -> bool {
    let Ok(parsed) = url::Url::parse(input.trim()) else {
        return false;
    };

    let path = parsed.path().to_lowercase();
    [".mp3", ".wav", ".ogg", ".flac", ".m4a", ".opus"]
        .iter()
        .any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_detection() {
        assert!(is_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_url("  https://youtu.be/dQw4w9WgXcQ "));
        assert!(is_url("http://radio.example.com/live.mp3"));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("ftp://example.com/song.mp3"));
        assert!(!is_url("youtube.com/watch?v=x"));
    }

    #[test]
    fn test_direct_audio_detection() {
        assert!(is_direct_audio_url("https://cdn.example.com/a/b/song.MP3"));
        assert!(is_direct_audio_url("https://cdn.example.com/song.flac?token=abc"));
        assert!(!is_direct_audio_url("https://www.youtube.com/watch?v=x"));
        assert!(!is_direct_audio_url("song.mp3"));
    }
}

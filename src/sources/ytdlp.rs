use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::{path::PathBuf, process::Output, time::Duration};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{is_direct_audio_url, is_url, TrackResolver};
use crate::audio::track::Track;
use crate::error::{PlaybackError, PlaybackResult};

/// Resolver backed by the `yt-dlp` executable.
pub struct YtDlpResolver {
    binary: String,
    cookies: Option<PathBuf>,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, cookies: Option<PathBuf>, timeout: Duration) -> Self {
        let cookies = cookies.or_else(Self::find_cookies_file);
        match &cookies {
            Some(path) => info!("🍪 yt-dlp cookies: {}", path.display()),
            None => debug!("🍪 No yt-dlp cookies configured"),
        }

        Self {
            binary: binary.into(),
            cookies,
            timeout,
        }
    }

    /// Returns the installed yt-dlp version, failing if it cannot run.
    pub async fn version(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.binary).arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("yt-dlp is not available");
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn find_cookies_file() -> Option<PathBuf> {
        let home = std::env::var("HOME").unwrap_or_default();
        [
            format!("{home}/.config/yt-dlp/cookies.txt"),
            "/app/.config/yt-dlp/cookies.txt".to_string(),
            "./cookies.txt".to_string(),
        ]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "--no-playlist",
            "--quiet",
            "--no-warnings",
            "--socket-timeout",
            "15",
            "--retries",
            "2",
        ]);
        if let Some(cookies) = &self.cookies {
            cmd.arg("--cookies").arg(cookies);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, target: &str) -> PlaybackResult<Output> {
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                PlaybackError::Resolution(format!(
                    "yt-dlp timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| PlaybackError::Resolution(format!("failed to run yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp failed for {}: {}", target, stderr.trim());
            return Err(classify_failure(target, &stderr));
        }

        Ok(output)
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requested_by: UserId) -> PlaybackResult<Track> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PlaybackError::InvalidArgument("empty query".to_string()));
        }

        let target = if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{query}")
        };
        info!("🔍 Resolving: {}", target);

        let mut cmd = self.command();
        cmd.args(["--dump-single-json", "--skip-download"]).arg(&target);
        let output = self.run(cmd, query).await?;

        let track = parse_track(&String::from_utf8_lossy(&output.stdout), query, requested_by)?;
        info!("✅ Resolved: {} ({})", track.title(), track.locator());
        Ok(track)
    }

    async fn resolve_stream(&self, track: &Track) -> PlaybackResult<String> {
        if is_direct_audio_url(track.locator()) {
            debug!("Stable locator, skipping stream lookup: {}", track.locator());
            return Ok(track.locator().to_string());
        }

        let mut cmd = self.command();
        cmd.args(["--format", "bestaudio[ext=m4a]/bestaudio[ext=webm]/bestaudio/best", "--get-url"])
            .arg(track.locator());
        let output = self.run(cmd, track.locator()).await?;

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                PlaybackError::Resolution(format!("no stream for {}", track.locator()))
            })
    }
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    entries: Option<Vec<VideoInfo>>,
    title: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
}

/// Builds a [`Track`] from `--dump-single-json` output. Search results come
/// wrapped in a playlist whose first entry is the top hit.
fn parse_track(json: &str, query: &str, requested_by: UserId) -> PlaybackResult<Track> {
    let mut info: VideoInfo = serde_json::from_str(json)
        .map_err(|e| PlaybackError::Resolution(format!("unreadable yt-dlp output: {e}")))?;

    if let Some(entries) = info.entries.take() {
        info = entries
            .into_iter()
            .next()
            .ok_or_else(|| PlaybackError::NotFound(query.to_string()))?;
    }

    let locator = info
        .webpage_url
        .or(info.original_url)
        .or(info.url)
        .ok_or_else(|| PlaybackError::Resolution(format!("no locator for `{query}`")))?;

    let mut track = Track::new(
        info.title.unwrap_or_else(|| "Unknown title".to_string()),
        locator,
        requested_by,
    );
    if let Some(uploader) = info.uploader.or(info.channel) {
        track = track.with_uploader(uploader);
    }
    if let Some(duration) = info
        .duration
        .filter(|d| *d > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    {
        track = track.with_duration(duration);
    }
    if let Some(thumbnail) = info.thumbnail {
        track = track.with_thumbnail(thumbnail);
    }

    Ok(track)
}

fn classify_failure(target: &str, stderr: &str) -> PlaybackError {
    const MISSING: [&str; 5] = [
        "Unsupported URL",
        "Video unavailable",
        "Private video",
        "HTTP Error 404",
        "does not exist",
    ];

    if MISSING.iter().any(|needle| stderr.contains(needle)) {
        PlaybackError::NotFound(target.to_string())
    } else {
        let reason = stderr.lines().last().unwrap_or("unknown error").trim();
        PlaybackError::Resolution(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SEARCH: &str = r#"{
        "_type": "playlist",
        "entries": [{
            "title": "Daft Punk - Around the World",
            "webpage_url": "https://www.youtube.com/watch?v=K0HSD_i2DvA",
            "url": "https://rr1.googlevideo.com/videoplayback?expire=1",
            "duration": 429.0,
            "thumbnail": "https://i.ytimg.com/vi/K0HSD_i2DvA/hq720.jpg",
            "channel": "Daft Punk"
        }]
    }"#;

    #[test]
    fn test_parse_search_takes_top_entry() {
        let track = parse_track(SEARCH, "around the world", UserId::new(3)).unwrap();

        assert_eq!(track.title(), "Daft Punk - Around the World");
        assert_eq!(track.locator(), "https://www.youtube.com/watch?v=K0HSD_i2DvA");
        assert_eq!(track.duration(), Some(Duration::from_secs(429)));
        assert_eq!(track.uploader(), "Daft Punk");
        assert_eq!(track.requested_by(), UserId::new(3));
    }

    #[test]
    fn test_parse_empty_search_is_not_found() {
        let result = parse_track(r#"{"_type":"playlist","entries":[]}"#, "zzzz", UserId::new(3));
        assert_eq!(result, Err(PlaybackError::NotFound("zzzz".to_string())));
    }

    #[test]
    fn test_parse_single_video_without_duration() {
        let json = r#"{"title":"Live radio","original_url":"https://radio.example.com/live","uploader":"Radio"}"#;
        let track = parse_track(json, "https://radio.example.com/live", UserId::new(3)).unwrap();

        assert_eq!(track.locator(), "https://radio.example.com/live");
        assert_eq!(track.duration(), None);
        assert_eq!(track.thumbnail(), None);
    }

    #[test]
    fn test_parse_absurd_duration_is_dropped() {
        let json = r#"{"title":"Loop","original_url":"https://video.test/loop","duration":1e300}"#;
        let track = parse_track(json, "loop", UserId::new(3)).unwrap();

        assert_eq!(track.title(), "Loop");
        assert_eq!(track.duration(), None);
    }

    #[test]
    fn test_parse_garbage_is_resolution_error() {
        assert!(matches!(
            parse_track("ERROR: oops", "q", UserId::new(3)),
            Err(PlaybackError::Resolution(_))
        ));
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure("https://x.test/v", "ERROR: [generic] Unsupported URL: https://x.test/v"),
            PlaybackError::NotFound("https://x.test/v".to_string())
        );
        assert_eq!(
            classify_failure("q", "WARNING: retrying\nERROR: Unable to download webpage: timed out"),
            PlaybackError::Resolution("ERROR: Unable to download webpage: timed out".to_string())
        );
    }
}

use rand::seq::SliceRandom;
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::VecDeque, fmt, str::FromStr, time::Duration};
use tracing::{debug, info};

use super::filters::{Filter, FilterSettings};
use super::track::Track;
use crate::error::{PlaybackError, PlaybackResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Single,
    Queue,
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopMode::Off => "off",
            LoopMode::Single => "single",
            LoopMode::Queue => "queue",
        })
    }
}

impl FromStr for LoopMode {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(LoopMode::Off),
            "single" | "track" | "song" => Ok(LoopMode::Single),
            "queue" | "all" => Ok(LoopMode::Queue),
            other => Err(PlaybackError::InvalidArgument(format!(
                "unknown loop mode `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Lifecycle of the session's playback pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Idle,
    /// Fetching the live stream for the track about to play.
    Resolving,
    Playing,
    /// Between one track ending and the next starting.
    Advancing,
}

/// Values a new session starts from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionDefaults {
    pub volume: f32,
    pub max_queue_size: usize,
    pub preview_len: usize,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            volume: 0.5,
            max_queue_size: 1000,
            preview_len: 10,
        }
    }
}

/// Counters kept per session, exposed through snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub advances: u64,
    pub tracks_started: u64,
    pub failed_resolutions: u64,
    pub stream_errors: u64,
}

/// Per-guild playback state: queue, current track, loop mode, volume, filters.
///
/// Owned by exactly one session worker; every mutation goes through it.
#[derive(Debug)]
pub struct PlaybackSession {
    guild_id: GuildId,
    items: VecDeque<Track>,
    current: Option<Track>,
    loop_mode: LoopMode,
    volume: f32,
    filters: FilterSettings,
    connection: ConnectionState,
    state: PlayerState,
    paused: bool,
    announce_channel: Option<ChannelId>,
    max_size: usize,
    stats: SessionStats,
}

impl PlaybackSession {
    pub fn new(guild_id: GuildId, defaults: SessionDefaults) -> Self {
        Self {
            guild_id,
            items: VecDeque::new(),
            current: None,
            loop_mode: LoopMode::Off,
            volume: defaults.volume.clamp(Self::MIN_VOLUME, Self::MAX_VOLUME),
            filters: FilterSettings::default(),
            connection: ConnectionState::Disconnected,
            state: PlayerState::Idle,
            paused: false,
            announce_channel: None,
            max_size: defaults.max_queue_size,
            stats: SessionStats::default(),
        }
    }

    pub const MIN_VOLUME: f32 = 0.01;
    pub const MAX_VOLUME: f32 = 1.0;

    /// Appends to the tail and returns the 1-based position. Never starts playback.
    pub fn enqueue(&mut self, track: Track) -> PlaybackResult<usize> {
        if self.items.len() >= self.max_size {
            return Err(PlaybackError::QueueFull(self.max_size));
        }

        info!("➕ [{}] Queued: {}", self.guild_id, track.title());
        self.items.push_back(track);
        Ok(self.items.len())
    }

    /// Picks the next track according to the loop mode.
    ///
    /// An empty queue always yields `None`, whatever the loop mode.
    pub fn dequeue(&mut self) -> Option<Track> {
        if self.items.is_empty() {
            debug!("📭 [{}] Queue empty", self.guild_id);
            return None;
        }

        match (self.loop_mode, &self.current) {
            (LoopMode::Single, Some(current)) => {
                debug!("🔂 [{}] Repeating: {}", self.guild_id, current.title());
                return Some(current.clone());
            }
            (LoopMode::Queue, Some(current)) => {
                debug!("🔁 [{}] Cycling to tail: {}", self.guild_id, current.title());
                self.items.push_back(current.clone());
            }
            _ => {}
        }

        self.items.pop_front()
    }

    /// Empties the queue and forgets the current track.
    pub fn clear(&mut self) {
        let cleared = self.items.len();
        self.items.clear();
        self.current = None;
        self.paused = false;
        info!("🗑️ [{}] Queue cleared ({} tracks)", self.guild_id, cleared);
    }

    /// Randomizes the upcoming tracks; the current one is untouched.
    pub fn shuffle(&mut self) -> usize {
        let mut items: Vec<_> = self.items.drain(..).collect();
        items.shuffle(&mut rand::thread_rng());
        self.items.extend(items);
        info!("🔀 [{}] Queue shuffled", self.guild_id);
        self.items.len()
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ [{}] Loop off", self.guild_id),
            LoopMode::Single => info!("🔂 [{}] Looping current track", self.guild_id),
            LoopMode::Queue => info!("🔁 [{}] Looping queue", self.guild_id),
        }
    }

    /// Maps a user percentage (1..=100) to the stored volume.
    pub fn set_volume_percent(&mut self, percent: i64) -> PlaybackResult<f32> {
        if !(1..=100).contains(&percent) {
            return Err(PlaybackError::InvalidArgument(format!(
                "volume must be between 1 and 100, got {percent}"
            )));
        }

        self.volume = percent as f32 / 100.0;
        info!("🔊 [{}] Volume set to {}%", self.guild_id, percent);
        Ok(self.volume)
    }

    /// Stored for the next stream start; never touches a running stream.
    pub fn set_filter(&mut self, filter: Filter, intensity: i64) -> PlaybackResult<()> {
        self.filters.set(filter, intensity)?;
        info!("🎛️ [{}] Filters now: {}", self.guild_id, self.filters.describe());
        Ok(())
    }

    pub(crate) fn set_current(&mut self, track: Option<Track>) {
        self.current = track;
    }

    pub(crate) fn set_state(&mut self, state: PlayerState) {
        if self.state != state {
            debug!("[{}] {:?} -> {:?}", self.guild_id, self.state, state);
        }
        self.state = state;
    }

    pub(crate) fn set_connection(&mut self, connection: ConnectionState) {
        self.connection = connection;
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub(crate) fn set_announce_channel(&mut self, channel: Option<ChannelId>) {
        if channel.is_some() {
            self.announce_channel = channel;
        }
    }

    pub(crate) fn stats_mut(&mut self) -> &mut SessionStats {
        &mut self.stats
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }
    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }
    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }
    pub fn volume(&self) -> f32 {
        self.volume
    }
    pub fn filters(&self) -> &FilterSettings {
        &self.filters
    }
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }
    pub fn state(&self) -> PlayerState {
        self.state
    }
    pub fn is_paused(&self) -> bool {
        self.paused
    }
    pub fn announce_channel(&self) -> Option<ChannelId> {
        self.announce_channel
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    /// 1-based position of `track` in the queue.
    pub fn position_of(&self, track: &Track) -> Option<usize> {
        self.items.iter().position(|t| t == track).map(|index| index + 1)
    }
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_size
    }
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn total_duration(&self) -> Duration {
        let queued: Duration = self.items.iter().filter_map(Track::duration).sum();
        let current = self
            .current
            .as_ref()
            .and_then(Track::duration)
            .unwrap_or_default();
        queued + current
    }

    /// Read-only view with at most `preview_len` upcoming tracks.
    pub fn snapshot(&self, preview_len: usize) -> SessionSnapshot {
        SessionSnapshot {
            guild_id: self.guild_id,
            current: self.current.clone(),
            upcoming: self.items.iter().take(preview_len).cloned().collect(),
            queued: self.items.len(),
            loop_mode: self.loop_mode,
            volume: self.volume,
            filters: self.filters.clone(),
            state: self.state,
            connection: self.connection,
            paused: self.paused,
            total_duration: self.total_duration(),
            stats: self.stats,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub guild_id: GuildId,
    pub current: Option<Track>,
    pub upcoming: Vec<Track>,
    pub queued: usize,
    pub loop_mode: LoopMode,
    pub volume: f32,
    pub filters: FilterSettings,
    pub state: PlayerState,
    pub connection: ConnectionState,
    pub paused: bool,
    pub total_duration: Duration,
    pub stats: SessionStats,
}

impl SessionSnapshot {
    /// What a guild without a live session looks like.
    pub fn empty(guild_id: GuildId, defaults: SessionDefaults) -> Self {
        PlaybackSession::new(guild_id, defaults).snapshot(0)
    }

    pub fn volume_percent(&self) -> u32 {
        (self.volume * 100.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    fn session() -> PlaybackSession {
        PlaybackSession::new(GuildId::new(1), SessionDefaults::default())
    }

    fn track(title: &str) -> Track {
        Track::new(title, format!("https://example.com/{title}"), UserId::new(7))
    }

    fn titles(session: &PlaybackSession) -> Vec<String> {
        session
            .snapshot(usize::MAX)
            .upcoming
            .iter()
            .map(|t| t.title().to_string())
            .collect()
    }

    #[test]
    fn dequeue_is_fifo_with_loop_off() {
        let mut s = session();
        for name in ["a", "b", "c", "d"] {
            s.enqueue(track(name)).unwrap();
        }

        let mut seen = Vec::new();
        let mut expected_len = s.len();
        while let Some(t) = s.dequeue() {
            expected_len -= 1;
            assert_eq!(s.len(), expected_len);
            s.set_current(Some(t.clone()));
            seen.push(t.title().to_string());
        }
        assert_eq!(seen, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn single_loop_repeats_current_without_touching_queue() {
        let mut s = session();
        s.enqueue(track("x")).unwrap();
        s.enqueue(track("y")).unwrap();
        let first = s.dequeue().unwrap();
        s.set_current(Some(first));
        s.set_loop_mode(LoopMode::Single);

        for _ in 0..25 {
            assert_eq!(s.dequeue().unwrap().title(), "x");
            assert_eq!(titles(&s), vec!["y"]);
        }

        s.set_loop_mode(LoopMode::Off);
        assert_eq!(s.dequeue().unwrap().title(), "y");
    }

    #[test]
    fn queue_loop_cycles_current_to_tail() {
        let mut s = session();
        for name in ["x", "a", "b"] {
            s.enqueue(track(name)).unwrap();
        }
        s.set_loop_mode(LoopMode::Queue);
        let x = s.dequeue().unwrap();
        s.set_current(Some(x));

        let a = s.dequeue().unwrap();
        assert_eq!(a.title(), "a");
        assert_eq!(titles(&s), vec!["b", "x"]);
        s.set_current(Some(a));

        for _ in 0..7 {
            let next = s.dequeue().unwrap();
            s.set_current(Some(next));
        }
        // after a full number of cycles the rotation keeps its relative order
        assert_eq!(s.len(), 2);
        let current = s.current().unwrap().title().to_string();
        let mut order = vec![current];
        order.extend(titles(&s));
        let start = order.iter().position(|t| t == "x").unwrap();
        order.rotate_left(start);
        assert_eq!(order, vec!["x", "a", "b"]);
    }

    #[test]
    fn empty_queue_yields_none_in_every_mode() {
        for mode in [LoopMode::Off, LoopMode::Single, LoopMode::Queue] {
            let mut s = session();
            s.set_current(Some(track("only")));
            s.set_loop_mode(mode);
            assert_eq!(s.dequeue(), None);
        }
    }

    #[test]
    fn volume_percent_is_validated() {
        let mut s = session();
        for bad in [0, 101, -5] {
            assert!(matches!(
                s.set_volume_percent(bad),
                Err(PlaybackError::InvalidArgument(_))
            ));
            assert_eq!(s.volume(), 0.5);
        }

        s.set_volume_percent(80).unwrap();
        assert_eq!(s.volume(), 0.8);
        s.set_volume_percent(50).unwrap();
        assert_eq!(s.volume(), 0.5);
        s.set_volume_percent(1).unwrap();
        assert_eq!(s.volume(), PlaybackSession::MIN_VOLUME);
    }

    #[test]
    fn enqueue_rejects_when_full() {
        let mut s = PlaybackSession::new(
            GuildId::new(1),
            SessionDefaults {
                max_queue_size: 2,
                ..SessionDefaults::default()
            },
        );
        assert_eq!(s.enqueue(track("a")), Ok(1));
        assert_eq!(s.enqueue(track("b")), Ok(2));
        assert_eq!(s.enqueue(track("c")), Err(PlaybackError::QueueFull(2)));
    }

    #[test]
    fn clear_drops_queue_and_current() {
        let mut s = session();
        s.enqueue(track("a")).unwrap();
        s.enqueue(track("b")).unwrap();
        let next = s.dequeue();
        s.set_current(next);
        s.clear();

        assert!(s.is_empty());
        assert!(s.current().is_none());
    }

    #[test]
    fn shuffle_keeps_every_track() {
        let mut s = session();
        for i in 0..20 {
            s.enqueue(track(&i.to_string())).unwrap();
        }
        assert_eq!(s.shuffle(), 20);

        let mut after = titles(&s);
        after.sort_by_key(|t| t.parse::<u32>().unwrap());
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(after, expected);
    }

    #[test]
    fn snapshot_caps_preview_and_sums_durations() {
        let mut s = session();
        for i in 0..5 {
            s.enqueue(track(&i.to_string()).with_duration(Duration::from_secs(60)))
                .unwrap();
        }
        let next = s.dequeue();
        s.set_current(next);

        let snap = s.snapshot(2);
        assert_eq!(snap.upcoming.len(), 2);
        assert_eq!(snap.queued, 4);
        assert_eq!(snap.total_duration, Duration::from_secs(300));
        assert_eq!(snap.volume_percent(), 50);
    }

    #[test]
    fn loop_mode_parses_aliases() {
        assert_eq!("track".parse::<LoopMode>(), Ok(LoopMode::Single));
        assert_eq!("ALL".parse::<LoopMode>(), Ok(LoopMode::Queue));
        assert!("sometimes".parse::<LoopMode>().is_err());
    }
}

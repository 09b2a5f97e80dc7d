use thiserror::Error;

/// Failure modes of the playback layer.
///
/// None of these are fatal to a session: the worst outcome of repeated
/// failures is the session falling back to idle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    /// The resolver found nothing for the query.
    #[error("no results for `{0}`")]
    NotFound(String),

    /// Transient upstream failure while resolving metadata or a stream.
    #[error("could not resolve track: {0}")]
    Resolution(String),

    /// Voice connection could not be established.
    #[error("voice connection failed: {0}")]
    Connection(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The sink failed to start or lost the stream.
    #[error("playback failed: {0}")]
    SinkPlayback(String),

    #[error("you need to be in a voice channel")]
    NotInVoice,

    #[error("nothing is playing")]
    NothingPlaying,

    #[error("not connected to a voice channel")]
    NotConnected,

    /// The caller's entitlement check refused the request.
    #[error("`{0}` is not available for this server")]
    Forbidden(String),

    #[error("the queue is full ({0} tracks max)")]
    QueueFull(usize),

    /// The session worker shut down before answering (disconnect race).
    #[error("the playback session was closed")]
    SessionClosed,
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;

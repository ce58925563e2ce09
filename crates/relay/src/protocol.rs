//! # Command Protocol
//!
//! Typed commands and responses carried as plain strings over
//! `sendCommand` and `deliver`.
//!
//! ```text
//! command  := ACTION ("|" RESOURCE)? ("|" ARG)*
//! response := KIND ("|" FIELD)*
//! ```
//!
//! `Display` renders the wire string and `FromStr` parses it back.

use std::fmt;
use std::str::FromStr;

const SEP: char = '|';

/// Why a protocol string was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The action or resource is not part of the protocol.
    Unknown(String),
    /// A required field is absent.
    Missing(&'static str),
    /// A numeric field did not parse.
    InvalidNumber { field: &'static str, value: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(input) => write!(f, "unknown message '{}'", input),
            Self::Missing(field) => write!(f, "missing field '{}'", field),
            Self::InvalidNumber { field, value } => {
                write!(f, "field '{}' is not a number: '{}'", field, value)
            }
        }
    }
}

impl std::error::Error for ParseError {}

fn field<'a>(parts: &[&'a str], idx: usize, name: &'static str) -> Result<&'a str, ParseError> {
    parts.get(idx).copied().ok_or(ParseError::Missing(name))
}

fn number<T: FromStr>(parts: &[&str], idx: usize, name: &'static str) -> Result<T, ParseError> {
    let raw = field(parts, idx, name)?;
    raw.parse().map_err(|_| ParseError::InvalidNumber { field: name, value: raw.to_string() })
}

fn number_or<T: FromStr>(parts: &[&str], idx: usize, default: T) -> T {
    parts.get(idx).and_then(|raw| raw.parse().ok()).unwrap_or(default)
}

fn non_empty(parts: &[&str], idx: usize) -> Option<String> {
    parts.get(idx).filter(|s| !s.is_empty()).map(|s| s.to_string())
}

/// A request sent to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Health check, answered with `Response::Pong`.
    Ping,
    PlaySong { genre: String, song: String },
    PlayGenre { genre: String },
    PlayIndex { genre: String, index: i32 },
    Pause,
    Resume,
    Stop,
    Next { genre: String },
    Previous { genre: String },
    SetVolume { level: i32 },
    VolumeUp,
    VolumeDown,
    SeekTo { position_ms: i64 },
    GetPlaylist { genre: String },
    GetCurrentSong,
    GetStatus,
    GetGenres,
    GetProgress,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => write!(f, "PING"),
            Self::PlaySong { genre, song } => write!(f, "PLAY|SONG|{}|{}", genre, song),
            Self::PlayGenre { genre } => write!(f, "PLAY|GENRE|{}", genre),
            Self::PlayIndex { genre, index } => write!(f, "PLAY|INDEX|{}|{}", genre, index),
            Self::Pause => write!(f, "PAUSE|PLAYBACK"),
            Self::Resume => write!(f, "RESUME|PLAYBACK"),
            Self::Stop => write!(f, "STOP|PLAYBACK"),
            Self::Next { genre } => write!(f, "NEXT|GENRE|{}", genre),
            Self::Previous { genre } => write!(f, "PREV|GENRE|{}", genre),
            Self::SetVolume { level } => write!(f, "VOLUME|SET|{}", level),
            Self::VolumeUp => write!(f, "VOLUME|UP"),
            Self::VolumeDown => write!(f, "VOLUME|DOWN"),
            Self::SeekTo { position_ms } => write!(f, "SEEK|POSITION|{}", position_ms),
            Self::GetPlaylist { genre } => write!(f, "GET|PLAYLIST|{}", genre),
            Self::GetCurrentSong => write!(f, "GET|CURRENT_SONG"),
            Self::GetStatus => write!(f, "GET|STATUS"),
            Self::GetGenres => write!(f, "GET|GENRES"),
            Self::GetProgress => write!(f, "GET|PROGRESS"),
        }
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input.split(SEP).collect();
        let unknown = || ParseError::Unknown(input.to_string());
        let genre = |idx| field(&parts, idx, "genre").map(str::to_string);

        let command = match (parts[0], parts.get(1).copied()) {
            ("PING", _) => Self::Ping,

            ("PLAY", Some("SONG")) => Self::PlaySong {
                genre: genre(2)?,
                song: field(&parts, 3, "song")?.to_string(),
            },
            ("PLAY", Some("GENRE")) => Self::PlayGenre { genre: genre(2)? },
            ("PLAY", Some("INDEX")) => Self::PlayIndex {
                genre: genre(2)?,
                index: number(&parts, 3, "index")?,
            },

            ("PAUSE", _) => Self::Pause,
            ("RESUME", _) => Self::Resume,
            ("STOP", _) => Self::Stop,

            ("NEXT", _) => Self::Next { genre: genre(2)? },
            ("PREV", _) => Self::Previous { genre: genre(2)? },

            ("VOLUME", Some("SET")) => Self::SetVolume { level: number(&parts, 2, "level")? },
            ("VOLUME", Some("UP")) => Self::VolumeUp,
            ("VOLUME", Some("DOWN")) => Self::VolumeDown,

            ("SEEK", _) => Self::SeekTo { position_ms: number(&parts, 2, "position")? },

            ("GET", Some("PLAYLIST")) => Self::GetPlaylist { genre: genre(2)? },
            ("GET", Some("CURRENT_SONG")) => Self::GetCurrentSong,
            ("GET", Some("STATUS")) => Self::GetStatus,
            ("GET", Some("GENRES")) => Self::GetGenres,
            ("GET", Some("PROGRESS")) => Self::GetProgress,

            _ => return Err(unknown()),
        };
        Ok(command)
    }
}

/// Snapshot of the player, carried by `Response::Status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackStatus {
    /// One of `PLAYING`, `PAUSED`, `STOPPED`.
    pub state: String,
    pub genre: Option<String>,
    pub song: Option<String>,
    pub index: Option<i32>,
    pub total: Option<i32>,
    pub volume: i32,
    pub position_ms: i64,
    pub duration_ms: i64,
}

/// A notification delivered to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Playing {
        genre: String,
        song: String,
        index: i32,
        total: i32,
        position_ms: i64,
        duration_ms: i64,
    },
    Paused,
    Stopped,
    Progress { current_ms: i64, duration_ms: i64 },
    Playlist { genre: String, songs: Vec<String> },
    Genres(Vec<String>),
    Volume(i32),
    Status(PlaybackStatus),
    Error(String),
    Pong,
    Connection { connected: bool },
}

impl Response {
    pub fn no_songs(genre: &str) -> Self {
        Self::Error(format!("no songs in {}", genre))
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[String]) -> fmt::Result {
    for item in items {
        write!(f, "{}{}", SEP, item)?;
    }
    Ok(())
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playing { genre, song, index, total, position_ms, duration_ms } => write!(
                f,
                "PLAYING|{}|{}|{}|{}|{}|{}",
                genre, song, index, total, position_ms, duration_ms
            ),
            Self::Paused => write!(f, "PAUSED"),
            Self::Stopped => write!(f, "STOPPED"),
            Self::Progress { current_ms, duration_ms } => {
                write!(f, "PROGRESS|{}|{}", current_ms, duration_ms)
            }
            Self::Playlist { genre, songs } => {
                write!(f, "PLAYLIST|{}", genre)?;
                write_list(f, songs)
            }
            Self::Genres(genres) => {
                write!(f, "GENRES")?;
                write_list(f, genres)
            }
            Self::Volume(level) => write!(f, "VOLUME|{}", level),
            Self::Status(status) => write!(
                f,
                "STATUS|{}|{}|{}|{}|{}|{}|{}|{}",
                status.state,
                status.genre.as_deref().unwrap_or(""),
                status.song.as_deref().unwrap_or(""),
                status.index.unwrap_or(0),
                status.total.unwrap_or(0),
                status.volume,
                status.position_ms,
                status.duration_ms
            ),
            Self::Error(message) => write!(f, "ERROR|{}", message),
            Self::Pong => write!(f, "PONG"),
            Self::Connection { connected: true } => write!(f, "CONNECTION|connected"),
            Self::Connection { connected: false } => write!(f, "CONNECTION|disconnected"),
        }
    }
}

impl FromStr for Response {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input.split(SEP).collect();
        let rest = |from: usize| parts.iter().skip(from).map(|s| s.to_string()).collect::<Vec<_>>();

        let response = match parts[0] {
            "PONG" => Self::Pong,
            "PLAYING" => Self::Playing {
                genre: field(&parts, 1, "genre")?.to_string(),
                song: field(&parts, 2, "song")?.to_string(),
                index: number(&parts, 3, "index")?,
                total: number(&parts, 4, "total")?,
                position_ms: number_or(&parts, 5, 0),
                duration_ms: number_or(&parts, 6, 0),
            },
            "PAUSED" => Self::Paused,
            "STOPPED" => Self::Stopped,
            "PROGRESS" => Self::Progress {
                current_ms: number(&parts, 1, "current")?,
                duration_ms: number(&parts, 2, "duration")?,
            },
            "PLAYLIST" => Self::Playlist {
                genre: field(&parts, 1, "genre")?.to_string(),
                songs: rest(2),
            },
            "GENRES" => Self::Genres(rest(1)),
            "VOLUME" => Self::Volume(number(&parts, 1, "level")?),
            "STATUS" => Self::Status(PlaybackStatus {
                state: field(&parts, 1, "state")?.to_string(),
                genre: non_empty(&parts, 2),
                song: non_empty(&parts, 3),
                index: parts.get(4).and_then(|s| s.parse().ok()),
                total: parts.get(5).and_then(|s| s.parse().ok()),
                volume: number_or(&parts, 6, 100),
                position_ms: number_or(&parts, 7, 0),
                duration_ms: number_or(&parts, 8, 0),
            }),
            "ERROR" => Self::Error(rest(1).join("|")),
            "CONNECTION" => Self::Connection { connected: parts.get(1) == Some(&"connected") },
            _ => return Err(ParseError::Unknown(input.to_string())),
        };
        Ok(response)
    }
}

use serde::{Deserialize, Serialize};

/// A track in the canonical shape every component works with.
///
/// `id` is scoped to the metadata provider; all membership checks
/// (likes, playlists, recently played, queue) compare ids, never values.
/// `audio_url` starts out as the provider's ~30 s preview and may be
/// replaced by a full-length stream once the resolver succeeds, in which
/// case `has_full_audio` flips to true.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album_title: String,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub duration_secs: u32,
    pub audio_url: String,
    #[serde(default)]
    pub has_full_audio: bool,
}

impl Track {
    pub fn is_same(&self, other: &Track) -> bool {
        self.id == other.id
    }
}

/// User playlist. Track order is play order and is user-reorderable.
/// A track id appears at most once per playlist; `add_track` in the
/// library store enforces this on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub cover_image: String,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    /// Deterministic cycle: off -> one -> all -> off.
    pub fn cycled(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::One,
            RepeatMode::One => RepeatMode::All,
            RepeatMode::All => RepeatMode::Off,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_cycle() {
        let mut mode = RepeatMode::Off;
        mode = mode.cycled();
        assert_eq!(mode, RepeatMode::One);
        mode = mode.cycled();
        assert_eq!(mode, RepeatMode::All);
        mode = mode.cycled();
        assert_eq!(mode, RepeatMode::Off);
    }

    #[test]
    fn test_track_identity_by_id() {
        let a = Track {
            id: "42".into(),
            title: "Believer".into(),
            ..Track::default()
        };
        let b = Track {
            id: "42".into(),
            title: "Believer (Remastered)".into(),
            ..Track::default()
        };
        assert!(a.is_same(&b));
    }
}

//! Persisted user library: liked tracks, playlists, recently played.
//!
//! Three independent JSON files, one per collection. Every mutation is a
//! synchronous read-modify-write of the whole file; there is no
//! cross-collection atomicity (a crash between "liked" and "recently
//! played" leaves each file individually consistent, which is enough for
//! this domain). Load errors yield empty collections and save errors are
//! logged and swallowed.

use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::model::{Playlist, Track};

const LIKED_FILE: &str = "jetstream_liked_songs.json";
const PLAYLISTS_FILE: &str = "jetstream_playlists.json";
const RECENT_FILE: &str = "jetstream_recently_played.json";

/// Recently-played list is a bounded ring, most-recent-first.
pub const RECENT_CAP: usize = 50;

pub struct LibraryStore {
    dir: PathBuf,
}

impl LibraryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("library: failed to create {:?}: {}", dir, e);
        }
        Self { dir }
    }

    // ── liked tracks ─────────────────────────────────────────────────────────

    pub fn liked_songs(&self) -> Vec<Track> {
        self.load(LIKED_FILE)
    }

    /// Front-insert unless the id is already present. Idempotent.
    pub fn like(&self, track: Track) {
        let mut liked = self.liked_songs();
        if liked.iter().any(|t| t.id == track.id) {
            return;
        }
        info!("library: liked '{}'", track.title);
        liked.insert(0, track);
        self.save(LIKED_FILE, &liked);
    }

    pub fn unlike(&self, track_id: &str) {
        let mut liked = self.liked_songs();
        liked.retain(|t| t.id != track_id);
        self.save(LIKED_FILE, &liked);
    }

    pub fn is_liked(&self, track_id: &str) -> bool {
        self.liked_songs().iter().any(|t| t.id == track_id)
    }

    // ── playlists ────────────────────────────────────────────────────────────

    pub fn playlists(&self) -> Vec<Playlist> {
        self.load(PLAYLISTS_FILE)
    }

    pub fn playlist(&self, playlist_id: &str) -> Option<Playlist> {
        self.playlists().into_iter().find(|p| p.id == playlist_id)
    }

    pub fn create_playlist(&self, name: &str, description: &str) -> Playlist {
        let created_at_ms = crate::cache::now_ms();
        let playlist = Playlist {
            id: make_playlist_id(name, created_at_ms),
            name: name.to_string(),
            description: description.to_string(),
            tracks: Vec::new(),
            cover_image: String::new(),
            created_at_ms,
        };
        let mut playlists = self.playlists();
        playlists.push(playlist.clone());
        self.save(PLAYLISTS_FILE, &playlists);
        info!("library: created playlist '{}'", name);
        playlist
    }

    pub fn delete_playlist(&self, playlist_id: &str) {
        let mut playlists = self.playlists();
        playlists.retain(|p| p.id != playlist_id);
        self.save(PLAYLISTS_FILE, &playlists);
    }

    /// Append `track` unless its id is already a member.
    pub fn add_track(&self, playlist_id: &str, track: Track) {
        let mut playlists = self.playlists();
        let Some(playlist) = playlists.iter_mut().find(|p| p.id == playlist_id) else {
            warn!("library: add_track: no playlist {}", playlist_id);
            return;
        };
        if playlist.tracks.iter().any(|t| t.id == track.id) {
            return;
        }
        playlist.tracks.push(track);
        self.save(PLAYLISTS_FILE, &playlists);
    }

    pub fn remove_track(&self, playlist_id: &str, track_id: &str) {
        let mut playlists = self.playlists();
        let Some(playlist) = playlists.iter_mut().find(|p| p.id == playlist_id) else {
            return;
        };
        playlist.tracks.retain(|t| t.id != track_id);
        self.save(PLAYLISTS_FILE, &playlists);
    }

    /// Replace the track sequence wholesale (user reorder).
    pub fn reorder(&self, playlist_id: &str, tracks: Vec<Track>) {
        let mut playlists = self.playlists();
        let Some(playlist) = playlists.iter_mut().find(|p| p.id == playlist_id) else {
            return;
        };
        playlist.tracks = tracks;
        self.save(PLAYLISTS_FILE, &playlists);
    }

    // ── recently played ──────────────────────────────────────────────────────

    pub fn recently_played(&self) -> Vec<Track> {
        self.load(RECENT_FILE)
    }

    /// Remove any prior occurrence of the id, front-insert, cap at
    /// [`RECENT_CAP`].
    pub fn record_played(&self, track: Track) {
        let mut recent = self.recently_played();
        recent.retain(|t| t.id != track.id);
        recent.insert(0, track);
        recent.truncate(RECENT_CAP);
        self.save(RECENT_FILE, &recent);
    }

    pub fn clear_recently_played(&self) {
        self.save::<Vec<Track>>(RECENT_FILE, &Vec::new());
    }

    // ── persistence ──────────────────────────────────────────────────────────

    fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn load<T: serde::de::DeserializeOwned + Default>(&self, name: &str) -> T {
        let path = self.file(name);
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(value) => value,
                Err(e) => {
                    warn!("library: {:?} unreadable, starting empty: {}", path, e);
                    T::default()
                }
            },
            Err(_) => T::default(),
        }
    }

    fn save<T: serde::Serialize>(&self, name: &str, value: &T) {
        let path = self.file(name);
        let body = match serde_json::to_string_pretty(value) {
            Ok(b) => b,
            Err(e) => {
                warn!("library: serialize for {:?} failed: {}", path, e);
                return;
            }
        };
        if let Err(e) = std::fs::write(&path, body) {
            warn!("library: write to {:?} failed: {}", path, e);
        }
    }
}

/// Short hex id from creation time + name, unique enough for a local
/// single-user library.
fn make_playlist_id(name: &str, created_at_ms: i64) -> String {
    let mut h = std::collections::hash_map::DefaultHasher::new();
    created_at_ms.hash(&mut h);
    name.hash(&mut h);
    format!("{:016x}", h.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn track(id: &str, title: &str) -> Track {
        Track {
            id: id.to_string(),
            title: title.to_string(),
            artist: "Artist".to_string(),
            audio_url: format!("https://cdn.example/{}.mp3", id),
            ..Track::default()
        }
    }

    fn store() -> (TempDir, LibraryStore) {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_like_is_idempotent() {
        let (_dir, store) = store();
        store.like(track("1", "Believer"));
        store.like(track("1", "Believer"));
        let liked = store.liked_songs();
        assert_eq!(liked.len(), 1);
        assert!(store.is_liked("1"));
    }

    #[test]
    fn test_like_order_is_most_recent_first() {
        let (_dir, store) = store();
        store.like(track("1", "First"));
        store.like(track("2", "Second"));
        let liked = store.liked_songs();
        assert_eq!(liked[0].id, "2");
        assert_eq!(liked[1].id, "1");
    }

    #[test]
    fn test_unlike_removes_by_id() {
        let (_dir, store) = store();
        store.like(track("1", "A"));
        store.like(track("2", "B"));
        store.unlike("1");
        assert!(!store.is_liked("1"));
        assert!(store.is_liked("2"));
    }

    #[test]
    fn test_playlist_membership_is_unique_by_id() {
        let (_dir, store) = store();
        let playlist = store.create_playlist("Roadtrip", "windows down");
        store.add_track(&playlist.id, track("1", "A"));
        store.add_track(&playlist.id, track("1", "A (Deluxe)"));
        store.add_track(&playlist.id, track("2", "B"));
        let got = store.playlist(&playlist.id).unwrap();
        assert_eq!(got.tracks.len(), 2);
    }

    #[test]
    fn test_playlist_reorder_replaces_sequence() {
        let (_dir, store) = store();
        let playlist = store.create_playlist("Mix", "");
        store.add_track(&playlist.id, track("1", "A"));
        store.add_track(&playlist.id, track("2", "B"));
        let reversed = vec![track("2", "B"), track("1", "A")];
        store.reorder(&playlist.id, reversed);
        let got = store.playlist(&playlist.id).unwrap();
        assert_eq!(got.tracks[0].id, "2");
        assert_eq!(got.tracks[1].id, "1");
    }

    #[test]
    fn test_delete_playlist() {
        let (_dir, store) = store();
        let a = store.create_playlist("Keep", "");
        let b = store.create_playlist("Drop", "");
        store.delete_playlist(&b.id);
        let ids: Vec<String> = store.playlists().into_iter().map(|p| p.id).collect();
        assert!(ids.contains(&a.id));
        assert!(!ids.contains(&b.id));
    }

    #[test]
    fn test_recently_played_caps_and_dedups() {
        let (_dir, store) = store();
        // 60 plays of the same track interleaved with others.
        for i in 0..60 {
            store.record_played(track("repeat", "Same Song"));
            store.record_played(track(&format!("other-{}", i), "Other"));
        }
        let recent = store.recently_played();
        assert_eq!(recent.len(), RECENT_CAP);
        // Most recent first, no duplicate ids.
        assert_eq!(recent[0].id, "other-59");
        assert_eq!(recent[1].id, "repeat");
        let mut ids: Vec<&str> = recent.iter().map(|t| t.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), RECENT_CAP);
    }

    #[test]
    fn test_collections_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = LibraryStore::new(dir.path());
            store.like(track("1", "A"));
            store.record_played(track("1", "A"));
        }
        let store = LibraryStore::new(dir.path());
        assert!(store.is_liked("1"));
        assert_eq!(store.recently_played().len(), 1);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let (dir, store) = store();
        store.like(track("1", "A"));
        std::fs::write(dir.path().join(LIKED_FILE), "{{{").unwrap();
        assert!(store.liked_songs().is_empty());
    }
}

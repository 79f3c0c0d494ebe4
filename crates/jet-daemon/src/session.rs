//! Playback session: the single owner of the media output.
//!
//! The session is a state machine over Idle/Loading/Playing/Paused/Ended
//! plus a queue, an in-session history and the transport parameters.
//! It runs as one tokio task; everything else talks to it through
//! [`SessionCommand`] over an mpsc channel, and reads a versioned
//! [`SessionSnapshot`] back. Nothing outside this module touches the
//! output resource.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use jet_core::library::LibraryStore;
use jet_core::model::{RepeatMode, Track};
use jet_core::resolver::AudioResolver;

use crate::output::MediaOutput;

pub const SPEED_MIN: f32 = 0.25;
pub const SPEED_MAX: f32 = 2.0;
/// Past this many seconds into a track, "previous" means restart.
pub const PREV_GRACE_SECS: f64 = 3.0;
const HISTORY_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
}

/// Point-in-time view of the session. `rev` increases on every state
/// change so clients can detect missed updates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSnapshot {
    pub rev: u64,
    pub status: PlaybackStatus,
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    pub history: Vec<Track>,
    pub position_secs: f64,
    pub duration_secs: Option<f64>,
    pub volume: f32,
    pub speed: f32,
    pub shuffle: bool,
    pub repeat: RepeatMode,
}

#[derive(Debug)]
pub enum SessionCommand {
    Play(Track),
    PlayPause,
    Next,
    Prev,
    Stop,
    /// Seek target as a percentage of duration, clamped to [0, 100].
    Seek(f64),
    Volume(f32),
    Speed(f32),
    QueueAdd(Track),
    QueueClear,
    QueueReorder { from: usize, to: usize },
    ToggleShuffle,
    ToggleRepeat,
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

pub struct PlaybackSession<O: MediaOutput> {
    output: O,
    library: Arc<LibraryStore>,
    resolver: Option<Arc<AudioResolver>>,

    status: PlaybackStatus,
    current: Option<Track>,
    queue: Vec<Track>,
    /// Queue entries already consumed this cycle, in original order.
    /// Recycled into `queue` when repeat == All runs the queue dry.
    consumed: Vec<Track>,
    history: VecDeque<Track>,
    position_secs: f64,
    duration_secs: Option<f64>,
    volume: f32,
    speed: f32,
    shuffle: bool,
    repeat: RepeatMode,
    rev: u64,
}

impl<O: MediaOutput> PlaybackSession<O> {
    pub fn new(
        output: O,
        library: Arc<LibraryStore>,
        resolver: Option<Arc<AudioResolver>>,
        volume: f32,
        speed: f32,
    ) -> Self {
        Self {
            output,
            library,
            resolver,
            status: PlaybackStatus::Idle,
            current: None,
            queue: Vec::new(),
            consumed: Vec::new(),
            history: VecDeque::new(),
            position_secs: 0.0,
            duration_secs: None,
            volume: volume.clamp(0.0, 1.0),
            speed: speed.clamp(SPEED_MIN, SPEED_MAX),
            shuffle: false,
            repeat: RepeatMode::Off,
            rev: 1,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            rev: self.rev,
            status: self.status,
            current: self.current.clone(),
            queue: self.queue.clone(),
            history: self.history.iter().cloned().collect(),
            position_secs: self.position_secs,
            duration_secs: self.duration_secs,
            volume: self.volume,
            speed: self.speed,
            shuffle: self.shuffle,
            repeat: self.repeat,
        }
    }

    fn bump(&mut self) {
        self.rev += 1;
    }

    // ── transport ────────────────────────────────────────────────────────────

    pub async fn play_track(&mut self, track: Track) {
        info!(
            "session: play '{}' - '{}' (full_audio={})",
            track.artist, track.title, track.has_full_audio
        );
        self.status = PlaybackStatus::Loading;
        self.current = Some(track.clone());
        self.position_secs = 0.0;
        self.duration_secs = None;
        self.bump();

        if let Err(e) = self.output.load(&track.audio_url).await {
            // Keep the UI responsive rather than hanging in Loading.
            warn!("session: load failed for '{}': {}", track.title, e);
            self.status = PlaybackStatus::Idle;
            self.bump();
            return;
        }
        let _ = self.output.set_volume(self.volume).await;
        let _ = self.output.set_speed(self.speed).await;
        if let Err(e) = self.output.set_pause(false).await {
            warn!("session: start failed for '{}': {}", track.title, e);
            self.status = PlaybackStatus::Idle;
            self.bump();
            return;
        }

        self.status = PlaybackStatus::Playing;
        self.remember(track.clone());
        self.library.record_played(track.clone());
        self.bump();

        // Preview playing: warm the resolution cache in the background so
        // the next play of this track can be full-length. The in-flight
        // source is never swapped.
        if !track.has_full_audio {
            if let Some(resolver) = self.resolver.clone() {
                tokio::spawn(async move {
                    let _ = resolver.resolve(&track).await;
                });
            }
        }
    }

    fn remember(&mut self, track: Track) {
        self.history.retain(|t| t.id != track.id);
        self.history.push_front(track);
        self.history.truncate(HISTORY_CAP);
    }

    pub async fn play_pause(&mut self) {
        if self.current.is_none() {
            return;
        }
        match self.status {
            PlaybackStatus::Playing => {
                if self.output.set_pause(true).await.is_ok() {
                    self.status = PlaybackStatus::Paused;
                    self.bump();
                }
            }
            PlaybackStatus::Paused => {
                if self.output.set_pause(false).await.is_ok() {
                    self.status = PlaybackStatus::Playing;
                    self.bump();
                }
            }
            _ => {}
        }
    }

    pub async fn stop(&mut self) {
        self.output.stop().await;
        self.status = PlaybackStatus::Idle;
        self.position_secs = 0.0;
        self.duration_secs = None;
        self.bump();
    }

    pub async fn seek_percent(&mut self, percent: f64) {
        if self.current.is_none() {
            return;
        }
        let Some(duration) = self.duration_secs.filter(|d| *d > 0.0) else {
            return;
        };
        let percent = percent.clamp(0.0, 100.0);
        let target = percent / 100.0 * duration;
        if self.output.seek_to(target).await.is_ok() {
            self.position_secs = target;
            self.bump();
        }
    }

    pub async fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        let _ = self.output.set_volume(self.volume).await;
        self.bump();
    }

    pub async fn set_speed(&mut self, speed: f32) {
        self.speed = speed.clamp(SPEED_MIN, SPEED_MAX);
        let _ = self.output.set_speed(self.speed).await;
        self.bump();
    }

    // ── queue ────────────────────────────────────────────────────────────────

    pub fn add_to_queue(&mut self, track: Track) {
        self.queue.push(track);
        self.bump();
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.consumed.clear();
        self.bump();
    }

    /// Pure move: remove at `from`, reinsert at `to`. Not a swap.
    pub fn reorder_queue(&mut self, from: usize, to: usize) {
        if from >= self.queue.len() {
            return;
        }
        let track = self.queue.remove(from);
        let to = to.min(self.queue.len());
        self.queue.insert(to, track);
        self.bump();
    }

    fn next_in_queue(&mut self) -> Option<Track> {
        if self.queue.is_empty() && self.repeat == RepeatMode::All && !self.consumed.is_empty() {
            debug!("session: repeat all, recycling {} tracks", self.consumed.len());
            self.queue = std::mem::take(&mut self.consumed);
        }
        if self.queue.is_empty() {
            return None;
        }
        let track = self.queue.remove(0);
        self.consumed.push(track.clone());
        self.bump();
        Some(track)
    }

    pub async fn skip_next(&mut self) {
        match self.next_in_queue() {
            Some(track) => self.play_track(track).await,
            None => self.stop().await,
        }
    }

    pub async fn skip_previous(&mut self) {
        if self.current.is_none() {
            return;
        }
        // Inside the grace window "previous" should arguably walk the
        // history list, but the intended behavior is an open product
        // question; both branches restart the current track for now.
        if self.position_secs > PREV_GRACE_SECS {
            debug!("session: previous -> restart current");
        }
        if self.output.seek_to(0.0).await.is_ok() {
            self.position_secs = 0.0;
            self.bump();
        }
    }

    pub fn toggle_shuffle(&mut self) {
        self.shuffle = !self.shuffle;
        self.bump();
    }

    pub fn toggle_repeat(&mut self) {
        self.repeat = self.repeat.cycled();
        self.bump();
    }

    // ── progress / end-of-track ──────────────────────────────────────────────

    /// Poll the output for transport progress; drive the end-of-track
    /// transitions when the source finished naturally.
    pub async fn tick(&mut self) {
        if !matches!(self.status, PlaybackStatus::Playing | PlaybackStatus::Paused) {
            return;
        }
        let poll = self.output.poll().await;
        if let Some(pos) = poll.position_secs {
            self.position_secs = pos;
        }
        if poll.duration_secs.is_some() {
            self.duration_secs = poll.duration_secs;
        }
        if poll.eof && self.status == PlaybackStatus::Playing {
            self.handle_ended().await;
        }
    }

    async fn handle_ended(&mut self) {
        self.status = PlaybackStatus::Ended;
        self.position_secs = 0.0;
        self.bump();

        if self.repeat == RepeatMode::One {
            if let Some(track) = self.current.clone() {
                self.play_track(track).await;
                return;
            }
        }
        match self.next_in_queue() {
            Some(track) => self.play_track(track).await,
            None => {
                self.status = PlaybackStatus::Idle;
                self.bump();
            }
        }
    }

    // ── command loop ─────────────────────────────────────────────────────────

    pub async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Play(track) => self.play_track(track).await,
            SessionCommand::PlayPause => self.play_pause().await,
            SessionCommand::Next => self.skip_next().await,
            SessionCommand::Prev => self.skip_previous().await,
            SessionCommand::Stop => self.stop().await,
            SessionCommand::Seek(percent) => self.seek_percent(percent).await,
            SessionCommand::Volume(volume) => self.set_volume(volume).await,
            SessionCommand::Speed(speed) => self.set_speed(speed).await,
            SessionCommand::QueueAdd(track) => self.add_to_queue(track),
            SessionCommand::QueueClear => self.clear_queue(),
            SessionCommand::QueueReorder { from, to } => self.reorder_queue(from, to),
            SessionCommand::ToggleShuffle => self.toggle_shuffle(),
            SessionCommand::ToggleRepeat => self.toggle_repeat(),
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }
}

/// Run the session as its own task. Commands arrive over the returned
/// sender; a periodic tick drives progress and end-of-track handling.
pub fn spawn<O: MediaOutput + 'static>(
    mut session: PlaybackSession<O>,
) -> mpsc::Sender<SessionCommand> {
    let (tx, mut rx) = mpsc::channel::<SessionCommand>(64);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_millis(500));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                command = rx.recv() => {
                    match command {
                        Some(command) => session.handle(command).await,
                        None => {
                            info!("session: command channel closed, stopping");
                            session.stop().await;
                            break;
                        }
                    }
                }
                _ = tick.tick() => session.tick().await,
            }
        }
    });
    tx
}

//! Local player model that follows room playback broadcasts.

use serde::Serialize;

use crate::error::AppResult;
use crate::models::event::SyncKind;

/// Local position may drift this far from a `play` broadcast before a seek is forced.
pub const DRIFT_THRESHOLD_SECS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerSync {
    url: Option<String>,
    position: f64,
    playing: bool,
}

#[derive(Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum PlayerFrame<'a> {
    #[serde(rename_all = "camelCase")]
    VideoChange { room_id: &'a str, url: &'a str },
    #[serde(rename_all = "camelCase")]
    VideoSync {
        room_id: &'a str,
        #[serde(rename = "type")]
        kind: SyncKind,
        played: bool,
        timestamp: f64,
    },
}

impl PlayerSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Local clock tick while playing.
    pub fn advance(&mut self, secs: f64) {
        if self.playing && secs.is_finite() && secs > 0.0 {
            self.position += secs;
        }
    }

    /// `video_change`: load the new URL paused at the start.
    pub fn on_video_change(&mut self, url: &str) {
        self.url = Some(url.to_string());
        self.position = 0.0;
        self.playing = false;
    }

    /// `video_sync`: apply a remote transition. Returns the position sought to, if any.
    /// `play` and `seek` only move the local position when it drifted past the threshold;
    /// `pause` always lands exactly on the broadcast timestamp.
    pub fn on_video_sync(&mut self, kind: SyncKind, played: bool, timestamp: f64) -> Option<f64> {
        let seek = match kind {
            SyncKind::Play => {
                self.playing = true;
                (self.position - timestamp).abs() > DRIFT_THRESHOLD_SECS
            }
            SyncKind::Pause => {
                self.playing = false;
                true
            }
            SyncKind::Seek => {
                self.playing = played;
                (self.position - timestamp).abs() > DRIFT_THRESHOLD_SECS
            }
        };
        if seek {
            self.position = timestamp;
            Some(timestamp)
        } else {
            None
        }
    }

    /// Frame announcing a local transition at the current position.
    pub fn sync_frame(&self, room_id: &str, kind: SyncKind) -> AppResult<String> {
        let played = match kind {
            SyncKind::Play => true,
            SyncKind::Pause => false,
            SyncKind::Seek => self.playing,
        };
        let frame = PlayerFrame::VideoSync {
            room_id,
            kind,
            played,
            timestamp: self.position,
        };
        Ok(serde_json::to_string(&frame)?)
    }

    pub fn change_frame(room_id: &str, url: &str) -> AppResult<String> {
        Ok(serde_json::to_string(&PlayerFrame::VideoChange { room_id, url })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::ClientEvent;
    use crate::services::playback::PlaybackCommand;

    fn loaded_at(position: f64) -> PlayerSync {
        let mut player = PlayerSync::new();
        player.on_video_change("https://example.com/v.mp4");
        player.position = position;
        player
    }

    #[test]
    fn play_within_threshold_keeps_local_position() {
        let mut player = loaded_at(10.5);
        assert_eq!(player.on_video_sync(SyncKind::Play, true, 10.0), None);
        assert!(player.is_playing());
        assert_eq!(player.position(), 10.5);
    }

    #[test]
    fn play_beyond_threshold_seeks() {
        let mut player = loaded_at(3.0);
        assert_eq!(player.on_video_sync(SyncKind::Play, true, 10.0), Some(10.0));
        assert_eq!(player.position(), 10.0);
    }

    #[test]
    fn pause_always_seeks_exactly() {
        let mut player = loaded_at(10.2);
        player.playing = true;
        assert_eq!(player.on_video_sync(SyncKind::Pause, false, 10.0), Some(10.0));
        assert!(!player.is_playing());
    }

    #[test]
    fn seek_adopts_played_flag() {
        let mut player = loaded_at(1.0);
        player.on_video_sync(SyncKind::Seek, true, 42.0);
        assert!(player.is_playing());
        player.on_video_sync(SyncKind::Seek, false, 7.0);
        assert!(!player.is_playing());
        assert_eq!(player.position(), 7.0);
    }

    #[test]
    fn seek_within_threshold_keeps_position_but_adopts_played() {
        let mut player = loaded_at(20.4);
        assert_eq!(player.on_video_sync(SyncKind::Seek, true, 20.0), None);
        assert_eq!(player.position(), 20.4);
        assert!(player.is_playing());

        assert_eq!(player.on_video_sync(SyncKind::Seek, false, 21.0), None);
        assert!(!player.is_playing());
    }

    #[test]
    fn video_change_resets_to_paused_start() {
        let mut player = loaded_at(30.0);
        player.playing = true;
        player.on_video_change("https://example.com/other.mp4");
        assert_eq!(player.url(), Some("https://example.com/other.mp4"));
        assert_eq!(player.position(), 0.0);
        assert!(!player.is_playing());
    }

    #[test]
    fn advance_only_while_playing() {
        let mut player = loaded_at(0.0);
        player.advance(2.0);
        assert_eq!(player.position(), 0.0);
        player.on_video_sync(SyncKind::Play, true, 0.0);
        player.advance(2.0);
        assert_eq!(player.position(), 2.0);
    }

    #[test]
    fn frames_parse_as_client_events() {
        let mut player = loaded_at(12.0);
        player.playing = true;
        let frame = player.sync_frame("movie", SyncKind::Seek).unwrap();
        match ClientEvent::parse(&frame).unwrap() {
            ClientEvent::Sync(sync) => {
                assert_eq!(sync.room_id.as_str(), "movie");
                assert_eq!(
                    sync.command,
                    PlaybackCommand::Seek {
                        position: 12.0,
                        playing: true
                    }
                );
            }
            other => panic!("unexpected {:?}", other),
        }

        let change = PlayerSync::change_frame("movie", "https://example.com/v.mp4").unwrap();
        assert!(matches!(ClientEvent::parse(&change).unwrap(), ClientEvent::Sync(_)));
    }
}

use std::sync::Arc;

use crate::rtc::{MediaKind, RemoteTrack, UserId};

/// A remote channel member as seen by the call surface.
#[derive(Debug, Clone)]
pub struct RemoteParticipant {
    pub uid: UserId,
    pub has_video: bool,
    pub has_audio: bool,
    pub video_track: Option<Arc<dyn RemoteTrack>>,
    pub audio_track: Option<Arc<dyn RemoteTrack>>,
}

impl RemoteParticipant {
    fn new(uid: UserId) -> Self {
        Self {
            uid,
            has_video: false,
            has_audio: false,
            video_track: None,
            audio_track: None,
        }
    }
}

/// Remote participants of a session, one entry per user id.
///
/// Updated by the remote event pump. The session's own uids (the media
/// client and the dedicated screen client) never appear here.
#[derive(Debug, Clone, Default)]
pub struct RemoteParticipants {
    participants: Vec<RemoteParticipant>,
    local_uids: Vec<UserId>,
}

impl RemoteParticipants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_local_uid(&mut self, uid: UserId) {
        self.remove(&uid);
        if !self.local_uids.contains(&uid) {
            self.local_uids.push(uid);
        }
    }

    pub fn is_local(&self, uid: &UserId) -> bool {
        self.local_uids.contains(uid)
    }

    /// Get or insert the entry for `uid`. Returns `None` for local uids.
    pub fn upsert(&mut self, uid: &UserId) -> Option<&mut RemoteParticipant> {
        if self.is_local(uid) {
            return None;
        }
        let index = match self.participants.iter().position(|p| &p.uid == uid) {
            Some(index) => index,
            None => {
                self.participants.push(RemoteParticipant::new(uid.clone()));
                self.participants.len() - 1
            }
        };
        self.participants.get_mut(index)
    }

    /// Record a subscribed track. A previous track of the same kind is stopped.
    pub fn attach(&mut self, uid: &UserId, track: Arc<dyn RemoteTrack>) -> bool {
        let Some(participant) = self.upsert(uid) else {
            return false;
        };
        let previous = match track.kind() {
            MediaKind::Video => {
                participant.has_video = true;
                participant.video_track.replace(track)
            }
            MediaKind::Audio => {
                participant.has_audio = true;
                participant.audio_track.replace(track)
            }
        };
        if let Some(previous) = previous {
            previous.stop();
        }
        true
    }

    pub fn detach(&mut self, uid: &UserId, kind: MediaKind) {
        let Some(participant) = self.participants.iter_mut().find(|p| &p.uid == uid) else {
            return;
        };
        let track = match kind {
            MediaKind::Video => {
                participant.has_video = false;
                participant.video_track.take()
            }
            MediaKind::Audio => {
                participant.has_audio = false;
                participant.audio_track.take()
            }
        };
        if let Some(track) = track {
            track.stop();
        }
    }

    pub fn remove(&mut self, uid: &UserId) {
        self.participants.retain(|p| {
            if &p.uid != uid {
                return true;
            }
            for track in p.video_track.iter().chain(p.audio_track.iter()) {
                track.stop();
            }
            false
        });
    }

    pub fn participants(&self) -> &[RemoteParticipant] {
        &self.participants
    }

    pub fn participant(&self, uid: &UserId) -> Option<&RemoteParticipant> {
        self.participants.iter().find(|p| &p.uid == uid)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Participants to render as tiles: those with an active video flag.
    pub fn video_tiles(&self) -> Vec<UserId> {
        self.participants
            .iter()
            .filter(|p| p.has_video)
            .map(|p| p.uid.clone())
            .collect()
    }

    /// Stop every remote track and forget everyone, local uids included.
    pub fn clear(&mut self) {
        for participant in &self.participants {
            for track in participant.video_track.iter().chain(participant.audio_track.iter()) {
                track.stop();
            }
        }
        self.participants.clear();
        self.local_uids.clear();
    }
}

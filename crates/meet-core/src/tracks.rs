use std::sync::Arc;

use crate::rtc::{LocalTrack, TrackSource};

/// Local tracks acquired by a session.
///
/// Every slot is released (stopped then closed) exactly once: slots are
/// emptied as they are released, and whatever is still held when the value
/// is dropped gets released then.
#[derive(Debug, Default)]
pub struct LocalMedia {
    camera: Option<Arc<dyn LocalTrack>>,
    microphone: Option<Arc<dyn LocalTrack>>,
    screen_video: Option<Arc<dyn LocalTrack>>,
    screen_audio: Option<Arc<dyn LocalTrack>>,
}

fn release(track: Arc<dyn LocalTrack>) {
    track.stop();
    track.close();
    tracing::debug!("released {} track {}", track.source(), track.id());
}

/// A track that has been acquired but not yet stored in a [`LocalMedia`].
/// Released if dropped unclaimed.
#[derive(Debug)]
pub(crate) struct PendingTrack(Option<Arc<dyn LocalTrack>>);

impl PendingTrack {
    pub(crate) fn new(track: Arc<dyn LocalTrack>) -> Self {
        Self(Some(track))
    }
}

impl Drop for PendingTrack {
    fn drop(&mut self) {
        if let Some(track) = self.0.take() {
            tracing::info!("releasing unclaimed {} track", track.source());
            release(track);
        }
    }
}

impl LocalMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn claim(&mut self, mut pending: PendingTrack) {
        if let Some(track) = pending.0.take() {
            self.insert(track);
        }
    }

    fn slot(&mut self, source: TrackSource) -> &mut Option<Arc<dyn LocalTrack>> {
        match source {
            TrackSource::Camera => &mut self.camera,
            TrackSource::Microphone => &mut self.microphone,
            TrackSource::ScreenVideo => &mut self.screen_video,
            TrackSource::ScreenAudio => &mut self.screen_audio,
        }
    }

    /// Store a freshly acquired track. A track already held for the same
    /// source is released first.
    pub fn insert(&mut self, track: Arc<dyn LocalTrack>) {
        let source = track.source();
        if let Some(previous) = self.slot(source).replace(track) {
            tracing::warn!("replacing held {source} track {}", previous.id());
            release(previous);
        }
    }

    pub fn track(&self, source: TrackSource) -> Option<Arc<dyn LocalTrack>> {
        match source {
            TrackSource::Camera => self.camera.clone(),
            TrackSource::Microphone => self.microphone.clone(),
            TrackSource::ScreenVideo => self.screen_video.clone(),
            TrackSource::ScreenAudio => self.screen_audio.clone(),
        }
    }

    /// Camera and microphone, in publish order.
    pub fn device_tracks(&self) -> Vec<Arc<dyn LocalTrack>> {
        self.camera
            .iter()
            .chain(self.microphone.iter())
            .cloned()
            .collect()
    }

    /// Screen video and (optional) screen audio, in publish order.
    pub fn screen_tracks(&self) -> Vec<Arc<dyn LocalTrack>> {
        self.screen_video
            .iter()
            .chain(self.screen_audio.iter())
            .cloned()
            .collect()
    }

    pub fn is_held(&self, source: TrackSource) -> bool {
        match source {
            TrackSource::Camera => self.camera.is_some(),
            TrackSource::Microphone => self.microphone.is_some(),
            TrackSource::ScreenVideo => self.screen_video.is_some(),
            TrackSource::ScreenAudio => self.screen_audio.is_some(),
        }
    }

    /// Release the screen capture tracks. Returns how many were released.
    pub fn release_screen(&mut self) -> usize {
        [TrackSource::ScreenVideo, TrackSource::ScreenAudio]
            .into_iter()
            .filter_map(|source| self.slot(source).take())
            .map(release)
            .count()
    }

    /// Release every held track. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        [
            TrackSource::Camera,
            TrackSource::Microphone,
            TrackSource::ScreenVideo,
            TrackSource::ScreenAudio,
        ]
        .into_iter()
        .filter_map(|source| self.slot(source).take())
        .map(release)
        .count()
    }
}

impl Drop for LocalMedia {
    fn drop(&mut self) {
        let released = self.release_all();
        if released > 0 {
            tracing::info!("released {released} local tracks on drop");
        }
    }
}

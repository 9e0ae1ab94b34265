use std::future::Future;

use anyhow::{Result, bail};

use crate::media::local_stream::{LocalStream, TrackKind};

/// Video is kept small; the overlay only shows thumbnails.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoConstraints {
    pub ideal_width: u32,
    pub max_width: u32,
    pub ideal_height: u32,
    pub max_height: u32,
    pub ideal_frame_rate: u32,
    pub max_frame_rate: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 160,
            max_width: 240,
            ideal_height: 120,
            max_height: 180,
            ideal_frame_rate: 12,
            max_frame_rate: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaConstraints {
    pub video: Option<VideoConstraints>,
    pub audio: Option<AudioConstraints>,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: Some(VideoConstraints::default()),
            audio: Some(AudioConstraints::default()),
        }
    }
}

impl MediaConstraints {
    pub fn audio_only(&self) -> Self {
        Self {
            video: None,
            audio: Some(self.audio.clone().unwrap_or_default()),
        }
    }

    pub fn wants(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.audio.is_some(),
            TrackKind::Video => self.video.is_some(),
        }
    }
}

/// Source of local capture. Either every requested kind is granted or the
/// request fails as a whole.
pub trait MediaDevices {
    fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> impl Future<Output = Result<LocalStream>> + Send;
}

/// A host without capture hardware, or one that denies every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDevices;

impl MediaDevices for NoDevices {
    async fn get_user_media(&self, _constraints: &MediaConstraints) -> Result<LocalStream> {
        bail!("no capture devices available")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_only_drops_video() {
        let constraints = MediaConstraints::default().audio_only();

        assert!(!constraints.wants(TrackKind::Video));
        assert!(constraints.audio.unwrap().echo_cancellation);
    }

    #[test]
    fn default_video_is_thumbnail_sized() {
        let video = VideoConstraints::default();

        assert_eq!((video.ideal_width, video.ideal_height), (160, 120));
        assert!(video.max_frame_rate <= 15);
    }
}

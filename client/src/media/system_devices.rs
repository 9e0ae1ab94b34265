use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait};
use log::info;
use opencv::{
    core::{Mat, MatTraitConst},
    videoio::{
        CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH, VideoCapture,
        VideoCaptureTrait, VideoCaptureTraitConst,
    },
};

use crate::media::{
    local_stream::{LocalStream, TrackKind},
    media_devices::{MediaConstraints, MediaDevices, VideoConstraints},
};

/// Camera through OpenCV and microphone through the default cpal host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDevices {
    pub camera_index: i32,
}

impl SystemDevices {
    fn open_camera(index: i32, video: &VideoConstraints) -> Result<String> {
        let mut cam = VideoCapture::new(index, CAP_ANY)?;

        if !cam.is_opened()? {
            bail!("could not open camera {}", index);
        }

        cam.set(CAP_PROP_FRAME_WIDTH, video.ideal_width as f64)?;
        cam.set(CAP_PROP_FRAME_HEIGHT, video.ideal_height as f64)?;
        cam.set(CAP_PROP_FPS, video.ideal_frame_rate as f64)?;

        let mut frame = Mat::default();
        cam.read(&mut frame)?;

        if frame.empty() {
            bail!("camera {} returned an empty frame", index);
        }

        Ok(format!("camera {}", index))
    }

    fn open_microphone() -> Result<String> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| anyhow!("no default input device"))?;

        Ok(device.name().unwrap_or_else(|_| "microphone".to_string()))
    }
}

impl MediaDevices for SystemDevices {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<LocalStream> {
        let mut tracks = Vec::new();

        if let Some(video) = constraints.video.clone() {
            let index = self.camera_index;
            let label = tokio::task::spawn_blocking(move || Self::open_camera(index, &video))
                .await
                .context("camera check panicked")??;

            tracks.push((TrackKind::Video, label));
        }

        if constraints.audio.is_some() {
            let label = tokio::task::spawn_blocking(Self::open_microphone)
                .await
                .context("microphone check panicked")??;

            tracks.push((TrackKind::Audio, label));
        }

        info!("Captured {} local media track(s)", tracks.len());

        Ok(LocalStream::new(tracks))
    }
}

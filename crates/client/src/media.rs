use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use webrtc::api::media_engine::MIME_TYPE_H264;
use webrtc::media::Sample;
use webrtc::media::io::h264_reader::H264Reader;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Capture seam for the publisher role.
///
/// `open` acquires the device and returns the tracks the session attaches;
/// failure there surfaces as a start failure with no session created.
/// `stop` releases the device and any preview sinks; the session calls it
/// exactly once during teardown.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn open(&mut self) -> anyhow::Result<Vec<Arc<dyn TrackLocal + Send + Sync>>>;
    async fn stop(&mut self) -> anyhow::Result<()>;
}

/// Bundled source streaming Annex-B H.264 from a file at a fixed frame
/// rate. Stands in for a camera when none is wired up.
pub struct H264FileSource {
    path: PathBuf,
    framerate: u32,
    writer: Option<JoinHandle<()>>,
}

impl H264FileSource {
    pub fn new(path: impl Into<PathBuf>, framerate: u32) -> Self {
        Self {
            path: path.into(),
            framerate: framerate.max(1),
            writer: None,
        }
    }
}

#[async_trait]
impl MediaSource for H264FileSource {
    async fn open(&mut self) -> anyhow::Result<Vec<Arc<dyn TrackLocal + Send + Sync>>> {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open media file {}", self.path.display()))?;

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_string(),
                ..Default::default()
            },
            "video".to_string(),
            "vantage".to_string(),
        ));

        let frame_duration = Duration::from_nanos(1_000_000_000 / u64::from(self.framerate));
        let writer_track = Arc::clone(&track);
        self.writer = Some(tokio::spawn(async move {
            let mut reader = H264Reader::new(std::io::BufReader::new(file), 1_048_576);
            let mut ticker = tokio::time::interval(frame_duration);
            loop {
                let nal = match reader.next_nal() {
                    Ok(nal) => nal,
                    Err(e) => {
                        debug!("Media file drained: {e}");
                        break;
                    }
                };
                let sample = Sample {
                    data: nal.data.freeze(),
                    duration: frame_duration,
                    ..Default::default()
                };
                if let Err(e) = writer_track.write_sample(&sample).await {
                    debug!("Stopping file source, sample write failed: {e}");
                    break;
                }
                ticker.tick().await;
            }
        }));

        info!(path = %self.path.display(), framerate = self.framerate, "Media file source opened");
        Ok(vec![track])
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.abort();
            debug!("Media file source stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_fails_for_missing_file() {
        let mut source = H264FileSource::new("/nonexistent/clip.h264", 30);
        assert!(source.open().await.is_err());
    }

    #[tokio::test]
    async fn open_returns_one_video_track() {
        let path = std::env::temp_dir().join(format!("vantage-media-test-{}.h264", std::process::id()));
        // One Annex-B start code plus an SPS-ish payload is enough to open
        std::fs::write(&path, [0u8, 0, 0, 1, 0x67, 0x42, 0x00, 0x1f, 0, 0, 0, 1, 0x65, 0x88]).unwrap();

        let mut source = H264FileSource::new(&path, 30);
        let tracks = source.open().await.unwrap();
        assert_eq!(tracks.len(), 1);

        source.stop().await.unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn stop_is_safe_before_open_and_twice() {
        let mut source = H264FileSource::new("/nonexistent/clip.h264", 30);
        source.stop().await.unwrap();
        source.stop().await.unwrap();
    }

    #[test]
    fn framerate_floor_is_one() {
        let source = H264FileSource::new("clip.h264", 0);
        assert_eq!(source.framerate, 1);
    }
}

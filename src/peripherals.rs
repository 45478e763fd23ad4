//! Device-side collaborators the orchestrator drives.
//!
//! Capture, playback, codec and wake-word detection live outside this crate;
//! these traits are the seams. Collaborators report back by sending
//! [`DeviceEvent`]s into the channel handed out by
//! [`Orchestrator::device_events`](crate::orchestrator::Orchestrator::device_events).

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::{Error, Result};

/// Things that happen on the device and feed the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// One raw PCM frame from the microphone.
    CapturedFrame(Vec<i16>),
    /// The playback queue ran dry.
    PlaybackCompleted,
    /// The wake-word detector fired with the spotted phrase.
    KeywordDetected(String),
    /// A hotkey or button asked to cut the assistant off.
    ManualInterrupt,
}

#[async_trait]
pub trait AudioCapture: Send + Sync {
    async fn start(&self, sample_rate: u32, channels: u16) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

#[async_trait]
pub trait AudioPlayback: Send + Sync {
    async fn play(&self, pcm: Vec<i16>) -> Result<()>;

    /// Drops whatever is still queued.
    async fn stop(&self) -> Result<()>;
}

/// Compression for the binary audio frames on the wire.
#[cfg_attr(test, automock)]
pub trait AudioCodec: Send + Sync {
    fn encode(&self, pcm: &[i16]) -> Result<Vec<u8>>;

    fn decode(&self, frame: &[u8]) -> Result<Vec<i16>>;
}

#[async_trait]
pub trait KeywordDetector: Send + Sync {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;
}

/// Capture that never produces frames, for headless runs.
#[derive(Debug, Default)]
pub struct SilentCapture;

#[async_trait]
impl AudioCapture for SilentCapture {
    async fn start(&self, sample_rate: u32, channels: u16) -> Result<()> {
        tracing::debug!("silent capture started: {} Hz, {} ch", sample_rate, channels);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        tracing::debug!("silent capture stopped");
        Ok(())
    }
}

/// Playback that throws audio away.
#[derive(Debug, Default)]
pub struct DiscardPlayback;

#[async_trait]
impl AudioPlayback for DiscardPlayback {
    async fn play(&self, pcm: Vec<i16>) -> Result<()> {
        tracing::trace!("discarding {} samples", pcm.len());
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Detector with no microphone of its own. Wake words arrive as
/// [`DeviceEvent::KeywordDetected`] from elsewhere, e.g. a console command.
#[derive(Debug, Default)]
pub struct ManualKeywordDetector;

#[async_trait]
impl KeywordDetector for ManualKeywordDetector {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        Ok(())
    }
}

/// Uncompressed 16-bit little-endian PCM.
#[derive(Debug, Default, Clone, Copy)]
pub struct PcmCodec;

impl AudioCodec for PcmCodec {
    fn encode(&self, pcm: &[i16]) -> Result<Vec<u8>> {
        Ok(pcm.iter().flat_map(|sample| sample.to_le_bytes()).collect())
    }

    fn decode(&self, frame: &[u8]) -> Result<Vec<i16>> {
        if frame.len() % 2 != 0 {
            return Err(Error::peripheral(format!(
                "pcm frame has odd length {}",
                frame.len()
            )));
        }
        Ok(frame
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_codec_is_little_endian() {
        let codec = PcmCodec;
        let bytes = codec.encode(&[1, -2, 0x1234]).unwrap();
        assert_eq!(bytes, vec![0x01, 0x00, 0xfe, 0xff, 0x34, 0x12]);
        assert_eq!(codec.decode(&bytes).unwrap(), vec![1, -2, 0x1234]);
    }

    #[test]
    fn pcm_codec_rejects_odd_frames() {
        assert!(matches!(PcmCodec.decode(&[1, 2, 3]), Err(Error::Peripheral(_))));
    }
}

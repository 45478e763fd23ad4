/// Audio parameters declared in the client hello.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioParams {
    /// Compressed frame format, e.g. "opus"
    format: String,

    /// Sample rate in Hz
    sample_rate: u32,

    channels: u16,

    /// Duration of one frame in milliseconds
    frame_duration: u32,
}

pub const DEFAULT_AUDIO_FORMAT: &str = "opus";
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;
pub const DEFAULT_CHANNELS: u16 = 1;
pub const DEFAULT_FRAME_DURATION_MS: u32 = 60;

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            format: DEFAULT_AUDIO_FORMAT.to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            frame_duration: DEFAULT_FRAME_DURATION_MS,
        }
    }
}

impl AudioParams {
    pub fn new(format: &str, sample_rate: u32, channels: u16, frame_duration: u32) -> Self {
        Self {
            format: format.to_string(),
            sample_rate,
            channels,
            frame_duration,
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frame_duration(&self) -> u32 {
        self.frame_duration
    }
}

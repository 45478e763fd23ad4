/// Frame counters for one client, across reconnects.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    text_frames_in: u64,
    text_frames_out: u64,
    audio_frames_in: u64,
    audio_frames_out: u64,
    dropped_frames: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_text_in(&mut self) {
        self.text_frames_in += 1;
    }

    pub(crate) fn record_text_out(&mut self) {
        self.text_frames_out += 1;
    }

    pub(crate) fn record_audio_in(&mut self) {
        self.audio_frames_in += 1;
    }

    pub(crate) fn record_audio_out(&mut self) {
        self.audio_frames_out += 1;
    }

    /// Inbound text frames that could not be decoded or had an unknown type.
    pub(crate) fn record_dropped(&mut self) {
        self.dropped_frames += 1;
    }

    pub fn text_frames_in(&self) -> u64 {
        self.text_frames_in
    }

    pub fn text_frames_out(&self) -> u64 {
        self.text_frames_out
    }

    pub fn audio_frames_in(&self) -> u64 {
        self.audio_frames_in
    }

    pub fn audio_frames_out(&self) -> u64 {
        self.audio_frames_out
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }
}

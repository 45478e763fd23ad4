use serde_json::Value;

/// Best-effort local view of device state, inferred from successful tool
/// calls. Advisory only: the device behind the tool is the source of truth.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceMirror {
    power: Option<bool>,
    volume: Option<i64>,
    music_playing: Option<bool>,
}

impl DeviceMirror {
    pub fn power(&self) -> Option<bool> {
        self.power
    }

    pub fn volume(&self) -> Option<i64> {
        self.volume
    }

    pub fn music_playing(&self) -> Option<bool> {
        self.music_playing
    }

    /// Updates the mirror from a tool that completed without error.
    pub fn observe(&mut self, tool: &str, arguments: &Value, result: &Value) {
        let action = tool.rsplit('.').next().unwrap_or(tool);

        if action.contains("turn_on") {
            self.power = Some(true);
        } else if action.contains("turn_off") {
            self.power = Some(false);
        } else if action.contains("set_volume") {
            let volume = arguments
                .get("volume")
                .and_then(Value::as_i64)
                .or_else(|| result.get("volume").and_then(Value::as_i64));
            if volume.is_some() {
                self.volume = volume;
            }
        } else if verb(action, "play") || verb(action, "resume") {
            self.music_playing = Some(true);
        } else if verb(action, "pause") || verb(action, "stop") {
            self.music_playing = Some(false);
        } else {
            return;
        }
        tracing::debug!("device mirror after {}: {:?}", tool, self);
    }
}

// `play`, `play_song` but not `display`.
fn verb(action: &str, verb: &str) -> bool {
    action == verb || action.strip_prefix(verb).is_some_and(|rest| rest.starts_with('_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn power_follows_turn_on_and_off() {
        let mut mirror = DeviceMirror::default();
        mirror.observe("self.lamp.turn_on", &json!({}), &json!(true));
        assert_eq!(mirror.power(), Some(true));
        mirror.observe("self.lamp.turn_off", &json!({}), &json!(true));
        assert_eq!(mirror.power(), Some(false));
    }

    #[test]
    fn volume_prefers_the_argument() {
        let mut mirror = DeviceMirror::default();
        mirror.observe("self.speaker.set_volume", &json!({ "volume": 30 }), &json!({ "volume": 99 }));
        assert_eq!(mirror.volume(), Some(30));
        mirror.observe("self.speaker.set_volume", &json!({}), &json!({ "volume": 55 }));
        assert_eq!(mirror.volume(), Some(55));
    }

    #[test]
    fn music_state_and_unrelated_tools() {
        let mut mirror = DeviceMirror::default();
        mirror.observe("self.music.play", &json!({}), &Value::Null);
        assert_eq!(mirror.music_playing(), Some(true));
        mirror.observe("self.music.pause", &json!({}), &Value::Null);
        assert_eq!(mirror.music_playing(), Some(false));

        let before = mirror.clone();
        mirror.observe("self.camera.take_photo", &json!({}), &Value::Null);
        mirror.observe("self.screen.display_text", &json!({}), &Value::Null);
        assert_eq!(mirror, before);
    }
}

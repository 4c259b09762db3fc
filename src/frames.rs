//! Frame model for the pipeline stream flowing through the tap.
//!
//! The synthesis stage sends datagrams in one of two shapes:
//! - `0x01` + UTF-8 JSON control message (`{"type": ..., "state": ...}`)
//! - `0x02` + direction byte (0 = outbound, 1 = inbound) + raw audio payload
//!
//! Anything else is an opaque frame: it carries no state for the wobble feed
//! and is forwarded downstream untouched like everything else.

use bytes::Bytes;
use serde::Deserialize;

pub const FRAME_KIND_CONTROL: u8 = 0x01;
pub const FRAME_KIND_AUDIO: u8 = 0x02;

pub const DIR_OUTBOUND: u8 = 0x00;
pub const DIR_INBOUND: u8 = 0x01;

#[derive(Deserialize, Debug, Clone)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub state: Option<String>,
    pub session_id: Option<String>,
}

/// Which way an audio chunk is traveling: outbound chunks are synthesized
/// speech on the way to the transport, inbound chunks are microphone audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDirection {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone)]
pub enum PipelineFrame {
    BotStartedSpeaking,
    BotStoppedSpeaking,
    /// Barge-in: the user spoke while the bot was still talking.
    UserStartedSpeaking,
    SessionStart { session_id: Option<String> },
    Audio { direction: AudioDirection, data: Bytes },
    /// Unrecognized or unparseable frame. State-irrelevant, pass through.
    Opaque,
}

impl PipelineFrame {
    /// Decode one datagram. Never fails: anything that does not match the
    /// wire shapes above becomes `Opaque`.
    pub fn decode(datagram: &[u8]) -> Self {
        match datagram.first() {
            Some(&FRAME_KIND_CONTROL) => Self::decode_control(&datagram[1..]),
            Some(&FRAME_KIND_AUDIO) => Self::decode_audio(&datagram[1..]),
            _ => PipelineFrame::Opaque,
        }
    }

    fn decode_control(payload: &[u8]) -> Self {
        let msg: ControlMessage = match serde_json::from_slice(payload) {
            Ok(msg) => msg,
            Err(_) => return PipelineFrame::Opaque,
        };

        match (msg.msg_type.as_str(), msg.state.as_deref()) {
            ("tts", Some("start")) => PipelineFrame::BotStartedSpeaking,
            ("tts", Some("stop")) => PipelineFrame::BotStoppedSpeaking,
            ("vad", Some("start")) => PipelineFrame::UserStartedSpeaking,
            ("session", Some("start")) => PipelineFrame::SessionStart {
                session_id: msg.session_id,
            },
            _ => PipelineFrame::Opaque,
        }
    }

    fn decode_audio(payload: &[u8]) -> Self {
        let Some(&dir) = payload.first() else {
            return PipelineFrame::Opaque;
        };
        let direction = match dir {
            DIR_OUTBOUND => AudioDirection::Outbound,
            DIR_INBOUND => AudioDirection::Inbound,
            _ => return PipelineFrame::Opaque,
        };
        // An empty payload is still a valid (degenerate) chunk
        PipelineFrame::Audio {
            direction,
            data: Bytes::copy_from_slice(&payload[1..]),
        }
    }
}

//! Session descriptor written next to the audio for the decoder.

use serde::Serialize;

use crate::task::Task;

/// Session types recorded with a far-field microphone.
const FAR_TALK_SESSION_TYPES: &[&str] = &["fartalk", "boundary"];

/// Participant list plus requested output formats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionDescriptor {
    #[serde(rename = "Participants")]
    pub participants: Vec<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<String>>,
}

/// One recorded channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    #[serde(rename = "ChannelId")]
    pub channel_id: u32,
    pub recorder: u32,
    #[serde(rename = "UserId")]
    pub user_id: u32,
    #[serde(rename = "FarTalkMic")]
    pub far_talk_mic: bool,
    #[serde(rename = "Transcribe")]
    pub transcribe: bool,
}

impl SessionDescriptor {
    /// Build the descriptor for `task`, or `None` when the task carries
    /// neither a channel count nor output formats.
    pub fn for_task(task: &Task) -> Option<Self> {
        let channels = task.channel_count.filter(|&n| n > 0);
        if channels.is_none() && task.output_formats.is_none() {
            return None;
        }

        let far_talk = task
            .session_type
            .as_deref()
            .is_some_and(|t| FAR_TALK_SESSION_TYPES.contains(&t));

        let participants = (1..=channels.unwrap_or(0))
            .map(|id| Participant {
                channel_id: id,
                recorder: 1,
                user_id: id,
                far_talk_mic: far_talk,
                transcribe: true,
            })
            .collect();

        let output = task.output_formats.as_ref().map(|formats| {
            formats
                .iter()
                .map(|f| f.replacen('.', "", 1))
                .collect()
        });

        Some(Self {
            participants,
            output,
        })
    }
}

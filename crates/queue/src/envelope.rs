use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::CallJob;

/// Give up after this many delivery attempts.
pub const MAX_ATTEMPTS: u32 = 5;
/// Ceiling for the exponential backoff, in seconds.
pub const BACKOFF_CAP_SECS: u64 = 600;

/// Broker-level wrapper around a [`CallJob`].
///
/// `attempts` counts deliveries that ended in a nack; `not_before` delays
/// redelivery so backoff survives the broker round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub not_before: Option<i64>,
    pub job: CallJob,
}

impl Envelope {
    pub fn new(job: CallJob) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempts: 0,
            not_before: None,
            job,
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= MAX_ATTEMPTS
    }
}

/// Exponential backoff in seconds: `2^attempts`, capped.
pub fn backoff_secs(attempts: u32) -> u64 {
    2u64.checked_pow(attempts)
        .map(|secs| secs.min(BACKOFF_CAP_SECS))
        .unwrap_or(BACKOFF_CAP_SECS)
}

/// Full jitter over the capped exponential delay.
pub fn jittered_backoff(attempts: u32) -> u64 {
    rand::thread_rng().gen_range(0..=backoff_secs(attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::CallAudio;
    use trunkscribe_metadata::{AudioType, Metadata};

    fn job() -> CallJob {
        CallJob {
            metadata: Metadata {
                freq: 0,
                start_time: 10,
                stop_time: 20,
                call_length: 10.0,
                talkgroup: 1,
                talkgroup_tag: String::new(),
                talkgroup_description: String::new(),
                talkgroup_group_tag: String::new(),
                talkgroup_group: String::new(),
                audio_type: AudioType::Analog,
                short_name: "sys".into(),
                emergency: 0,
                encrypted: 0,
                freq_list: Vec::new(),
                src_list: Vec::new(),
            },
            audio: CallAudio::Url("https://media.example.com/a.mp3".into()),
            whisper_implementation: None,
            call_id: None,
            index_name: None,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_secs(0), 1);
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(4), 16);
        assert_eq!(backoff_secs(9), 512);
        assert_eq!(backoff_secs(10), BACKOFF_CAP_SECS);
        assert_eq!(backoff_secs(64), BACKOFF_CAP_SECS);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for attempts in 0..12 {
            let delay = jittered_backoff(attempts);
            assert!(delay <= backoff_secs(attempts));
        }
    }

    #[test]
    fn attempts_exhaust_at_max() {
        let mut envelope = Envelope::new(job());
        envelope.attempts = MAX_ATTEMPTS;
        assert!(envelope.attempts_exhausted());
    }

    #[test]
    fn envelope_round_trips() {
        let envelope = Envelope::new(job());
        let raw = serde_json::to_string(&envelope).unwrap();
        let restored: Envelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(restored, envelope);
    }
}

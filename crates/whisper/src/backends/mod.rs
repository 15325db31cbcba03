mod asr_api;
mod deepgram;
mod local;
mod openai;
mod whisper_cpp;

pub use asr_api::WhisperAsrApi;
pub use deepgram::DeepgramApi;
pub use local::LocalWhisper;
pub use openai::OpenAiApi;
pub use whisper_cpp::WhisperCpp;

/// Deadline for hosted engine HTTP APIs.
pub(crate) const API_TIMEOUT_SECS: u64 = 120;

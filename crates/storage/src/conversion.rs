//! Audio conversion through ffmpeg.
//!
//! Engines want 16 kHz mono s16le wav; archived audio is 32 kbps mp3 with
//! id3 tags derived from the call metadata. ffmpeg is always invoked with an
//! explicit argument array and its exit status checked.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::process::Command;
use trunkscribe_metadata::Metadata;

use crate::{Result, StorageError};

/// id3 tags for the archived mp3.
fn build_metadata_args(metadata: &Metadata) -> Vec<String> {
    let start_time = DateTime::<Utc>::from_timestamp(metadata.start_time, 0).unwrap_or_default();

    let mut artist = {
        let mut tags: Vec<&str> = Vec::new();
        for src in &metadata.src_list {
            if !src.tag.is_empty() && !tags.contains(&src.tag.as_str()) {
                tags.push(&src.tag);
            }
        }
        tags.join(", ")
    };
    if artist.is_empty() {
        artist = metadata.talkgroup_description.clone();
    }

    vec![
        "-metadata".into(),
        "composer=trunk-recorder".into(),
        "-metadata".into(),
        format!("creation_time={}", start_time.format("%Y-%m-%d %H:%M:%S")),
        "-metadata".into(),
        format!("date={}", start_time.format("%Y-%m-%d")),
        "-metadata".into(),
        format!("year={}", start_time.format("%Y")),
        "-metadata".into(),
        format!("title={}", metadata.talkgroup_tag),
        "-metadata".into(),
        format!("artist={artist}"),
        "-metadata".into(),
        format!("album={}", metadata.talkgroup_group),
    ]
}

async fn convert_file(
    audio: &Path,
    extension: &str,
    codec_args: &[&str],
    metadata: Option<&Metadata>,
) -> Result<PathBuf> {
    let output_path = audio.with_extension(extension);

    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        audio.display().to_string(),
    ];
    args.extend(codec_args.iter().map(|arg| arg.to_string()));
    if let Some(metadata) = metadata {
        args.extend(build_metadata_args(metadata));
    }
    args.push(output_path.display().to_string());

    let output = Command::new("ffmpeg").args(&args).output().await?;
    if !output.status.success() {
        return Err(StorageError::Conversion(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(output_path)
}

/// 16 kHz mono s16le wav, the input every engine expects.
pub async fn convert_to_wav(audio: &Path) -> Result<PathBuf> {
    convert_file(
        audio,
        "wav",
        &["-c:a", "pcm_s16le", "-ar", "16000", "-ac", "1"],
        None,
    )
    .await
}

/// 32 kbps mp3 for the archive, tagged from the call metadata.
pub async fn convert_to_mp3(audio: &Path, metadata: Option<&Metadata>) -> Result<PathBuf> {
    convert_file(audio, "mp3", &["-c:a", "libmp3lame", "-b:a", "32k"], metadata).await
}

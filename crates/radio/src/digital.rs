//! Digital (trunked) call path: prompt seeding and source attribution.

use std::path::Path;

use trunkscribe_metadata::{Metadata, SrcListItem};
use trunkscribe_transcript::Transcript;
use trunkscribe_whisper::{
    transcribe, TranscribeOptions, WhisperEngine, WhisperResult, WhisperSegment,
};

use crate::{RadioError, Result, ShaperConfig};

/// Build engine options from the call's source list: the unique
/// `transcript_prompt` strings, first occurrence first, each separated by a
/// space.
pub fn build_transcribe_options(metadata: &Metadata, config: &ShaperConfig) -> TranscribeOptions {
    let mut initial_prompt = String::new();
    for src in &metadata.src_list {
        if !src.transcript_prompt.is_empty() && !initial_prompt.contains(&src.transcript_prompt) {
            initial_prompt.push(' ');
            initial_prompt.push_str(&src.transcript_prompt);
        }
    }

    TranscribeOptions {
        initial_prompt,
        vad_filter: config.vad_filter,
        cleanup: true,
        decode: config.decode.clone(),
        cleanup_config: config.cleanup_config.clone(),
    }
}

/// The source whose `pos` is closest to the segment's start; ties go to the
/// earlier source.
fn closest_src<'a>(src_list: &'a [SrcListItem], segment: &WhisperSegment) -> Option<&'a SrcListItem> {
    let mut best: Option<(&SrcListItem, f64)> = None;
    for src in src_list {
        let distance = (src.pos - segment.start).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((src, distance)),
        }
    }
    best.map(|(src, _)| src)
}

/// Attribute each segment to its source and build a validated transcript.
pub fn process_response(response: &WhisperResult, metadata: &Metadata) -> Result<Transcript> {
    if metadata.src_list.is_empty() {
        return Err(RadioError::NoSources);
    }

    let mut transcript = Transcript::new();
    for segment in &response.segments {
        let src = closest_src(&metadata.src_list, segment);
        transcript.append(segment.text.trim(), src.cloned());
    }
    transcript.validate()?;

    Ok(transcript)
}

/// Full digital path: shape options, run the engine, attribute sources.
pub async fn transcribe_call(
    engine: &dyn WhisperEngine,
    audio: &Path,
    metadata: &Metadata,
    config: &ShaperConfig,
    language: &str,
) -> Result<Transcript> {
    let options = build_transcribe_options(metadata, config);
    let response = transcribe(engine, audio, &options, language).await?;
    process_response(&response, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(id: i64, pos: f64, tag: &str, prompt: &str) -> SrcListItem {
        SrcListItem {
            src: id,
            time: 0,
            pos,
            emergency: 0,
            signal_system: String::new(),
            tag: tag.into(),
            transcript_prompt: prompt.into(),
        }
    }

    fn metadata_with(src_list: Vec<SrcListItem>) -> Metadata {
        Metadata {
            freq: 851_137_500,
            start_time: 1_704_067_200,
            stop_time: 1_704_067_205,
            call_length: 5.0,
            talkgroup: 1234,
            talkgroup_tag: "Fire Dispatch".into(),
            talkgroup_description: "Citywide Fire Dispatch".into(),
            talkgroup_group_tag: "Fire".into(),
            talkgroup_group: "Fire".into(),
            audio_type: trunkscribe_metadata::AudioType::Digital,
            short_name: "cfd".into(),
            emergency: 0,
            encrypted: 0,
            freq_list: Vec::new(),
            src_list,
        }
    }

    fn segment(start: f64, end: f64, text: &str) -> WhisperSegment {
        WhisperSegment {
            start,
            end,
            text: text.into(),
        }
    }

    #[test]
    fn prompt_concatenates_unique_prompts_in_order() {
        let metadata = metadata_with(vec![
            src(1, 0.0, "E96", "Engine 96"),
            src(2, 1.0, "", ""),
            src(3, 2.0, "B12", "Battalion 12"),
            src(4, 3.0, "E96", "Engine 96"),
        ]);
        let options = build_transcribe_options(&metadata, &ShaperConfig::default());
        assert_eq!(options.initial_prompt, " Engine 96 Battalion 12");
        assert!(options.cleanup);
    }

    #[test]
    fn segments_attributed_to_nearest_source() {
        let metadata = metadata_with(vec![src(1, 0.0, "E96", ""), src(2, 2.5, "B12", "")]);
        let response = WhisperResult {
            text: "E96 on scene\ncopy".into(),
            segments: vec![segment(0.0, 1.2, "E96 on scene"), segment(2.6, 4.1, " copy ")],
            language: Some("en".into()),
        };
        let transcript = process_response(&response, &metadata).unwrap();
        let segments = transcript.segments();
        assert_eq!(segments[0].0.as_ref().unwrap().src, 1);
        assert_eq!(segments[0].1, "E96 on scene");
        assert_eq!(segments[1].0.as_ref().unwrap().src, 2);
        assert_eq!(segments[1].1, "copy");
    }

    #[test]
    fn tie_goes_to_earlier_source() {
        let metadata = metadata_with(vec![src(1, 0.0, "A", ""), src(2, 2.0, "B", "")]);
        let response = WhisperResult {
            text: "even split".into(),
            segments: vec![segment(1.0, 1.5, "even split")],
            language: Some("en".into()),
        };
        let transcript = process_response(&response, &metadata).unwrap();
        assert_eq!(transcript.segments()[0].0.as_ref().unwrap().src, 1);
    }

    #[test]
    fn single_source_at_zero_takes_everything() {
        let metadata = metadata_with(vec![src(9, 0.0, "Dispatch", "")]);
        let response = WhisperResult {
            text: "all units respond\nstructure fire".into(),
            segments: vec![
                segment(0.0, 2.0, "all units respond"),
                segment(2.0, 4.0, "structure fire"),
            ],
            language: Some("en".into()),
        };
        let transcript = process_response(&response, &metadata).unwrap();
        assert!(transcript
            .segments()
            .iter()
            .all(|(src, _)| src.as_ref().map(|s| s.src) == Some(9)));
    }

    #[test]
    fn attributed_sources_come_from_the_input_list() {
        let metadata = metadata_with(vec![src(1, 0.0, "A", ""), src(2, 3.0, "B", "")]);
        let response = WhisperResult {
            text: "one\ntwo\nthree".into(),
            segments: vec![
                segment(0.2, 1.0, "one"),
                segment(1.4, 2.0, "two"),
                segment(3.1, 4.0, "three"),
            ],
            language: Some("en".into()),
        };
        let transcript = process_response(&response, &metadata).unwrap();
        let input_ids: Vec<i64> = metadata.src_list.iter().map(|s| s.src).collect();
        for (src, _) in transcript.segments() {
            assert!(input_ids.contains(&src.as_ref().unwrap().src));
        }
    }

    #[test]
    fn empty_response_fails_validation() {
        let metadata = metadata_with(vec![src(1, 0.0, "A", "")]);
        let response = WhisperResult::empty("en");
        assert!(process_response(&response, &metadata).is_err());
    }
}

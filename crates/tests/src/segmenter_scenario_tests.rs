//! The end-to-end segmentation scenarios, run over the capture-format
//! path (stereo 48kHz bytes → normalize → segment) with a deterministic
//! classifier so the assertions can be exact.

use scribe_pipeline::{
    samples_from_le_bytes, Normalizer, Segmenter, SegmenterConfig, VoiceSegment,
};

use crate::fixtures::{silence_stereo48_bytes, voiced_stereo48_bytes, EnergyClassifier};

fn segmenter() -> (Normalizer, Segmenter) {
    (
        Normalizer::new(),
        Segmenter::new(
            "speaker-a",
            Box::new(EnergyClassifier::new(30)),
            SegmenterConfig::default(),
        ),
    )
}

/// Feeds capture-format bytes in 20ms batches, the way the platform
/// delivers them, flushing after each batch.
fn feed(
    normalizer: &Normalizer,
    segmenter: &mut Segmenter,
    bytes: &[u8],
    out: &mut Vec<VoiceSegment>,
) {
    // 20ms at 48kHz stereo 16-bit = 3840 bytes.
    for batch in bytes.chunks(3840) {
        let stereo = samples_from_le_bytes(batch);
        let mono16 = normalizer.normalize(&stereo).unwrap();
        segmenter.push(&mono16);
        out.extend(segmenter.flush().unwrap());
    }
}

#[test]
fn pure_tone_five_seconds_is_one_segment() {
    let (normalizer, mut seg) = segmenter();
    let mut out = Vec::new();
    feed(&normalizer, &mut seg, &voiced_stereo48_bytes(5000), &mut out);
    feed(&normalizer, &mut seg, &silence_stereo48_bytes(1500), &mut out);

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].index, 0);
    assert!(
        (out[0].duration_ms as i64 - 5000).abs() <= 30,
        "duration {}",
        out[0].duration_ms
    );
    assert!(out[0].started_ts <= out[0].captured_ts);
}

#[test]
fn two_utterances_with_long_gap_are_two_segments() {
    let (normalizer, mut seg) = segmenter();
    let mut out = Vec::new();
    feed(&normalizer, &mut seg, &voiced_stereo48_bytes(1500), &mut out);
    feed(&normalizer, &mut seg, &silence_stereo48_bytes(2000), &mut out);
    feed(&normalizer, &mut seg, &voiced_stereo48_bytes(1500), &mut out);
    feed(&normalizer, &mut seg, &silence_stereo48_bytes(1500), &mut out);

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].index, 0);
    assert_eq!(out[1].index, 1);
    for segment in &out {
        assert!(
            (segment.duration_ms as i64 - 1500).abs() <= 30,
            "duration {}",
            segment.duration_ms
        );
    }
}

#[test]
fn short_blip_is_never_emitted() {
    let (normalizer, mut seg) = segmenter();
    let mut out = Vec::new();
    feed(&normalizer, &mut seg, &silence_stereo48_bytes(500), &mut out);
    feed(&normalizer, &mut seg, &voiced_stereo48_bytes(100), &mut out);
    feed(&normalizer, &mut seg, &silence_stereo48_bytes(3000), &mut out);

    assert!(out.is_empty());
}

#[test]
fn sub_gap_silence_is_stitched_into_one_segment() {
    let (normalizer, mut seg) = segmenter();
    let mut out = Vec::new();
    feed(&normalizer, &mut seg, &voiced_stereo48_bytes(1000), &mut out);
    feed(&normalizer, &mut seg, &silence_stereo48_bytes(500), &mut out);
    feed(&normalizer, &mut seg, &voiced_stereo48_bytes(1000), &mut out);
    feed(&normalizer, &mut seg, &silence_stereo48_bytes(1500), &mut out);

    assert_eq!(out.len(), 1);
    assert!(
        (out[0].duration_ms as i64 - 2500).abs() <= 30,
        "duration {}",
        out[0].duration_ms
    );

    // The stitched stretch keeps the silent samples in place between
    // the two voiced intervals.
    let pcm = &out[0].pcm;
    let mid = &pcm[(1050 * 16)..(1450 * 16)];
    assert!(mid.iter().all(|&s| s == 0), "expected silence mid-segment");
    assert!(pcm[..(1000 * 16)].iter().any(|&s| s.unsigned_abs() > 500));
    assert!(pcm[(1500 * 16)..].iter().any(|&s| s.unsigned_abs() > 500));
}

#[test]
fn max_length_cap_finalizes_mid_speech() {
    let (normalizer, mut seg) = segmenter();
    let mut out = Vec::new();
    feed(&normalizer, &mut seg, &voiced_stereo48_bytes(35_000), &mut out);

    assert_eq!(out.len(), 1, "only the capped segment is finalized");
    assert_eq!(out[0].index, 0);
    assert!(
        out[0].duration_ms >= 30_000 && out[0].duration_ms <= 30_030,
        "duration {}",
        out[0].duration_ms
    );
    // The remaining five seconds are still an open utterance.
    assert!(seg.in_speech());
}

#[test]
fn every_emitted_segment_ends_on_active_audio() {
    let (normalizer, mut seg) = segmenter();
    let mut out = Vec::new();
    for _ in 0..3 {
        feed(&normalizer, &mut seg, &voiced_stereo48_bytes(700), &mut out);
        feed(&normalizer, &mut seg, &silence_stereo48_bytes(1400), &mut out);
    }

    assert_eq!(out.len(), 3);
    let indices: Vec<u32> = out.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    for segment in &out {
        let tail = &segment.pcm[segment.pcm.len() - 480..];
        assert!(
            tail.iter().any(|&s| s.unsigned_abs() > 500),
            "trailing silence not trimmed"
        );
        assert!(segment.duration_ms >= 200);
    }
}

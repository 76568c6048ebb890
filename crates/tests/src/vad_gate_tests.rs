//! Smoke tests for the production two-stage gate with the real WebRTC
//! VAD behind it. Assertions stay coarse: the second stage is adaptive,
//! so exact frame-level expectations belong to the deterministic
//! classifier tests.

use scribe_pipeline::{FrameActivity, Segmenter, SegmenterConfig, VadGate, VadMode};

use crate::fixtures::{silence_mono16, voiced_mono16};

#[test]
fn voiced_audio_opens_the_gate() {
    let mut gate = VadGate::new(30, -45.0, VadMode::Aggressive).unwrap();
    let audio = voiced_mono16(600);
    let active = audio
        .chunks_exact(480)
        .filter(|frame| gate.classify(frame).unwrap() == FrameActivity::Active)
        .count();
    assert!(active > 0, "no frame of voiced audio classified active");
}

#[test]
fn silence_never_opens_the_gate() {
    let mut gate = VadGate::new(30, -45.0, VadMode::Aggressive).unwrap();
    for frame in silence_mono16(900).chunks_exact(480) {
        assert_eq!(gate.classify(frame).unwrap(), FrameActivity::Inactive);
    }
}

#[test]
fn gate_driven_segmenter_emits_for_voiced_audio() {
    let gate = VadGate::new(30, -45.0, VadMode::Aggressive).unwrap();
    let mut seg = Segmenter::new("real-gate", Box::new(gate), SegmenterConfig::default());

    seg.push(&voiced_mono16(2000));
    seg.push(&silence_mono16(1500));
    let out = seg.flush().unwrap();

    assert!(!out.is_empty(), "voiced audio produced no segment");
    assert_eq!(out[0].index, 0);
    assert!(out[0].duration_ms >= 200);
    assert!(out[0].duration_ms <= 2100);
}

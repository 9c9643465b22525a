//! Frame position integration tests.

use scenecut::{FrameRate, FrameTime, SceneCutError};

fn rates() -> Vec<FrameRate> {
    [(24, 1), (25, 1), (30, 1), (60, 1), (24_000, 1_001), (30_000, 1_001), (60_000, 1_001)]
        .into_iter()
        .map(|(numerator, denominator)| FrameRate::new(numerator, denominator).unwrap())
        .collect()
}

// ── Round trips ────────────────────────────────────────────────────

#[test]
fn seconds_round_trip_preserves_frame_number() {
    for rate in rates() {
        for frame in (0..5_000u64).chain([86_399, 1_000_000, 10_000_000]) {
            let position = FrameTime::from_frames(frame, rate);
            let back = FrameTime::from_seconds(position.seconds(), rate).unwrap();
            assert_eq!(back.frame_number(), frame, "rate {rate}, frame {frame}");
        }
    }
}

#[test]
fn timecode_round_trip_preserves_frame_number() {
    for rate in rates() {
        for frame in [0u64, 1, 2, 23, 24, 1_199, 1_871, 107_892] {
            let position = FrameTime::from_frames(frame, rate);
            let parsed = FrameTime::parse(&position.timecode(), rate).unwrap();
            assert_eq!(parsed, position, "rate {rate}, timecode {}", position.timecode());
        }
    }
}

// ── Parsing ────────────────────────────────────────────────────────

#[test]
fn parse_accepts_all_forms() {
    let rate = FrameRate::new(25, 1).unwrap();
    assert_eq!(FrameTime::parse("00:01:00", rate).unwrap().frame_number(), 1_500);
    assert_eq!(FrameTime::parse("00:00:01.5", rate).unwrap().frame_number(), 38);
    assert_eq!(FrameTime::parse("00:00:02:10", rate).unwrap().frame_number(), 60);
    assert_eq!(FrameTime::parse("1234", rate).unwrap().frame_number(), 1_234);
    assert_eq!(FrameTime::parse("2.5s", rate).unwrap().frame_number(), 63);
    assert_eq!(FrameTime::parse(" 4.0 ", rate).unwrap().frame_number(), 100);
}

#[test]
fn parse_rejects_garbage() {
    let rate = FrameRate::new(25, 1).unwrap();
    for value in ["", "abc", "00:61:00", "00:00:75", "1:2", "00:00:01:30", "-3s"] {
        assert!(
            matches!(
                FrameTime::parse(value, rate),
                Err(SceneCutError::InvalidTimecode(_))
            ),
            "{value:?} should be rejected"
        );
    }
}

#[test]
fn reference_clip_start_lands_on_frame_1199() {
    let rate = FrameRate::new(24_000, 1_001).unwrap();
    let start = FrameTime::parse("00:00:50", rate).unwrap();
    let end = FrameTime::parse("00:01:19", rate).unwrap();
    assert_eq!(start.frame_number(), 1_199);
    assert_eq!(end.frame_number(), 1_894);
}

// ── Frame rates ────────────────────────────────────────────────────

#[test]
fn frame_rate_normalises_and_displays() {
    assert_eq!(FrameRate::new(50, 2).unwrap(), FrameRate::new(25, 1).unwrap());
    assert_eq!(FrameRate::new(25, 1).unwrap().to_string(), "25");
    assert_eq!(FrameRate::new(24_000, 1_001).unwrap().to_string(), "24000/1001");
    assert_eq!(
        FrameRate::from_fps(23.976).unwrap(),
        FrameRate::new(24_000, 1_001).unwrap()
    );
    assert_eq!("30000/1001".parse::<FrameRate>().unwrap().numerator(), 30_000);
    assert!(FrameRate::new(0, 1).is_err());
    assert!(FrameRate::from_fps(f64::NAN).is_err());
}

#[test]
fn mixed_rates_do_not_compare() {
    let a = FrameTime::from_frames(10, FrameRate::new(25, 1).unwrap());
    let b = FrameTime::from_frames(10, FrameRate::new(30, 1).unwrap());
    assert_eq!(a.partial_cmp(&b), None);
    assert!(matches!(
        b.frames_since(&a),
        Err(SceneCutError::FrameRateMismatch { .. })
    ));
    assert_eq!((a + 5).frames_since(&a).unwrap(), 5);
    assert_eq!((a - 50).frame_number(), 0);
}

use super::*;

#[test]
fn test_capture_period_is_32ms() {
    let period_ms = CAPTURE_PERIOD_SIZE as f32 / CAPTURE_SAMPLING_RATE as f32 * 1000.0;
    assert!((period_ms - 32.0).abs() < 0.01);
    assert_eq!(CAPTURE_PERIOD_SIZE, 512);
}

#[test]
fn test_playback_period_is_about_21ms() {
    let period_ms = PLAYBACK_PERIOD_SIZE as f32 / PLAYBACK_SAMPLING_RATE as f32 * 1000.0;
    assert!((period_ms - 21.33).abs() < 0.01);
    assert_eq!(PLAYBACK_PERIOD_SIZE, 1024);
}

#[test]
fn test_codec_rates_are_supported() {
    assert!(is_supported_rate(CAPTURE_SAMPLING_RATE));
    assert!(is_supported_rate(PLAYBACK_SAMPLING_RATE));
    assert!(!is_supported_rate(12345));
    assert!(!is_supported_rate(0));
}

#[test]
fn test_frames_for_duration_rounds_up() {
    assert_eq!(frames_for_duration(16000, 32), 512);
    assert_eq!(frames_for_duration(48000, 10), 480);
    // 11025 * 10 / 1000 = 110.25 -> 111
    assert_eq!(frames_for_duration(11025, 10), 111);
}

#[test]
fn test_staging_holds_several_capture_periods() {
    let staging = frames_for_duration(CAPTURE_SAMPLING_RATE, DEFAULT_MIC_FIFO_MS);
    assert!(staging >= CAPTURE_PERIOD_SIZE * 2);
}

#[test]
fn test_reference_fifo_outlasts_engine_budget() {
    assert!(DEFAULT_REFERENCE_FIFO_MS as u64 > DEFAULT_ENGINE_TIMEOUT_MS * 2);
}

use super::*;

fn s16_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn s16_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

#[test]
fn test_equal_rate_and_layout_is_bit_exact() {
    let mut r = ReferenceResampler::new(StreamFormat::s16(16000, 1), 16000, 1, 10).unwrap();
    let input = s16_bytes(&[0, 100, -100, i16::MAX, i16::MIN]);
    let mut output = Vec::new();

    let frames = r.convert(&input, &mut output).unwrap();
    assert_eq!(frames, 5);
    assert_eq!(output, input);
}

#[test]
fn test_stereo_reference_is_downmixed_for_mono_mic() {
    let mut r = ReferenceResampler::new(StreamFormat::s16(16000, 2), 16000, 1, 10).unwrap();
    let input = s16_bytes(&[1000, 3000, -200, -400]);
    let mut output = Vec::new();

    assert_eq!(r.convert(&input, &mut output).unwrap(), 2);
    assert_eq!(s16_samples(&output), vec![2000, -300]);
}

#[test]
fn test_mono_reference_is_duplicated_for_stereo_mic() {
    let mut r = ReferenceResampler::new(StreamFormat::s16(16000, 1), 16000, 2, 10).unwrap();
    let mut output = Vec::new();

    r.convert(&s16_bytes(&[7, -7]), &mut output).unwrap();
    assert_eq!(s16_samples(&output), vec![7, 7, -7, -7]);
}

#[test]
fn test_s32_source_is_stored_as_s16() {
    let source = StreamFormat::new(16000, 1, SampleFormat::S32Le);
    let mut r = ReferenceResampler::new(source, 16000, 1, 10).unwrap();
    let input: Vec<u8> = (1i32 << 30).to_le_bytes().to_vec();
    let mut output = Vec::new();

    r.convert(&input, &mut output).unwrap();
    assert_eq!(s16_samples(&output), vec![16384]);
}

#[test]
fn test_partial_frame_is_rejected() {
    let mut r = ReferenceResampler::new(StreamFormat::s16(48000, 2), 16000, 1, 10).unwrap();
    let mut output = Vec::new();
    let result = r.convert(&[0u8; 6], &mut output);
    assert!(matches!(result, Err(AecError::InvalidBuffer { .. })));
    assert!(output.is_empty());
}

#[test]
fn test_unsupported_rate_pair_fails_init() {
    let result = ReferenceResampler::new(StreamFormat::s16(12345, 2), 16000, 1, 10);
    assert!(matches!(
        result,
        Err(AecError::ResamplerInit {
            from_rate: 12345,
            to_rate: 16000,
            ..
        })
    ));
}

#[test]
fn test_short_input_is_held_until_a_chunk_fills() {
    let mut r = ReferenceResampler::new(StreamFormat::s16(48000, 2), 16000, 1, 10).unwrap();
    let mut output = Vec::new();

    // 100 frames < 480-frame chunk
    let frames = r.convert(&vec![0u8; 100 * 4], &mut output).unwrap();
    assert_eq!(frames, 0);
    assert!(output.is_empty());
    assert_eq!(r.pending_frames(), 100);

    r.reset();
    assert_eq!(r.pending_frames(), 0);
}

#[test]
fn test_downsampling_tracks_rate_ratio_over_many_blocks() {
    let mut r = ReferenceResampler::new(StreamFormat::s16(48000, 2), 16000, 1, 10).unwrap();
    let block: Vec<i16> = (0..1024 * 2)
        .map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16)
        .collect();
    let block = s16_bytes(&block);

    let mut total_out = 0usize;
    let mut output = Vec::new();
    for _ in 0..50 {
        total_out += r.convert(&block, &mut output).unwrap();
    }

    // 50 * 1024 input frames at 48kHz -> ~17067 frames at 16kHz, minus what is still pending
    let expected = 50 * 1024 / 3;
    assert!(total_out <= expected);
    assert!(expected - total_out <= 480, "lost too many frames: {}", expected - total_out);
    assert_eq!(output.len(), total_out * 2);
}

#[test]
fn test_map_available_scales_frame_counts() {
    let r = ReferenceResampler::new(StreamFormat::s16(48000, 2), 16000, 1, 10).unwrap();
    assert_eq!(r.map_available(1024), 341);
    assert_eq!(r.map_available(0), 0);
    assert_eq!(r.map_available(3), 1);
}

#[test]
fn test_map_channels_identity() {
    let mut out = Vec::new();
    map_channels(&[0.1, 0.2], 2, 2, &mut out);
    assert_eq!(out, vec![0.1, 0.2]);
}

/// Index of the first sample at or above half of `level`
fn step_position(samples: &[i16], level: i16) -> Option<usize> {
    samples.iter().position(|&s| s >= level / 2)
}

#[test]
fn test_filter_delay_is_removed_from_output() {
    let mut r = ReferenceResampler::new(StreamFormat::s16(48000, 1), 16000, 1, 10).unwrap();
    let mut input = vec![0i16; 960];
    input.extend(std::iter::repeat(10000).take(2880));
    let mut output = Vec::new();
    r.convert(&s16_bytes(&input), &mut output).unwrap();

    // Input frame 960 at 48 kHz is output frame 320 at 16 kHz
    let step = step_position(&s16_samples(&output), 10000).expect("step in output");
    assert!((319..=321).contains(&step), "step landed at {}", step);
}

#[test]
fn test_reset_removes_filter_delay_again() {
    let mut r = ReferenceResampler::new(StreamFormat::s16(48000, 1), 16000, 1, 10).unwrap();
    let mut output = Vec::new();
    r.convert(&s16_bytes(&vec![5000i16; 1920]), &mut output).unwrap();
    r.reset();

    let mut input = vec![0i16; 480];
    input.extend(std::iter::repeat(10000).take(2400));
    output.clear();
    r.convert(&s16_bytes(&input), &mut output).unwrap();

    let step = step_position(&s16_samples(&output), 10000).expect("step in output");
    assert!((159..=161).contains(&step), "step landed at {}", step);
}

#[test]
fn test_latency_counts_pending_input_and_filter_delay() {
    let mut r = ReferenceResampler::new(StreamFormat::s16(48000, 1), 16000, 1, 10).unwrap();
    let mut output = Vec::new();
    r.convert(&vec![0u8; 90 * 2], &mut output).unwrap();

    let delay = r.resampler.as_ref().map_or(0, |x| x.output_delay()) as u32;
    assert_eq!(r.latency_frames(), 30 + delay);

    let passthrough = ReferenceResampler::new(StreamFormat::s16(16000, 1), 16000, 1, 10).unwrap();
    assert_eq!(passthrough.latency_frames(), 0);
}

//! Display formatting for device numeric state.
//!
//! Pure functions over values the device accessors return; nothing here
//! reaches back into the device layer.

/// Formats a sample rate in kilohertz: `"44.1 kHz"` short, `"44.100 kHz"`
/// long.
pub fn formatted_sample_rate(sample_rate: f64, short: bool) -> String {
    if short {
        format!("{:.1} kHz", sample_rate * 0.001)
    } else {
        format!("{:.3} kHz", sample_rate * 0.001)
    }
}

/// Formats a decibel volume: `"-12.0dB"`.
pub fn formatted_volume_in_decibels(volume: f32) -> String {
    format!("{volume:.1}dB")
}

/// Summarizes channel counts: `"2 in/ 2 out"`.
pub fn channel_count_summary(inputs: u32, outputs: u32) -> String {
    format!("{inputs} in/ {outputs} out")
}

/// Summarizes total latency per direction in milliseconds, from frame counts
/// and the nominal sample rate. Directions with zero total latency are
/// omitted; an unusable sample rate yields an empty string.
pub fn latency_summary(
    input_frames: u32,
    input_safety_frames: u32,
    output_frames: u32,
    output_safety_frames: u32,
    sample_rate: f64,
) -> String {
    if sample_rate <= 0.0 {
        return String::new();
    }

    let total_in = input_frames + input_safety_frames;
    let total_out = output_frames + output_safety_frames;
    let mut summary = String::new();

    if total_in > 0 {
        summary.push_str(&format!(
            "{:.1}ms in",
            f64::from(total_in) / sample_rate * 1000.0
        ));
    }
    if total_out > 0 {
        if !summary.is_empty() {
            summary.push_str("/ ");
        }
        summary.push_str(&format!(
            "{:.1}ms out",
            f64::from(total_out) / sample_rate * 1000.0
        ));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_formats() {
        assert_eq!(formatted_sample_rate(44_100.0, true), "44.1 kHz");
        assert_eq!(formatted_sample_rate(44_100.0, false), "44.100 kHz");
        assert_eq!(formatted_sample_rate(96_000.0, true), "96.0 kHz");
    }

    #[test]
    fn volume_formats() {
        assert_eq!(formatted_volume_in_decibels(-12.0), "-12.0dB");
        assert_eq!(formatted_volume_in_decibels(0.0), "0.0dB");
    }

    #[test]
    fn channel_summary_formats() {
        assert_eq!(channel_count_summary(2, 2), "2 in/ 2 out");
        assert_eq!(channel_count_summary(0, 8), "0 in/ 8 out");
    }

    #[test]
    fn latency_summary_formats_both_directions() {
        // 441 + 0 input frames and 882 + 441 output frames at 44.1 kHz.
        let summary = latency_summary(441, 0, 882, 441, 44_100.0);
        assert_eq!(summary, "10.0ms in/ 30.0ms out");
    }

    #[test]
    fn latency_summary_omits_idle_directions() {
        assert_eq!(latency_summary(0, 0, 441, 0, 44_100.0), "10.0ms out");
        assert_eq!(latency_summary(0, 0, 0, 0, 44_100.0), "");
        assert_eq!(latency_summary(441, 0, 441, 0, 0.0), "");
    }
}

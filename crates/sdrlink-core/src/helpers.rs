//! Formatting helpers for status text and UI labels.

/// Format a frequency in hertz as a MHz string with six decimal places.
///
/// ```
/// use sdrlink_core::format_freq_mhz;
///
/// assert_eq!(format_freq_mhz(14_074_000.0), "14.074000 MHz");
/// assert_eq!(format_freq_mhz(435_000_000.4), "435.000000 MHz");
/// ```
pub fn format_freq_mhz(freq_hz: f64) -> String {
    let mhz = freq_hz / 1_000_000.0;
    format!("{mhz:.6} MHz")
}

/// Label a sample rate in whole ksps, as shown in rate selectors.
///
/// ```
/// use sdrlink_core::rate_label_ksps;
///
/// assert_eq!(rate_label_ksps(48_000.0), "48");
/// assert_eq!(rate_label_ksps(1_536_000.0), "1536");
/// ```
pub fn rate_label_ksps(rate_hz: f64) -> String {
    format!("{:.0}", rate_hz / 1e3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_freq_mhz_hf() {
        assert_eq!(format_freq_mhz(7_000_000.0), "7.000000 MHz");
    }

    #[test]
    fn format_freq_mhz_negative_offset() {
        assert_eq!(format_freq_mhz(-3_000_000.0), "-3.000000 MHz");
    }

    #[test]
    fn rate_labels_round() {
        // 122.88 MHz / 320
        assert_eq!(rate_label_ksps(384_000.0), "384");
        assert_eq!(rate_label_ksps(95_999.6), "96");
    }
}

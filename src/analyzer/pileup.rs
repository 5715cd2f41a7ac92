//! Embedded-peak counting for pile-up detection
//!
//! A sliding window of `front + tail` samples scans each waveform; a peak is
//! counted where the sample at `front` clears both window edges by more than
//! the threshold. LED-tagged pulses use their own window parameters so the
//! broad LED shape still registers as exactly one peak.

use crate::decoder::PulseMatrix;

/// Peak-window parameters
#[derive(Debug, Clone)]
pub struct PileUpParams {
    pub front: usize,
    pub tail: usize,
    pub led_front: usize,
    pub led_tail: usize,
    pub threshold: i32,
}

/// Count embedded peaks in one waveform
pub fn count_peaks(samples: &[f32], front: usize, tail: usize, threshold: f32) -> u32 {
    let width = front + tail;
    let len = samples.len();
    if len <= width {
        return 0;
    }

    let mut peaks = 0u32;
    let mut t = 0usize;
    while t < len - width {
        let a = samples[t + front] - threshold;
        if a > samples[t] && a > samples[t + width] {
            peaks += 1;
            t += width; // skip the rest of this peak's window
        }
        t += 1;
    }
    peaks
}

/// Count peaks for every pulse, selecting LED or standard window parameters
/// per pulse
pub fn detect(
    pulses: &PulseMatrix,
    winlen: &[usize],
    tof_window_length: usize,
    led: &[bool],
    params: &PileUpParams,
) -> Vec<u32> {
    (0..pulses.rows())
        .map(|i| {
            let len = winlen[i].min(tof_window_length).min(pulses.width());
            let (front, tail) = if led[i] {
                (params.led_front, params.led_tail)
            } else {
                (params.front, params.tail)
            };
            count_peaks(&pulses.row(i)[..len], front, tail, params.threshold as f32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Zero waveform with unit-width spikes at the given positions
    fn spikes(len: usize, positions: &[usize], height: f32) -> Vec<f32> {
        let mut wave = vec![0.0; len];
        for &p in positions {
            wave[p] = height;
        }
        wave
    }

    #[test]
    fn test_single_peak() {
        let wave = spikes(16, &[5], 100.0);
        assert_eq!(count_peaks(&wave, 1, 1, 50.0), 1);
    }

    #[test]
    fn test_two_peaks_outside_window() {
        // Separation = width + 2
        let wave = spikes(16, &[4, 8], 100.0);
        assert_eq!(count_peaks(&wave, 1, 1, 50.0), 2);
    }

    #[test]
    fn test_three_peaks() {
        let wave = spikes(20, &[4, 8, 12], 100.0);
        assert_eq!(count_peaks(&wave, 1, 1, 50.0), 3);
    }

    #[test]
    fn test_threshold_suppresses_peaks() {
        let wave = spikes(16, &[4, 8], 100.0);
        assert_eq!(count_peaks(&wave, 1, 1, 150.0), 0);
    }

    #[test]
    fn test_threshold_monotonicity() {
        let wave = spikes(32, &[4, 9, 14, 20], 100.0);
        let mut last = u32::MAX;
        for thr in [10.0, 50.0, 90.0, 110.0] {
            let n = count_peaks(&wave, 1, 2, thr);
            assert!(n <= last, "raising the threshold increased the count");
            last = n;
        }
    }

    #[test]
    fn test_short_window_has_no_peaks() {
        let wave = spikes(4, &[2], 100.0);
        assert_eq!(count_peaks(&wave, 2, 2, 10.0), 0);
    }

    #[test]
    fn test_plateau_wider_than_window_not_counted() {
        // The centre sample never clears a plateau edge of equal height
        let wave = vec![0.0, 100.0, 100.0, 100.0, 0.0, 0.0];
        assert_eq!(count_peaks(&wave, 1, 1, 50.0), 0);
    }

    #[test]
    fn test_detect_uses_led_parameters() {
        // Both windows see the broad bump as a single peak; the LED window
        // must be selected for the LED-tagged row
        let wave = [0.0, 0.0, 60.0, 120.0, 180.0, 120.0, 60.0, 0.0, 0.0, 0.0];
        let mut m = PulseMatrix::new(2, wave.len());
        m.row_mut(0).copy_from_slice(&wave);
        m.row_mut(1).copy_from_slice(&wave);

        let params = PileUpParams {
            front: 1,
            tail: 1,
            led_front: 3,
            led_tail: 3,
            threshold: 50,
        };
        let winlen = vec![wave.len(); 2];
        let peaks = detect(&m, &winlen, wave.len(), &[false, true], &params);
        assert!(peaks[0] >= 1);
        assert_eq!(peaks[1], 1);
    }
}

//! Per-pulse feature extraction
//!
//! For every decoded pulse: baseline estimate and subtraction, saturation
//! flag, pulse maximum, dynamic total-integration endpoint and the three
//! trapezoidal charge integrals (short gate, long gate, total).

use crate::decoder::PulseMatrix;

/// Feature-extraction parameters
#[derive(Debug, Clone)]
pub struct FeatureParams {
    pub baseline_start: usize,
    pub baseline_end: usize,
    pub tof_window_length: usize,
    pub short_gate: usize,
    pub long_gate: usize,
    pub max_difference: f32,
    pub saturation_high: i32,
    pub saturation_low: i32,
    pub subtract_baseline: bool,
}

/// Saturation flag, encoded 0 / 1 / 2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saturation {
    None,
    High,
    Low,
}

impl Saturation {
    pub fn code(self) -> u8 {
        match self {
            Saturation::None => 0,
            Saturation::High => 1,
            Saturation::Low => 2,
        }
    }

    pub fn is_saturated(self) -> bool {
        self != Saturation::None
    }
}

/// Extracted features, one entry per pulse
#[derive(Debug, Clone)]
pub struct PulseFeatures {
    pub baseline: Vec<f32>,
    pub maxpos: Vec<usize>,
    pub pulse_max: Vec<f32>,
    pub short_int: Vec<f32>,
    pub long_int: Vec<f32>,
    pub total_int: Vec<f32>,
    pub sat: Vec<Saturation>,
}

impl PulseFeatures {
    pub fn n_pulses(&self) -> usize {
        self.total_int.len()
    }
}

/// Trapezoidal sum over the half-open range `[lo, hi)` with half-weighted
/// endpoints
pub fn trapz(a: &[f32], lo: usize, hi: usize) -> f32 {
    if hi <= lo {
        return 0.0;
    }
    if hi == lo + 1 {
        return a[lo];
    }
    let mut acc = 0.5 * (a[lo] as f64 + a[hi - 1] as f64);
    for &v in &a[lo + 1..hi - 1] {
        acc += v as f64;
    }
    acc as f32
}

/// Run feature extraction over every pulse.
///
/// Baseline subtraction mutates the matrix rows in place so all later
/// stages see baseline-corrected samples.
pub fn extract(pulses: &mut PulseMatrix, winlen: &[usize], params: &FeatureParams) -> PulseFeatures {
    let n = pulses.rows();
    let mut out = PulseFeatures {
        baseline: Vec::with_capacity(n),
        maxpos: Vec::with_capacity(n),
        pulse_max: Vec::with_capacity(n),
        short_int: Vec::with_capacity(n),
        long_int: Vec::with_capacity(n),
        total_int: Vec::with_capacity(n),
        sat: Vec::with_capacity(n),
    };

    for i in 0..n {
        let len = winlen[i]
            .min(params.tof_window_length)
            .min(pulses.width());
        let row = pulses.row_mut(i);

        let baseline = if params.subtract_baseline {
            let b = baseline_of(row, len, params.baseline_start, params.baseline_end);
            for v in row[..len].iter_mut() {
                *v -= b;
            }
            b
        } else {
            0.0
        };

        let (maxpos, pulse_max) = arg_max(&row[..len]);
        let sat = saturation_of(&row[..len], params.saturation_high, params.saturation_low);

        let max_sg = (maxpos + params.short_gate).min(len);
        let max_lg = (maxpos + params.long_gate).min(len);
        let newlen = integration_end(
            &row[..len],
            maxpos,
            max_lg,
            params.baseline_start,
            params.max_difference,
        );

        out.baseline.push(baseline);
        out.maxpos.push(maxpos);
        out.pulse_max.push(pulse_max);
        out.short_int.push(trapz(row, maxpos, max_sg));
        out.long_int.push(trapz(row, maxpos, max_lg));
        out.total_int.push(trapz(row, 0, newlen));
        out.sat.push(sat);
    }
    out
}

// ---------------------------------------------------------------------------
// Free functions (pure, easy to test)
// ---------------------------------------------------------------------------

/// Average over the head window and the part of the tail window not already
/// covered by it (set union of the two index ranges)
fn baseline_of(row: &[f32], len: usize, baseline_start: usize, baseline_end: usize) -> f32 {
    let head = baseline_start.min(len);
    let tail_from = len.saturating_sub(baseline_end);

    let mut sum = 0.0f64;
    let mut count = 0usize;
    for &v in &row[..head] {
        sum += v as f64;
        count += 1;
    }
    for j in tail_from..len {
        if j >= head {
            sum += row[j] as f64;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

/// Index and value of the first maximum
fn arg_max(samples: &[f32]) -> (usize, f32) {
    let mut pos = 0usize;
    let mut max = f32::NEG_INFINITY;
    for (k, &v) in samples.iter().enumerate() {
        if v > max {
            max = v;
            pos = k;
        }
    }
    if samples.is_empty() {
        (0, 0.0)
    } else {
        (pos, max)
    }
}

/// High saturation assigned first, low overwrites when both limits are hit
fn saturation_of(samples: &[f32], high: i32, low: i32) -> Saturation {
    let mut sat = Saturation::None;
    if samples.iter().any(|&v| v > high as f32) {
        sat = Saturation::High;
    }
    if samples.iter().any(|&v| v < low as f32) {
        sat = Saturation::Low;
    }
    sat
}

/// Dynamic endpoint of the total integral.
///
/// Walks a sliding baseline window from the pulse maximum towards the tail
/// and stops where the local average returns to within `max_difference` of
/// the head average.
fn integration_end(
    samples: &[f32],
    maxpos: usize,
    max_lg: usize,
    baseline_start: usize,
    max_difference: f32,
) -> usize {
    let len = samples.len();
    let bs = baseline_start.min(len);
    let bh = bs / 2;
    let pbs = len.saturating_sub(bs);

    if pbs >= maxpos {
        return len.saturating_sub(bh);
    }

    let aver1 = mean(&samples[..bs]);
    let mut newlen = 0usize;
    for j in maxpos..pbs {
        let aver2 = mean(&samples[j..j + bs]);
        if (aver2 - aver1).abs() < max_difference {
            newlen = (j + bh).max(max_lg);
            break;
        }
        if j == pbs - 1 {
            newlen = len - bh;
        }
    }
    newlen
}

fn mean(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&v| v as f64).sum::<f64>() / samples.len() as f64) as f32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

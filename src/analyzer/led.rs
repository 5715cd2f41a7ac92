//! Time-sliced LED gain tracking
//!
//! LED reference pulses arrive at a fixed rate; their mean integral per
//! time slot measures the photomultiplier gain. A single forward pass over
//! the time-ordered pulses accumulates LED statistics per slot and, at each
//! slot transition, rescales the total integrals collected since the last
//! transition with the freshly derived coefficient.
//!
//! The pass is inherently serial: the in-place rescaling of
//! `total_int[mark..i)` is an essential side effect and must happen in
//! pulse order. Faithfully retained quirks: the per-slot gain is written at
//! the NEW slot index (a +1-slot lag), and pulses after the last slot
//! transition are never rescaled.

use tracing::debug;

/// Gain-tracking parameters
#[derive(Debug, Clone)]
pub struct LedParams {
    /// Slot width [s]
    pub dt: f64,
    /// Target gain in PH bin units
    pub reference: f32,
    /// Bin-unit scale factor (PH channels / Marker)
    pub dx: f32,
}

/// Run the gain-correction fold.
///
/// `total_int` is rescaled in place; the returned vector is the per-slot PM
/// gain trace of length `floor((t_last - t_first) / dt)`. Slots that close
/// without LED statistics leave their gain entry at zero.
pub fn correct(t_events: &[f64], led: &[bool], total_int: &mut [f32], params: &LedParams) -> Vec<f32> {
    let n = t_events.len();
    if n == 0 {
        return Vec::new();
    }
    let t0 = t_events[0];
    let n_led = ((t_events[n - 1] - t0) / params.dt) as usize;
    let mut pmgain = vec![0.0f32; n_led];

    let mut mark = 0usize;
    let mut sum = 0.0f64;
    let mut count = 0usize;
    let mut coeff = 0.0f32;
    let mut slot_prev = 0usize;

    for i in 0..n {
        let slot = ((t_events[i] - t0) / params.dt) as usize;
        if slot > slot_prev {
            if count > 0 {
                let gain = params.dx * (sum / count as f64) as f32;
                if slot < pmgain.len() {
                    pmgain[slot] = gain;
                }
                if sum > 0.0 {
                    coeff = params.reference / gain;
                }
            }
            for v in total_int[mark..i].iter_mut() {
                *v *= coeff;
            }
            mark = i;
            sum = 0.0;
            count = 0;
            coeff = 0.0;
        }
        if led[i] {
            sum += total_int[i] as f64;
            count += 1;
        }
        slot_prev = slot;
    }

    debug!(n_slots = n_led, "LED gain correction finished");
    pmgain
}

/// Centres of the LED gain slots
pub fn slot_centres(t_first: f64, dt: f64, n_led: usize) -> Vec<f64> {
    (0..n_led).map(|k| t_first + dt * (0.5 + k as f64)).collect()
}

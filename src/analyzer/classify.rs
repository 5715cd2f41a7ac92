//! Neutron/gamma classification in the PH/PS plane
//!
//! The initial pass derives normalized pulse-height and pulse-shape
//! coordinates and tags LED reference pulses. The final pass (after pile-up
//! detection and gain correction) assigns one class per event with the
//! precedence saturated > LED > pile-up > physics, which keeps the class
//! counts pairwise disjoint.

use serde::Serialize;

use super::features::{PulseFeatures, Saturation};

/// Separation parameters of the piecewise-linear neutron/gamma separator
#[derive(Debug, Clone)]
pub struct ClassifyParams {
    pub ph_channels: usize,
    pub ps_channels: usize,
    pub marker: u32,
    pub line_change: i32,
    pub slope1: f32,
    pub slope2: f32,
    pub offset: f32,
    pub dd_lower: i32,
    pub dd_upper: i32,
    pub dt_lower: i32,
    pub dt_upper: i32,
}

impl ClassifyParams {
    /// Bin-unit scale factor applied to total integrals
    pub fn dx(&self) -> f32 {
        self.ph_channels as f32 / self.marker as f32
    }

    /// Pulse-shape threshold of the separator at the given pulse height
    pub fn separator(&self, ph: f32) -> f32 {
        let lc = self.line_change as f32;
        if ph <= lc {
            self.offset + self.slope1 * ph
        } else {
            self.offset + self.slope1 * lc + self.slope2 * (ph - lc)
        }
    }
}

/// LED acceptance rectangle in the PH/PS plane (strict bounds)
#[derive(Debug, Clone)]
pub struct LedWindow {
    pub xmin: i32,
    pub xmax: i32,
    pub ymin: i32,
    pub ymax: i32,
}

impl LedWindow {
    pub fn contains(&self, ph: f32, ps: f32) -> bool {
        ph > self.xmin as f32
            && ph < self.xmax as f32
            && ps > self.ymin as f32
            && ps < self.ymax as f32
    }
}

/// Final event class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    Neutron,
    Gamma,
    PileUp,
    Led,
    Saturated,
}

impl EventClass {
    /// Numeric event-type code: neutron=0, gamma=1, pileup=2, led=3, other=-1
    pub fn type_code(self) -> i8 {
        match self {
            EventClass::Neutron => 0,
            EventClass::Gamma => 1,
            EventClass::PileUp => 2,
            EventClass::Led => 3,
            EventClass::Saturated => -1,
        }
    }

    /// Physics events enter the neutron/gamma spectra
    pub fn is_physics(self) -> bool {
        matches!(self, EventClass::Neutron | EventClass::Gamma)
    }
}

/// Per-event classification result
#[derive(Debug, Clone)]
pub struct EventTable {
    pub class: Vec<EventClass>,
    /// Neutron inside the DD energy window
    pub dd: Vec<bool>,
    /// Neutron inside the DT energy window
    pub dt: Vec<bool>,
}

impl EventTable {
    pub fn type_codes(&self) -> Vec<i8> {
        self.class.iter().map(|c| c.type_code()).collect()
    }

    pub fn count(&self, class: EventClass) -> usize {
        self.class.iter().filter(|&&c| c == class).count()
    }
}

/// Initial pass: PH/PS coordinates from the integrals.
///
/// `PS` falls back to 0 when the long-gate integral is not positive.
pub fn pulse_coords(features: &PulseFeatures, dx: f32, ps_channels: usize) -> (Vec<f32>, Vec<f32>) {
    let ny = ps_channels as f32;
    let ph = features.total_int.iter().map(|&t| dx * t).collect();
    let ps = features
        .short_int
        .iter()
        .zip(&features.long_int)
        .map(|(&s, &l)| if l > 0.0 { ny * s / l } else { 0.0 })
        .collect();
    (ph, ps)
}

/// Tag pulses landing inside the LED acceptance window
pub fn led_flags(ph: &[f32], ps: &[f32], window: &LedWindow) -> Vec<bool> {
    ph.iter()
        .zip(ps)
        .map(|(&x, &y)| window.contains(x, y))
        .collect()
}

/// Final pass over all pulses.
///
/// `ph` must be the gain-corrected pulse height; `ps` keeps its initial
/// value (the short/long ratio is gain-invariant).
pub fn classify(
    ph: &[f32],
    ps: &[f32],
    sat: &[Saturation],
    peaks: &[u32],
    led: &[bool],
    params: &ClassifyParams,
) -> EventTable {
    let n = ph.len();
    let mut class = Vec::with_capacity(n);
    let mut dd = Vec::with_capacity(n);
    let mut dt = Vec::with_capacity(n);

    for i in 0..n {
        let c = if sat[i].is_saturated() {
            EventClass::Saturated
        } else if led[i] {
            EventClass::Led
        } else if peaks[i] > 1 {
            EventClass::PileUp
        } else if ps[i] <= params.separator(ph[i]) {
            EventClass::Neutron
        } else {
            EventClass::Gamma
        };

        let neutron = c == EventClass::Neutron;
        dd.push(neutron && ph[i] >= params.dd_lower as f32 && ph[i] <= params.dd_upper as f32);
        dt.push(neutron && ph[i] >= params.dt_lower as f32 && ph[i] <= params.dt_upper as f32);
        class.push(c);
    }

    EventTable { class, dd, dt }
}

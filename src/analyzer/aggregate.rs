//! Event aggregation: time selection, count rates and spectra
//!
//! Bins the classified events into per-class time-rate histograms and
//! pulse-height spectra, derives the pile-up-corrected rates and fills the
//! 2-D PSD map. Binning is inclusive-left, exclusive-right throughout.

use serde::Serialize;

use super::classify::{EventClass, EventTable};

// ---------------------------------------------------------------------------
// Histograms
// ---------------------------------------------------------------------------

/// Uniform 1-D histogram
#[derive(Debug, Clone)]
pub struct Histogram1d {
    lo: f64,
    bin_width: f64,
    counts: Vec<u64>,
    overflow: u64,
    underflow: u64,
}

impl Histogram1d {
    pub fn new(num_bins: usize, lo: f64, hi: f64) -> Self {
        let bin_width = if num_bins > 0 {
            (hi - lo) / num_bins as f64
        } else {
            1.0
        };
        Self {
            lo,
            bin_width,
            counts: vec![0; num_bins],
            overflow: 0,
            underflow: 0,
        }
    }

    pub fn fill(&mut self, value: f64) {
        if value < self.lo {
            self.underflow += 1;
            return;
        }
        let bin = ((value - self.lo) / self.bin_width) as usize;
        if bin < self.counts.len() {
            self.counts[bin] += 1;
        } else {
            self.overflow += 1;
        }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Counts divided by a common normalization, e.g. bin width or duration
    pub fn rates(&self, divisor: f64) -> Vec<f32> {
        self.counts
            .iter()
            .map(|&c| (c as f64 / divisor) as f32)
            .collect()
    }
}

/// Uniform 2-D histogram, row-major `nx * ny` counts
#[derive(Debug, Clone, Serialize)]
pub struct PsdMap {
    pub nx: usize,
    pub ny: usize,
    pub counts: Vec<u64>,
}

impl PsdMap {
    pub fn new(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            counts: vec![0; nx * ny],
        }
    }

    /// Fill over the ranges `[-0.5, nx+0.5] x [-0.5, ny+0.5]`
    pub fn fill(&mut self, ph: f32, ps: f32) {
        let wx = (self.nx as f64 + 1.0) / self.nx as f64;
        let wy = (self.ny as f64 + 1.0) / self.ny as f64;
        let x = (ph as f64 + 0.5) / wx;
        let y = (ps as f64 + 0.5) / wy;
        if x < 0.0 || y < 0.0 {
            return;
        }
        let (ix, iy) = (x as usize, y as usize);
        if ix < self.nx && iy < self.ny {
            self.counts[ix * self.ny + iy] += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

// ---------------------------------------------------------------------------
// Time selection
// ---------------------------------------------------------------------------

/// Which events enter the aggregation
#[derive(Debug, Clone)]
pub enum TimeSelection {
    /// Single interval; `t_end <= 0` means "until the last event"
    Interval { t_beg: f64, t_end: f64 },
    /// Union of disjoint intervals (caller contract: non-overlapping)
    Ranges(Vec<(f64, f64)>),
}

impl TimeSelection {
    /// Selected event indices and the total selected duration in seconds.
    /// Both interval ends are inclusive.
    pub fn select(&self, t_events: &[f64]) -> (Vec<usize>, f64) {
        match self {
            TimeSelection::Interval { t_beg, t_end } => {
                let end = if *t_end <= 0.0 {
                    t_events.last().copied().unwrap_or(*t_end)
                } else {
                    *t_end
                };
                let idx = (0..t_events.len())
                    .filter(|&i| t_events[i] >= *t_beg && t_events[i] <= end)
                    .collect();
                (idx, end - t_beg)
            }
            TimeSelection::Ranges(ranges) => {
                let mut idx = Vec::new();
                let mut dt = 0.0;
                for &(lo, hi) in ranges {
                    idx.extend(
                        (0..t_events.len()).filter(|&i| t_events[i] >= lo && t_events[i] <= hi),
                    );
                    dt += hi - lo;
                }
                (idx, dt)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-class aggregates
// ---------------------------------------------------------------------------

/// Count rates per class over the time bins [1/s]
#[derive(Debug, Clone, Default, Serialize)]
pub struct CountRates {
    pub neut1: Vec<f32>,
    pub neut2: Vec<f32>,
    pub gamma1: Vec<f32>,
    pub gamma2: Vec<f32>,
    pub led: Vec<f32>,
    pub pileup: Vec<f32>,
    pub sat: Vec<f32>,
    pub phys: Vec<f32>,
    pub dd: Vec<f32>,
    pub dt: Vec<f32>,
}

/// Pulse-height spectra per class, normalized by the selected duration
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhSpectra {
    pub neut1: Vec<f32>,
    pub gamma1: Vec<f32>,
    pub led: Vec<f32>,
    pub pileup: Vec<f32>,
    pub sat: Vec<f32>,
    pub phys: Vec<f32>,
    pub dd: Vec<f32>,
    pub dt: Vec<f32>,
}

/// Aggregated result set
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregates {
    /// Time-bin centres [s]
    pub time_cnt: Vec<f64>,
    pub cnt: CountRates,
    pub phs: PhSpectra,
    pub psd_map: PsdMap,
    /// Distribution of retained window lengths
    pub winlen_hist: Vec<u64>,
}

impl Default for PsdMap {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Histogram the classified events.
///
/// `duration` is the selected time span used to normalize the spectra.
/// With no events everything comes back zero-length.
pub fn aggregate(
    t_events: &[f64],
    ph: &[f32],
    ps: &[f32],
    winlen: &[usize],
    table: &EventTable,
    time_bin: f64,
    nx: usize,
    ny: usize,
    duration: f64,
) -> Aggregates {
    if t_events.is_empty() {
        return Aggregates::default();
    }

    let t_first = t_events[0];
    let t_last = t_events[t_events.len() - 1];
    let n_bins = ((t_last - t_first) / time_bin) as usize;
    let time_cnt: Vec<f64> = (0..n_bins)
        .map(|k| t_first + time_bin * (0.5 + k as f64))
        .collect();

    let t_hi = t_first + n_bins as f64 * time_bin;
    let mut time_hists: Vec<Histogram1d> = (0..8)
        .map(|_| Histogram1d::new(n_bins, t_first, t_hi))
        .collect();
    let mut ph_hists: Vec<Histogram1d> = (0..8)
        .map(|_| Histogram1d::new(nx, -0.5, nx as f64 + 0.5))
        .collect();
    let mut psd_map = PsdMap::new(nx, ny);

    // Spec order: neut1, gamma1, led, pileup, sat, phys, dd, dt
    for i in 0..t_events.len() {
        let class = table.class[i];
        let mut fill = |spec: usize| {
            time_hists[spec].fill(t_events[i]);
            ph_hists[spec].fill(ph[i] as f64);
        };
        match class {
            EventClass::Neutron => fill(0),
            EventClass::Gamma => fill(1),
            EventClass::Led => fill(2),
            EventClass::PileUp => fill(3),
            EventClass::Saturated => fill(4),
        }
        if class.is_physics() {
            fill(5);
        }
        if table.dd[i] {
            fill(6);
        }
        if table.dt[i] {
            fill(7);
        }
        psd_map.fill(ph[i], ps[i]);
    }

    let cnt_of = |spec: usize| time_hists[spec].rates(time_bin);
    let phs_of = |spec: usize| ph_hists[spec].rates(duration.max(f64::MIN_POSITIVE));

    let neut1 = cnt_of(0);
    let gamma1 = cnt_of(1);
    let led = cnt_of(2);
    let pileup = cnt_of(3);

    // Pile-up upscaling: assume every pile-up event hides two physics events
    let mut neut2 = Vec::with_capacity(n_bins);
    let mut gamma2 = Vec::with_capacity(n_bins);
    for k in 0..n_bins {
        let total = neut1[k] + gamma1[k] + led[k];
        let frac = if total > 0.0 {
            1.0 + 2.0 * pileup[k] / total
        } else {
            1.0
        };
        neut2.push(frac * neut1[k]);
        gamma2.push(frac * gamma1[k]);
    }

    Aggregates {
        time_cnt,
        cnt: CountRates {
            neut1,
            neut2,
            gamma1,
            gamma2,
            led,
            pileup,
            sat: cnt_of(4),
            phys: cnt_of(5),
            dd: cnt_of(6),
            dt: cnt_of(7),
        },
        phs: PhSpectra {
            neut1: phs_of(0),
            gamma1: phs_of(1),
            led: phs_of(2),
            pileup: phs_of(3),
            sat: phs_of(4),
            phys: phs_of(5),
            dd: phs_of(6),
            dt: phs_of(7),
        },
        psd_map,
        winlen_hist: bincount(winlen),
    }
}

/// Occurrence count per value, like numpy's bincount
pub fn bincount(values: &[usize]) -> Vec<u64> {
    let max = values.iter().copied().max().unwrap_or(0);
    let mut counts = vec![0u64; max + 1];
    for &v in values {
        counts[v] += 1;
    }
    counts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::classify::EventClass;

    fn table_of(classes: Vec<EventClass>) -> EventTable {
        let n = classes.len();
        EventTable {
            class: classes,
            dd: vec![false; n],
            dt: vec![false; n],
        }
    }

    #[test]
    fn test_histogram_fill() {
        let mut h = Histogram1d::new(4, 0.0, 4.0);
        h.fill(0.5);
        h.fill(1.0); // left edge of bin 1
        h.fill(3.999);
        h.fill(4.0); // right edge is exclusive
        h.fill(-0.1);
        assert_eq!(h.counts(), &[1, 1, 0, 1]);
        assert_eq!(h.overflow, 1);
        assert_eq!(h.underflow, 1);
    }

    #[test]
    fn test_histogram_rates() {
        let mut h = Histogram1d::new(2, 0.0, 2.0);
        h.fill(0.5);
        h.fill(0.6);
        h.fill(1.5);
        assert_eq!(h.rates(0.5), vec![4.0, 2.0]);
    }

    #[test]
    fn test_interval_selection() {
        let t = vec![0.5, 1.0, 1.5, 2.0, 2.5];
        let sel = TimeSelection::Interval {
            t_beg: 1.0,
            t_end: 2.0,
        };
        let (idx, dt) = sel.select(&t);
        assert_eq!(idx, vec![1, 2, 3]); // inclusive ends
        assert_eq!(dt, 1.0);
    }

    #[test]
    fn test_interval_open_end() {
        let t = vec![0.5, 1.0, 7.25];
        let sel = TimeSelection::Interval {
            t_beg: 0.0,
            t_end: -1.0,
        };
        let (idx, dt) = sel.select(&t);
        assert_eq!(idx, vec![0, 1, 2]);
        assert_eq!(dt, 7.25);
    }

    #[test]
    fn test_disjoint_ranges_selection() {
        let t: Vec<f64> = (0..50).map(|k| 0.1 * k as f64).collect();
        let sel = TimeSelection::Ranges(vec![(1.0, 2.0), (3.0, 3.5)]);
        let (idx, dt) = sel.select(&t);
        assert!((dt - 1.5).abs() < 1e-12);
        for &i in &idx {
            let v = t[i];
            assert!((1.0..=2.0).contains(&v) || (3.0..=3.5).contains(&v));
        }
        // 1.0..=2.0 holds 11 samples, 3.0..=3.5 holds 6
        assert_eq!(idx.len(), 17);
    }

    #[test]
    fn test_empty_selection() {
        let t = vec![0.5, 1.0];
        let sel = TimeSelection::Interval {
            t_beg: 5.0,
            t_end: 6.0,
        };
        let (idx, _) = sel.select(&t);
        assert!(idx.is_empty());
    }

    #[test]
    fn test_aggregate_rates() {
        // 4 events over 2 s, 1 s bins: one neutron and one gamma per bin
        let t = vec![0.2, 0.4, 1.2, 1.4, 2.1];
        let ph = vec![10.0, 20.0, 10.0, 20.0, 30.0];
        let ps = vec![5.0; 5];
        let winlen = vec![8; 5];
        let table = table_of(vec![
            EventClass::Neutron,
            EventClass::Gamma,
            EventClass::Neutron,
            EventClass::Gamma,
            EventClass::Neutron,
        ]);

        let agg = aggregate(&t, &ph, &ps, &winlen, &table, 1.0, 64, 32, 2.0);
        // (2.1 - 0.2) / 1.0 -> 1 full bin
        assert_eq!(agg.time_cnt.len(), 1);
        assert_eq!(agg.cnt.neut1, vec![1.0]);
        assert_eq!(agg.cnt.gamma1, vec![1.0]);
        assert_eq!(agg.cnt.phys, vec![2.0]);
        assert_eq!(agg.cnt.pileup, vec![0.0]);
        // No pile-up: upscaled rates equal the raw ones
        assert_eq!(agg.cnt.neut2, agg.cnt.neut1);
    }

    #[test]
    fn test_aggregate_pileup_upscaling() {
        let t = vec![0.1, 0.2, 0.3, 0.4, 1.5];
        let ph = vec![10.0; 5];
        let ps = vec![5.0; 5];
        let winlen = vec![8; 5];
        let table = table_of(vec![
            EventClass::Neutron,
            EventClass::Neutron,
            EventClass::Gamma,
            EventClass::PileUp,
            EventClass::Neutron,
        ]);

        let agg = aggregate(&t, &ph, &ps, &winlen, &table, 1.0, 64, 32, 1.4);
        // Bin 0: neut1 = 2, gamma1 = 1, pileup = 1 -> frac = 1 + 2/3
        let frac = 1.0 + 2.0 / 3.0;
        assert!((agg.cnt.neut2[0] - frac * 2.0).abs() < 1e-5);
        assert!((agg.cnt.gamma2[0] - frac * 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_aggregate_spectra_normalized_by_duration() {
        let t = vec![0.0, 0.5, 1.1];
        let ph = vec![10.2, 10.4, 20.0];
        let ps = vec![5.0; 3];
        let winlen = vec![8; 3];
        let table = table_of(vec![EventClass::Neutron; 3]);

        let agg = aggregate(&t, &ph, &ps, &winlen, &table, 1.0, 64, 32, 2.0);
        // PH bins are (nx+1)/nx wide starting at -0.5; 10.2 and 10.4 share
        // a bin, normalized by dt = 2 s
        let total: f32 = agg.phs.neut1.iter().sum();
        assert!((total - 1.5).abs() < 1e-6);
        assert!(agg.phs.neut1.iter().any(|&v| v == 1.0));
    }

    #[test]
    fn test_aggregate_empty() {
        let table = table_of(vec![]);
        let agg = aggregate(&[], &[], &[], &[], &table, 1.0, 64, 32, 1.0);
        assert!(agg.time_cnt.is_empty());
        assert!(agg.cnt.neut1.is_empty());
        assert!(agg.phs.neut1.is_empty());
        assert!(agg.winlen_hist.is_empty());
    }

    #[test]
    fn test_class_rates_partition_total() {
        // phys + led + pileup + sat accounts for every event
        let t: Vec<f64> = (0..40).map(|k| 0.05 * k as f64).collect();
        let ph = vec![10.0; 40];
        let ps = vec![5.0; 40];
        let winlen = vec![8; 40];
        let classes: Vec<EventClass> = (0..40)
            .map(|k| match k % 4 {
                0 => EventClass::Neutron,
                1 => EventClass::Gamma,
                2 => EventClass::Led,
                _ => EventClass::Saturated,
            })
            .collect();
        let table = table_of(classes);

        let agg = aggregate(&t, &ph, &ps, &winlen, &table, 0.5, 64, 32, 2.0);
        for k in 0..agg.time_cnt.len() {
            let sum = agg.cnt.phys[k] + agg.cnt.led[k] + agg.cnt.pileup[k] + agg.cnt.sat[k];
            let all = agg.cnt.neut1[k] + agg.cnt.gamma1[k] + agg.cnt.led[k] + agg.cnt.sat[k];
            assert_eq!(sum, all);
        }
    }

    #[test]
    fn test_psd_map_fill() {
        let mut map = PsdMap::new(8, 4);
        map.fill(0.0, 0.0);
        map.fill(7.9, 3.9);
        map.fill(-2.0, 0.0); // below range
        map.fill(100.0, 0.0); // beyond range
        assert_eq!(map.total(), 2);
    }

    #[test]
    fn test_bincount() {
        assert_eq!(bincount(&[2, 4, 4, 2, 2]), vec![0, 0, 3, 0, 2]);
        assert!(bincount(&[]).len() == 1);
    }
}

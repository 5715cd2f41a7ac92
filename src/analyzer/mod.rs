//! The pulse-processing pipeline
//!
//! One [`Analyzer::run`] call processes one acquisition file to completion:
//! decode -> time selection -> feature extraction -> initial PSD pass ->
//! pile-up detection -> LED gain correction -> final classification ->
//! aggregation. The pipeline is a single-threaded batch; the LED correction
//! stage in particular must see pulses in time order.

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::common::AnalysisResult;
use crate::config::Config;
use crate::decoder::{self, DecoderConfig, HaData};

pub mod aggregate;
pub mod classify;
pub mod features;
pub mod led;
pub mod pileup;

use aggregate::{aggregate, Aggregates, CountRates, PhSpectra, PsdMap, TimeSelection};
use classify::{classify, led_flags, pulse_coords, ClassifyParams, EventClass, LedWindow};
use features::FeatureParams;
use led::LedParams;
use pileup::PileUpParams;

/// Diagnostic counters of one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    /// Header matches in the stream
    pub n_headers: usize,
    /// Pulses skipped for odd window length
    pub n_skipped_odd: usize,
    /// Pulses skipped for negative window length
    pub n_skipped_neg: usize,
    /// Pulses that needed an interleave shift
    pub n_repaired: usize,
    /// Pulses surviving the window filter
    pub n_decoded: usize,
    /// Pulses inside the time selection
    pub n_selected: usize,
    /// Selected duration [s]
    pub duration: f64,
    pub n_neutron: usize,
    pub n_gamma: usize,
    pub n_led: usize,
    pub n_pileup: usize,
    pub n_saturated: usize,
}

/// Full result set of one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisOutput {
    /// Time-bin centres [s]
    pub time_cnt: Vec<f64>,
    /// LED-slot centres [s]
    pub time_led: Vec<f64>,
    /// Count rates per class [1/s]
    pub cnt: CountRates,
    /// Pulse-height spectra per class
    pub phs: PhSpectra,
    /// PM gain trace, one entry per LED slot
    pub pmgain: Vec<f32>,
    /// Per-pulse type code: neutron=0, gamma=1, pileup=2, led=3, other=-1
    pub event_type: Vec<i8>,
    /// Per-pulse corrected pulse height
    pub ph: Vec<f32>,
    /// Per-pulse pulse-shape coordinate
    pub ps: Vec<f32>,
    /// 2-D PSD map of all selected pulses
    pub psd_map: PsdMap,
    /// Distribution of selected window lengths
    pub winlen_hist: Vec<u64>,
    pub diagnostics: Diagnostics,
}

/// The analysis pipeline for one parameter set
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: Config,
}

impl Analyzer {
    /// Validate the configuration and build the pipeline
    pub fn new(config: Config) -> AnalysisResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process one acquisition file with the configured time interval
    pub fn run(&self, path: &Path) -> AnalysisResult<AnalysisOutput> {
        self.run_with(path, self.config.io.check_md5, None)
    }

    /// Process one acquisition file over explicit disjoint time ranges
    pub fn run_ranges(
        &self,
        path: &Path,
        t_ranges: &[(f64, f64)],
    ) -> AnalysisResult<AnalysisOutput> {
        self.run_with(path, self.config.io.check_md5, Some(t_ranges.to_vec()))
    }

    /// Full-control entry point used by the CLI for shot-resolved inputs
    pub fn run_with(
        &self,
        path: &Path,
        check_md5: bool,
        t_ranges: Option<Vec<(f64, f64)>>,
    ) -> AnalysisResult<AnalysisOutput> {
        let cfg = &self.config;
        let decoder_config = DecoderConfig {
            min_winlen: cfg.peak.baseline_start.max(cfg.peak.baseline_end),
            max_winlen: Some(cfg.setup.tof_window_length),
            check_md5,
        };
        let ha = decoder::read_ha(path, &decoder_config)?;
        self.process(ha, t_ranges)
    }

    /// Run the pipeline on an already decoded pulse table
    pub fn process(
        &self,
        ha: HaData,
        t_ranges: Option<Vec<(f64, f64)>>,
    ) -> AnalysisResult<AnalysisOutput> {
        let cfg = &self.config;

        let selection = match t_ranges {
            Some(ranges) => TimeSelection::Ranges(ranges),
            None => TimeSelection::Interval {
                t_beg: cfg.setup.t_beg,
                t_end: cfg.setup.t_end,
            },
        };
        let (selected, duration) = selection.select(&ha.t_events);

        let mut diagnostics = Diagnostics {
            n_headers: ha.n_headers,
            n_skipped_odd: ha.n_skipped_odd,
            n_skipped_neg: ha.n_skipped_neg,
            n_repaired: ha.repaired.len(),
            n_decoded: ha.n_pulses(),
            n_selected: selected.len(),
            duration,
            ..Default::default()
        };

        if selected.is_empty() {
            warn!("No events inside the requested time selection");
            return Ok(AnalysisOutput {
                diagnostics,
                ..Default::default()
            });
        }

        let t_events: Vec<f64> = selected.iter().map(|&i| ha.t_events[i]).collect();
        let winlen: Vec<usize> = selected.iter().map(|&i| ha.winlen[i]).collect();
        let mut pulses = ha.pulses.select(&selected);
        info!(
            n_selected = t_events.len(),
            t_start = t_events[0],
            t_end = t_events[t_events.len() - 1],
            "Time selection applied"
        );

        // Feature extraction (baseline subtraction mutates the matrix)
        let feature_params = FeatureParams {
            baseline_start: cfg.peak.baseline_start,
            baseline_end: cfg.peak.baseline_end,
            tof_window_length: cfg.setup.tof_window_length,
            short_gate: cfg.peak.short_gate,
            long_gate: cfg.peak.long_gate,
            max_difference: cfg.peak.max_difference,
            saturation_high: cfg.peak.saturation_high,
            saturation_low: cfg.peak.saturation_low,
            subtract_baseline: cfg.peak.subtract_baseline,
        };
        let mut feats = features::extract(&mut pulses, &winlen, &feature_params);

        // Initial PSD pass: coordinates and LED tagging
        let classify_params = ClassifyParams {
            ph_channels: cfg.separation.ph_channels,
            ps_channels: cfg.separation.ps_channels,
            marker: cfg.separation.marker,
            line_change: cfg.separation.line_change,
            slope1: cfg.separation.slope1,
            slope2: cfg.separation.slope2,
            offset: cfg.separation.offset,
            dd_lower: cfg.separation.dd_lower,
            dd_upper: cfg.separation.dd_upper,
            dt_lower: cfg.separation.dt_lower,
            dt_upper: cfg.separation.dt_upper,
        };
        let dx = classify_params.dx();
        let (ph0, ps) = pulse_coords(&feats, dx, cfg.separation.ps_channels);
        let led_window = LedWindow {
            xmin: cfg.led.xmin,
            xmax: cfg.led.xmax,
            ymin: cfg.led.ymin,
            ymax: cfg.led.ymax,
        };
        let is_led = led_flags(&ph0, &ps, &led_window);

        // Pile-up detection
        let pileup_params = PileUpParams {
            front: cfg.peak.front,
            tail: cfg.peak.tail,
            led_front: cfg.led.front,
            led_tail: cfg.led.tail,
            threshold: cfg.peak.threshold,
        };
        let peaks = pileup::detect(
            &pulses,
            &winlen,
            cfg.setup.tof_window_length,
            &is_led,
            &pileup_params,
        );

        // LED gain correction (strictly sequential in pulse order)
        let t_span = t_events[t_events.len() - 1] - t_events[0];
        let n_led = (t_span / cfg.led.dt) as usize;
        let pmgain = if cfg.led.correction {
            led::correct(
                &t_events,
                &is_led,
                &mut feats.total_int,
                &LedParams {
                    dt: cfg.led.dt,
                    reference: cfg.led.reference as f32,
                    dx,
                },
            )
        } else {
            vec![0.0; n_led]
        };
        let time_led = led::slot_centres(t_events[0], cfg.led.dt, n_led);

        // Final classification with the corrected pulse height
        let ph: Vec<f32> = feats.total_int.iter().map(|&t| dx * t).collect();
        let table = classify(&ph, &ps, &feats.sat, &peaks, &is_led, &classify_params);

        diagnostics.n_neutron = table.count(EventClass::Neutron);
        diagnostics.n_gamma = table.count(EventClass::Gamma);
        diagnostics.n_led = table.count(EventClass::Led);
        diagnostics.n_pileup = table.count(EventClass::PileUp);
        diagnostics.n_saturated = table.count(EventClass::Saturated);
        info!(
            n_neutron = diagnostics.n_neutron,
            n_gamma = diagnostics.n_gamma,
            n_led = diagnostics.n_led,
            n_pileup = diagnostics.n_pileup,
            n_saturated = diagnostics.n_saturated,
            "Classification finished"
        );

        // Aggregation
        let Aggregates {
            time_cnt,
            cnt,
            phs,
            psd_map,
            winlen_hist,
        } = aggregate(
            &t_events,
            &ph,
            &ps,
            &winlen,
            &table,
            cfg.setup.time_bin,
            cfg.separation.ph_channels,
            cfg.separation.ps_channels,
            duration,
        );

        Ok(AnalysisOutput {
            time_cnt,
            time_led,
            cnt,
            phs,
            pmgain,
            event_type: table.type_codes(),
            ph,
            ps,
            psd_map,
            winlen_hist,
            diagnostics,
        })
    }
}

//! Acquisition-stream decoder for HA_*.dat files
//!
//! Decodes the raw binary stream written by the fast ADC into a table of
//! pulses: reconstructed waveforms, window lengths and inter-event times.
//!
//! # Data Format
//!
//! The file is a flat sequence of 16-bit Little-Endian words with no file
//! header. A pulse record is four header words followed by the payload
//! samples, which run until the next header (the final payload extends to
//! end of file):
//!
//! - Header predicate: `H0 ∈ {0,1,2}`, `H2 ∈ {0,1,2}`, `H1 + 1 == H3`
//! - Time gap to the previous window: `tdiff = H3 + H0 * 32768` (10 ns units)
//! - Payload words are raw ADC codes; normalization subtracts the sign
//!   offset, undoes a 16384-count wrap above 8192 and negates, yielding
//!   positive-going pulses
//!
//! Each decoded pulse also passes through the lane-interleave repair
//! ([`repair::min_tension`]) before it is stored.

use std::path::Path;

use bytes::Buf;
use tracing::{debug, info};

use crate::common::{AnalysisError, AnalysisResult};

pub mod repair;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

mod constants {
    /// Header words opening every pulse record
    pub const HEADER_WORDS: usize = 4;

    /// Largest word value allowed in header slots 0 and 2
    pub const HEADER_CODE_MAX: u16 = 2;

    /// Weight of header word 0 in the 32-bit time-gap reconstruction
    pub const TDIFF_HIGH_FACTOR: u32 = 32768;

    /// One time-gap unit in seconds (10 ns ADC clock)
    pub const TICK_SECONDS: f64 = 1e-8;

    /// ADC sign offset
    pub const SIGN_OFFSET: i32 = 32768;

    /// Values above this after sign correction carry a wrap fault
    pub const WRAP_THRESHOLD: i32 = 8192;

    /// Wrap-fault correction
    pub const WRAP_CORRECTION: i32 = 16384;
}

// ---------------------------------------------------------------------------
// Decoder configuration & output
// ---------------------------------------------------------------------------

/// Decoder configuration
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    /// Pulses with `winlen <= min_winlen` are discarded
    pub min_winlen: usize,
    /// Row width of the pulse matrix; defaults to the per-file maximum
    pub max_winlen: Option<usize>,
    /// Require the `<file>.md5` sibling to exist
    pub check_md5: bool,
}

/// Zero-padded contiguous 2-D buffer of decoded waveforms
#[derive(Debug, Clone)]
pub struct PulseMatrix {
    data: Vec<f32>,
    width: usize,
    rows: usize,
}

impl PulseMatrix {
    pub fn new(rows: usize, width: usize) -> Self {
        Self {
            data: vec![0.0; rows * width],
            width,
            rows,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.width..(i + 1) * self.width]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.width..(i + 1) * self.width]
    }

    /// Keep only the given rows, in order
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut out = Self::new(indices.len(), self.width);
        for (dst, &src) in indices.iter().enumerate() {
            out.row_mut(dst).copy_from_slice(self.row(src));
        }
        out
    }
}

/// Decoded pulse table for one acquisition file
#[derive(Debug, Clone)]
pub struct HaData {
    /// Header word offset per retained pulse
    pub boundaries: Vec<usize>,
    /// Number of valid samples per retained pulse
    pub winlen: Vec<usize>,
    /// Reconstructed time gap per retained pulse (10 ns units)
    pub tdiff: Vec<u32>,
    /// Cumulative event time per retained pulse [s]
    pub t_events: Vec<f64>,
    /// Decoded, repaired, zero-padded waveforms
    pub pulses: PulseMatrix,
    /// Indices of pulses that needed a lane shift > 0
    pub repaired: Vec<usize>,
    /// Total number of header matches in the stream
    pub n_headers: usize,
    /// Pulses skipped for odd window length
    pub n_skipped_odd: usize,
    /// Pulses skipped for negative window length
    pub n_skipped_neg: usize,
}

impl HaData {
    pub fn n_pulses(&self) -> usize {
        self.winlen.len()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Decode an acquisition file into a pulse table.
///
/// Fails with [`AnalysisError::MissingInput`] when the file (or, with
/// `check_md5`, its `.md5` sibling) does not exist, and with
/// [`AnalysisError::MalformedStream`] when no pulse survives decoding.
pub fn read_ha(path: &Path, config: &DecoderConfig) -> AnalysisResult<HaData> {
    info!(file = %path.display(), "Reading binary acquisition file");

    if !path.is_file() {
        return Err(AnalysisError::missing_input(format!(
            "acquisition file {} not found",
            path.display()
        )));
    }
    if config.check_md5 {
        let md5 = path.with_extension(
            path.extension()
                .map(|e| format!("{}.md5", e.to_string_lossy()))
                .unwrap_or_else(|| "md5".to_string()),
        );
        if !md5.is_file() {
            return Err(AnalysisError::missing_input(format!(
                "md5 sibling {} not found",
                md5.display()
            )));
        }
    }

    let raw = std::fs::read(path)?;
    let mut buf = raw.as_slice();
    let mut words = Vec::with_capacity(raw.len() / 2);
    while buf.remaining() >= 2 {
        words.push(buf.get_u16_le());
    }

    decode_words(&words, config)
}

/// Decode a word stream already in memory (the file body of `read_ha`)
pub fn decode_words(words: &[u16], config: &DecoderConfig) -> AnalysisResult<HaData> {
    let boundaries = find_boundaries(words);
    let n_headers = boundaries.len();
    if n_headers == 0 {
        return Err(AnalysisError::malformed(
            "no pulse headers matched",
            0,
            0,
        ));
    }
    debug!(n_headers, "Located pulse headers");

    // Time gaps, 32-bit reconstruction from header words 0 and 3
    let tdiff_all: Vec<u32> = boundaries
        .iter()
        .map(|&b| words[b + 3] as u32 + words[b] as u32 * constants::TDIFF_HIGH_FACTOR)
        .collect();

    // Window lengths; the sentinel keeps the final pulse (extends to EOF)
    let mut bounds = boundaries.clone();
    bounds.push(words.len());
    let winlen_all: Vec<i64> = bounds
        .windows(2)
        .map(|w| w[1] as i64 - w[0] as i64 - constants::HEADER_WORDS as i64)
        .collect();

    let n_skipped_odd = winlen_all.iter().filter(|&&w| w.rem_euclid(2) == 1).count();
    let n_skipped_neg = winlen_all.iter().filter(|&&w| w < 0).count();
    debug!(n_skipped_odd, "Skipped pulses with odd window length");
    info!(n_skipped_neg, "Skipped pulses with window length <= 0");

    let retained: Vec<usize> = (0..n_headers)
        .filter(|&i| winlen_all[i] % 2 == 0 && winlen_all[i] > config.min_winlen as i64)
        .collect();
    if retained.is_empty() {
        return Err(AnalysisError::malformed(
            "all pulses rejected by window filter",
            n_headers,
            0,
        ));
    }

    let winlen: Vec<usize> = retained.iter().map(|&i| winlen_all[i] as usize).collect();
    let max_winlen = config
        .max_winlen
        .unwrap_or_else(|| winlen.iter().copied().max().unwrap_or(0));

    // Event times: cumulative gap sum, restricted to retained pulses
    let mut cum = 0.0f64;
    let t_all: Vec<f64> = tdiff_all
        .iter()
        .map(|&d| {
            cum += d as f64;
            cum * constants::TICK_SECONDS
        })
        .collect();
    let t_events: Vec<f64> = retained.iter().map(|&i| t_all[i]).collect();
    let tdiff: Vec<u32> = retained.iter().map(|&i| tdiff_all[i]).collect();

    // Decode, repair and store each retained waveform
    let mut pulses = PulseMatrix::new(retained.len(), max_winlen);
    let mut repaired_idx = Vec::new();
    for (row, &i) in retained.iter().enumerate() {
        let start = boundaries[i] + constants::HEADER_WORDS;
        let pulse_len = (winlen_all[i] as usize).min(max_winlen);
        let span: Vec<i32> = words[start..start + pulse_len]
            .iter()
            .map(|&w| normalize(w))
            .collect();

        let fixed = repair::min_tension(&span);
        if fixed.shift > 0 {
            repaired_idx.push(row);
        }
        let dst = pulses.row_mut(row);
        for (k, &v) in fixed.samples.iter().enumerate() {
            dst[k] = v as f32;
        }
    }
    info!(
        n_repaired = repaired_idx.len(),
        n_pulses = retained.len(),
        "Sorted faulty ADC synchronisation"
    );

    Ok(HaData {
        boundaries: retained.iter().map(|&i| boundaries[i]).collect(),
        winlen,
        tdiff,
        t_events,
        pulses,
        repaired: repaired_idx,
        n_headers,
        n_skipped_odd,
        n_skipped_neg,
    })
}

// ---------------------------------------------------------------------------
// Free functions (pure, easy to test)
// ---------------------------------------------------------------------------

/// Locate every word offset opening a pulse header
fn find_boundaries(words: &[u16]) -> Vec<usize> {
    let n = words.len();
    if n < constants::HEADER_WORDS {
        return Vec::new();
    }
    (0..n - 3)
        .filter(|&i| {
            words[i] <= constants::HEADER_CODE_MAX
                && words[i + 2] <= constants::HEADER_CODE_MAX
                && words[i + 1] as u32 + 1 == words[i + 3] as u32
        })
        .collect()
}

/// Map one raw ADC word onto the physical (positive-going) sample value
fn normalize(word: u16) -> i32 {
    let mut v = word as i32 - constants::SIGN_OFFSET;
    if v > constants::WRAP_THRESHOLD {
        v -= constants::WRAP_CORRECTION;
    }
    -v
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode a physical sample value as a raw ADC word (inverse of
    /// `normalize` for amplitudes in the non-wrapping range)
    fn encode(sample: i32) -> u16 {
        (constants::SIGN_OFFSET - sample) as u16
    }

    /// Append a header encoding the given time gap
    fn push_header(words: &mut Vec<u16>, tdiff: u32) {
        let h0 = (tdiff / constants::TDIFF_HIGH_FACTOR) as u16;
        let h3 = (tdiff % constants::TDIFF_HIGH_FACTOR) as u16;
        assert!(h0 <= 2, "tdiff too large for a header");
        assert!(h3 >= 1, "low word must be positive");
        words.extend_from_slice(&[h0, h3 - 1, 0, h3]);
    }

    /// Append a payload, lane-swapped the way the ADC emits it
    fn push_payload(words: &mut Vec<u16>, samples: &[i32]) {
        assert!(samples.len() % 2 == 0);
        for pair in samples.chunks_exact(2) {
            words.push(encode(pair[1]));
            words.push(encode(pair[0]));
        }
    }

    fn default_config() -> DecoderConfig {
        DecoderConfig {
            min_winlen: 0,
            max_winlen: None,
            check_md5: false,
        }
    }

    // -----------------------------------------------------------------------
    // normalize tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_normalize_midscale_is_zero() {
        assert_eq!(normalize(32768), 0);
    }

    #[test]
    fn test_normalize_positive_pulse() {
        // Codes below midscale map to positive samples
        assert_eq!(normalize(25568), 7200);
        assert_eq!(normalize(24000), 8768);
    }

    #[test]
    fn test_normalize_wrap_correction() {
        // 40000 - 32768 = 7232, below the wrap threshold
        assert_eq!(normalize(40000), -7232);
        // 50000 - 32768 = 17232 > 8192, wrap undone then negated
        assert_eq!(normalize(50000), -848);
    }

    #[test]
    fn test_encode_roundtrip() {
        for s in [-8000, -1, 0, 1, 500, 8192, 8768, 20000] {
            assert_eq!(normalize(encode(s)), s);
        }
    }

    // -----------------------------------------------------------------------
    // Header predicate tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_find_boundaries_basic() {
        let mut words = Vec::new();
        push_header(&mut words, 11);
        push_payload(&mut words, &[0, 0, 100, 100]);
        push_header(&mut words, 7);
        push_payload(&mut words, &[0, 50, 50, 0]);

        let b = find_boundaries(&words);
        assert_eq!(b, vec![0, 8]);
    }

    #[test]
    fn test_find_boundaries_rejects_large_codes() {
        // H0 = 3 breaks the predicate
        let words = vec![3, 10, 0, 11, 500, 500];
        assert!(find_boundaries(&words).is_empty());
    }

    #[test]
    fn test_find_boundaries_rejects_wrong_increment() {
        // H3 != H1 + 1
        let words = vec![0, 10, 0, 12, 500, 500];
        assert!(find_boundaries(&words).is_empty());
    }

    #[test]
    fn test_find_boundaries_short_stream() {
        assert!(find_boundaries(&[0, 1, 0]).is_empty());
    }

    // -----------------------------------------------------------------------
    // Stream decoding tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_tdiff_reconstruction() {
        // Headers (0,10,0,11), (1,20,1,21), (2,30,2,31) with trivial payloads
        let mut words = Vec::new();
        words.extend_from_slice(&[0, 10, 0, 11]);
        push_payload(&mut words, &[0, 0, 0, 0]);
        words.extend_from_slice(&[1, 20, 1, 21]);
        push_payload(&mut words, &[0, 0, 0, 0]);
        words.extend_from_slice(&[2, 30, 2, 31]);
        push_payload(&mut words, &[0, 0, 0, 0]);

        let ha = decode_words(&words, &default_config()).unwrap();
        assert_eq!(ha.n_pulses(), 3);
        assert_eq!(ha.tdiff, vec![11, 32768 + 21, 65536 + 31]);

        let expected = [
            11.0 * 1e-8,
            (11.0 + 32789.0) * 1e-8,
            (11.0 + 32789.0 + 65567.0) * 1e-8,
        ];
        for (t, e) in ha.t_events.iter().zip(expected) {
            assert!((t - e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_t_events_nondecreasing() {
        let mut words = Vec::new();
        for k in 0..10u32 {
            push_header(&mut words, 100 + k);
            push_payload(&mut words, &[0, 10, 10, 0]);
        }
        let ha = decode_words(&words, &default_config()).unwrap();
        for pair in ha.t_events.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn test_window_filter_skips_odd() {
        let mut words = Vec::new();
        push_header(&mut words, 10);
        push_payload(&mut words, &[0, 20, 20, 0]);
        push_header(&mut words, 10);
        words.push(encode(5)); // odd window of 1 word
        push_header(&mut words, 10);
        push_payload(&mut words, &[0, 30, 30, 0]);

        let ha = decode_words(&words, &default_config()).unwrap();
        assert_eq!(ha.n_headers, 3);
        assert_eq!(ha.n_pulses(), 2);
        assert_eq!(ha.n_skipped_odd, 1);
        assert_eq!(ha.winlen, vec![4, 4]);
    }

    #[test]
    fn test_window_filter_min_winlen() {
        let mut words = Vec::new();
        push_header(&mut words, 10);
        push_payload(&mut words, &[0, 20, 20, 0]); // winlen 4
        push_header(&mut words, 10);
        push_payload(&mut words, &[0, 20, 20, 0, 10, 10]); // winlen 6

        let config = DecoderConfig {
            min_winlen: 4,
            ..default_config()
        };
        let ha = decode_words(&words, &config).unwrap();
        // winlen must be strictly greater than min_winlen
        assert_eq!(ha.n_pulses(), 1);
        assert_eq!(ha.winlen, vec![6]);
    }

    #[test]
    fn test_no_headers_is_malformed() {
        let words = vec![5000, 6000, 7000, 8000, 9000];
        let err = decode_words(&words, &default_config()).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedStream { .. }));
    }

    #[test]
    fn test_all_rejected_is_malformed() {
        let mut words = Vec::new();
        push_header(&mut words, 10);
        words.push(encode(1)); // single odd window
        let err = decode_words(&words, &default_config()).unwrap_err();
        match err {
            AnalysisError::MalformedStream { n_headers, .. } => assert_eq!(n_headers, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_waveform_restored_from_lane_swap() {
        let samples = vec![0, 1, 3, 6, 10, 14, 12, 9, 6, 4, 2, 1];
        let mut words = Vec::new();
        push_header(&mut words, 10);
        push_payload(&mut words, &samples);

        let ha = decode_words(&words, &default_config()).unwrap();
        assert_eq!(ha.n_pulses(), 1);
        assert!(ha.repaired.is_empty());
        let row = ha.pulses.row(0);
        for (k, &s) in samples.iter().enumerate() {
            assert_eq!(row[k], s as f32);
        }
    }

    #[test]
    fn test_final_pulse_extends_to_eof() {
        let mut words = Vec::new();
        push_header(&mut words, 10);
        push_payload(&mut words, &[0, 5, 5, 0]);
        push_header(&mut words, 10);
        push_payload(&mut words, &[0, 7, 7, 0, 3, 1]); // EOF-terminated

        let ha = decode_words(&words, &default_config()).unwrap();
        assert_eq!(ha.winlen, vec![4, 6]);
    }

    #[test]
    fn test_max_winlen_truncates_rows() {
        let mut words = Vec::new();
        push_header(&mut words, 10);
        push_payload(&mut words, &[0, 2, 4, 6, 8, 10, 12, 14]);

        let config = DecoderConfig {
            max_winlen: Some(4),
            ..default_config()
        };
        let ha = decode_words(&words, &config).unwrap();
        assert_eq!(ha.winlen, vec![8]); // winlen keeps the full value
        assert_eq!(ha.pulses.width(), 4); // but only 4 samples are decoded
    }

    #[test]
    fn test_matrix_select() {
        let mut m = PulseMatrix::new(3, 2);
        m.row_mut(0).copy_from_slice(&[1.0, 2.0]);
        m.row_mut(1).copy_from_slice(&[3.0, 4.0]);
        m.row_mut(2).copy_from_slice(&[5.0, 6.0]);
        let s = m.select(&[2, 0]);
        assert_eq!(s.rows(), 2);
        assert_eq!(s.row(0), &[5.0, 6.0]);
        assert_eq!(s.row(1), &[1.0, 2.0]);
    }
}

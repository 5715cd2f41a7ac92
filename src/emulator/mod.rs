//! Synthetic acquisition-file generator
//!
//! Builds byte streams in the HA_*.dat format for tests, demos and decoder
//! development: headers with chosen time gaps, Gaussian pulse shapes with
//! noise, periodic LED-like reference pulses and optional lane-shift
//! corruption to exercise the interleave repair.
//!
//! The payload encoding mirrors the real hardware: raw words are written
//! with the two sample lanes swapped pairwise, which the decoder's normal
//! (unshifted) interleave correction undoes.

use std::path::Path;

use bytes::BufMut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Generator configuration
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Number of pulses to emit
    pub n_pulses: usize,
    /// Samples per window (even)
    pub window_len: usize,
    /// Gap between consecutive events in 10 ns ticks
    pub tdiff_ticks: u32,
    /// Mean physics-pulse amplitude (counts)
    pub amplitude_mean: f64,
    /// Amplitude spread
    pub amplitude_sigma: f64,
    /// White noise added to every sample
    pub noise_sigma: f64,
    /// Every k-th pulse is an LED reference pulse (0 disables)
    pub led_period: usize,
    /// LED pulse amplitude (counts)
    pub led_amplitude: f64,
    /// RNG seed for reproducible streams
    pub seed: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            n_pulses: 1000,
            window_len: 128,
            tdiff_ticks: 1000,
            amplitude_mean: 2000.0,
            amplitude_sigma: 500.0,
            noise_sigma: 5.0,
            led_period: 50,
            led_amplitude: 1200.0,
            seed: 42,
        }
    }
}

/// Incremental builder of an acquisition word stream
#[derive(Debug, Default)]
pub struct HaFileBuilder {
    words: Vec<u16>,
}

impl HaFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one pulse record with the ordinary lane-swapped payload
    pub fn push_pulse(&mut self, tdiff: u32, samples: &[i32]) -> &mut Self {
        self.push_header(tdiff);
        assert!(samples.len() % 2 == 0, "window length must be even");
        for pair in samples.chunks_exact(2) {
            self.words.push(encode_sample(pair[1]));
            self.words.push(encode_sample(pair[0]));
        }
        self
    }

    /// Append a pulse whose lanes are additionally shifted by `shift` pairs,
    /// prefixing the late lane with off-scale junk. The decoder recovers the
    /// original samples (minus `2 * shift` tail entries) and reports the
    /// pulse as repaired.
    pub fn push_pulse_shifted(&mut self, tdiff: u32, samples: &[i32], shift: usize) -> &mut Self {
        assert!(shift <= 2, "the decoder searches shifts up to 2");
        if shift == 0 {
            return self.push_pulse(tdiff, samples);
        }
        self.push_header(tdiff);
        assert!(samples.len() % 2 == 0, "window length must be even");
        let n = samples.len() / 2;
        let evens: Vec<i32> = samples.iter().step_by(2).copied().collect();
        let odds: Vec<i32> = samples.iter().skip(1).step_by(2).copied().collect();

        // Raw odd lane: junk prefix, then the even-indexed samples; raw even
        // lane: the odd-indexed samples. Off-scale junk keeps the tension of
        // every unshifted candidate high.
        for k in 0..n {
            self.words.push(encode_sample(odds[k]));
            let v = if k < shift {
                if k % 2 == 0 {
                    8000
                } else {
                    -8000
                }
            } else {
                evens[k - shift]
            };
            self.words.push(encode_sample(v));
        }
        self
    }

    fn push_header(&mut self, tdiff: u32) {
        let h0 = tdiff / 32768;
        let h3 = tdiff % 32768;
        assert!(h0 <= 2, "time gap exceeds the header range");
        assert!(h3 >= 1, "time gap must have a positive low word");
        self.words
            .extend_from_slice(&[h0 as u16, (h3 - 1) as u16, 0, h3 as u16]);
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Serialize as the little-endian byte stream of the file format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.words.len() * 2);
        for &w in &self.words {
            buf.put_u16_le(w);
        }
        buf
    }

    /// Write the stream to disk, optionally with the `.md5` sibling the
    /// analyzer's preflight gate looks for (its contents are never read)
    pub fn write(&self, path: &Path, with_md5: bool) -> std::io::Result<()> {
        std::fs::write(path, self.to_bytes())?;
        if with_md5 {
            let md5 = path.with_extension(
                path.extension()
                    .map(|e| format!("{}.md5", e.to_string_lossy()))
                    .unwrap_or_else(|| "md5".to_string()),
            );
            std::fs::write(md5, b"")?;
        }
        Ok(())
    }
}

/// Encode a physical sample value as a raw ADC word
fn encode_sample(sample: i32) -> u16 {
    let code = 32768 - sample;
    assert!((0..=65535).contains(&code), "sample out of ADC range");
    code as u16
}

/// Generate a full synthetic stream: Gaussian physics pulses with noise and
/// periodic LED reference pulses
pub fn generate(config: &EmulatorConfig) -> HaFileBuilder {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let amplitude = Normal::new(config.amplitude_mean, config.amplitude_sigma)
        .unwrap_or_else(|_| Normal::new(config.amplitude_mean, 1.0).expect("valid sigma"));
    let noise = Normal::new(0.0, config.noise_sigma.max(f64::MIN_POSITIVE))
        .expect("valid noise sigma");

    let mut builder = HaFileBuilder::new();
    for i in 0..config.n_pulses {
        let is_led = config.led_period > 0 && i % config.led_period == 0;
        let (amp, width) = if is_led {
            (config.led_amplitude, config.window_len as f64 / 8.0)
        } else {
            (amplitude.sample(&mut rng).max(50.0), 3.0)
        };
        let peak = config.window_len as f64 / 4.0;

        let samples: Vec<i32> = (0..config.window_len)
            .map(|k| {
                let d = k as f64 - peak;
                let v = amp * (-d * d / (2.0 * width * width)).exp() + noise.sample(&mut rng);
                (v.round() as i32).clamp(-8192, 8192)
            })
            .collect();

        // Jitter the gap a little so slots fill unevenly
        let tdiff = config.tdiff_ticks + rng.gen_range(0..16);
        builder.push_pulse(tdiff, &samples);
    }
    builder
}

//! Interleave repair for the ADC lane-synchronisation fault
//!
//! The ADC emits the two sample lanes swapped, occasionally shifted against
//! each other by one or two lane pairs. For every pulse a small set of
//! candidate re-interleavings is scored by "tension" (sum of squared first
//! differences) and the smoothest candidate wins. The unshifted odd-first
//! candidate is the normal reading; a winner with shift > 0 means the pulse
//! needed an actual repair.

/// Result of the minimum-tension search for one pulse
#[derive(Debug, Clone)]
pub struct Repaired {
    /// Lane-pair shift of the winning candidate
    pub shift: usize,
    /// Re-interleaved samples, length `2 * (n_pairs - shift)`
    pub samples: Vec<i32>,
}

/// Sum of squared first differences of a sequence
fn tension(seq: &[i32]) -> i64 {
    seq.windows(2)
        .map(|w| {
            let d = (w[1] - w[0]) as i64;
            d * d
        })
        .sum()
}

/// Merge two half-streams by alternation: `a[0], b[0], a[1], b[1], …`
fn interleave(a: &[i32], b: &[i32]) -> Vec<i32> {
    let n = a.len().min(b.len());
    let mut out = Vec::with_capacity(2 * n);
    for k in 0..n {
        out.push(a[k]);
        out.push(b[k]);
    }
    out
}

/// Pick the minimum-tension interleaving of a raw pulse span.
///
/// Candidates are the odd-first orderings `(odd[j..], even[..n-j])` for
/// `j = 0, 1, 2` followed by the even-first shifts `(even[j..], odd[..n-j])`
/// for `j = 1, 2`. Odd-first candidates are scored first so the normal
/// reading wins ties. The raw ordering itself is never a candidate: the
/// hardware always swaps lanes, so odd-first with `j = 0` already is the
/// identity correction.
pub fn min_tension(raw: &[i32]) -> Repaired {
    let n = raw.len() / 2;
    if n == 0 {
        return Repaired {
            shift: 0,
            samples: Vec::new(),
        };
    }
    let even: Vec<i32> = raw.iter().step_by(2).take(n).copied().collect();
    let odd: Vec<i32> = raw.iter().skip(1).step_by(2).take(n).copied().collect();

    let mut best: Option<Repaired> = None;
    let mut best_tension = i64::MAX;

    let mut consider = |shift: usize, candidate: Vec<i32>| {
        if candidate.is_empty() {
            return;
        }
        let t = tension(&candidate);
        if t < best_tension {
            best_tension = t;
            best = Some(Repaired {
                shift,
                samples: candidate,
            });
        }
    };

    for j in 0..=2.min(n - 1) {
        consider(j, interleave(&odd[j..], &even[..n - j]));
    }
    for j in 1..=2.min(n - 1) {
        consider(j, interleave(&even[j..], &odd[..n - j]));
    }

    best.unwrap_or(Repaired {
        shift: 0,
        samples: Vec::new(),
    })
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use crate::error::AnalysisError;

/// What to do when two neighbouring filters land on the same FFT bin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    /// Widen the filter to a one-bin ramp (a spike at its centre).
    #[default]
    Clamp,
    /// Fail the build.
    Reject,
}

pub fn hz_to_mels(hz: f32) -> f32 {
    1127.0 * (1.0 + hz / 700.0).ln()
}

pub fn mels_to_hz(mels: f32) -> f32 {
    700.0 * ((mels / 1127.0).exp() - 1.0)
}

/// `melCount x fftBins` matrix of triangular weights.
///
/// Each row peaks at exactly 1.0 on its centre bin and falls linearly to zero
/// over `range` bins on either side. Centre bins are non-decreasing.
#[derive(Clone, Debug)]
pub struct MelFilterbank {
    fft_bins: usize,
    centers: Vec<usize>,
    ranges: Vec<usize>,
    weights: Vec<Vec<f32>>,
}

impl MelFilterbank {
    pub fn build(
        fft_bins: usize,
        n_filters: usize,
        low_hz: f32,
        high_hz: f32,
        sample_rate: u32,
        policy: DegeneratePolicy,
    ) -> Result<Self, AnalysisError> {
        if fft_bins == 0 || n_filters == 0 || sample_rate == 0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "filterbank needs fft_bins, n_filters and sample_rate > 0 (got {}, {}, {})",
                fft_bins, n_filters, sample_rate
            )));
        }
        let nyquist = sample_rate as f32 / 2.0;
        if !(low_hz >= 0.0 && high_hz > low_hz && high_hz <= nyquist) {
            return Err(AnalysisError::DegenerateFilter {
                filter: 0,
                reason: format!(
                    "frequency range {}..{} Hz is empty or outside 0..{} Hz",
                    low_hz, high_hz, nyquist
                ),
            });
        }

        let to_bin = |hz: f32| ((fft_bins + 1) as f32 * hz / nyquist).floor() as usize;

        let low_mel = hz_to_mels(low_hz);
        let high_mel = hz_to_mels(high_hz);
        let delta = (high_mel - low_mel) / (n_filters + 1) as f32;
        let centers: Vec<usize> = (0..n_filters)
            .map(|i| to_bin(mels_to_hz(low_mel + i as f32 * delta)))
            .collect();

        if let Some(i) = centers.iter().position(|&c| c >= fft_bins) {
            return Err(AnalysisError::DegenerateFilter {
                filter: i,
                reason: format!("centre bin {} outside {} FFT bins", centers[i], fft_bins),
            });
        }

        let mut ranges = Vec::with_capacity(n_filters);
        let mut clamped = 0usize;
        for i in 0..n_filters {
            let range = if n_filters == 1 {
                to_bin(high_hz).saturating_sub(centers[0])
            } else if i + 1 < n_filters {
                centers[i + 1] - centers[i]
            } else {
                centers[i] - centers[i - 1]
            };
            if range == 0 {
                match policy {
                    DegeneratePolicy::Reject => {
                        return Err(AnalysisError::DegenerateFilter {
                            filter: i,
                            reason: format!(
                                "zero-width filter ({} filters over {} bins)",
                                n_filters, fft_bins
                            ),
                        });
                    }
                    DegeneratePolicy::Clamp => clamped += 1,
                }
            }
            ranges.push(range.max(1));
        }
        if clamped > 0 {
            log::warn!(
                "{} of {} mel filters had zero width and were clamped to one bin",
                clamped,
                n_filters
            );
        }

        let weights = centers
            .iter()
            .zip(ranges.iter())
            .map(|(&c, &r)| triangle(fft_bins, c, r))
            .collect();

        log::debug!(
            "Built mel filterbank: {} filters x {} bins, {:.1}-{:.1} Hz @ {} Hz",
            n_filters,
            fft_bins,
            low_hz,
            high_hz,
            sample_rate
        );

        Ok(Self {
            fft_bins,
            centers,
            ranges,
            weights,
        })
    }

    pub fn fft_bins(&self) -> usize {
        self.fft_bins
    }

    pub fn num_filters(&self) -> usize {
        self.weights.len()
    }

    /// Mel-band energies: each filter's weights dotted with `spectrum`.
    pub fn apply(&self, spectrum: &[f32], out: &mut [f32]) -> Result<(), AnalysisError> {
        if spectrum.len() != self.fft_bins {
            return Err(AnalysisError::DimensionMismatch {
                expected: self.fft_bins,
                actual: spectrum.len(),
            });
        }
        if out.len() != self.weights.len() {
            return Err(AnalysisError::DimensionMismatch {
                expected: self.weights.len(),
                actual: out.len(),
            });
        }
        for (energy, row) in out.iter_mut().zip(self.weights.iter()) {
            *energy = row.iter().zip(spectrum.iter()).map(|(w, p)| w * p).sum();
        }
        Ok(())
    }
}

fn triangle(fft_bins: usize, center: usize, range: usize) -> Vec<f32> {
    let c = center as i64;
    let r = range as i64;
    (0..fft_bins as i64)
        .map(|f| {
            if f > c + r || f < c - r {
                0.0
            } else if f > c {
                1.0 - (f - c) as f32 / r as f32
            } else if f == c {
                1.0
            } else {
                1.0 - (c - f) as f32 / r as f32
            }
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct FilterbankKey {
    fft_bins: usize,
    n_filters: usize,
    low_bits: u32,
    high_bits: u32,
    sample_rate: u32,
    policy: DegeneratePolicy,
}

/// Memoizes filterbanks by their build parameters. Entries are immutable once inserted.
#[derive(Default)]
pub struct FilterbankCache {
    entries: RwLock<HashMap<FilterbankKey, Arc<MelFilterbank>>>,
    builds: AtomicUsize,
}

impl FilterbankCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        fft_bins: usize,
        n_filters: usize,
        low_hz: f32,
        high_hz: f32,
        sample_rate: u32,
        policy: DegeneratePolicy,
    ) -> Result<Arc<MelFilterbank>, AnalysisError> {
        let key = FilterbankKey {
            fft_bins,
            n_filters,
            low_bits: low_hz.to_bits(),
            high_bits: high_hz.to_bits(),
            sample_rate,
            policy,
        };

        if let Some(bank) = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return Ok(Arc::clone(bank));
        }

        // build under the write lock so concurrent misses on one key build it once
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(bank) = entries.get(&key) {
            return Ok(Arc::clone(bank));
        }
        let bank = Arc::new(MelFilterbank::build(
            fft_bins,
            n_filters,
            low_hz,
            high_hz,
            sample_rate,
            policy,
        )?);
        let built = self.builds.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("Filterbank cache miss; {} bank(s) built", built);
        entries.insert(key, Arc::clone(&bank));
        Ok(bank)
    }
}

#[cfg(test)]
impl MelFilterbank {
    pub fn centers(&self) -> &[usize] {
        &self.centers
    }

    pub fn ranges(&self) -> &[usize] {
        &self.ranges
    }

    pub fn row(&self, filter: usize) -> &[f32] {
        &self.weights[filter]
    }
}

#[cfg(test)]
impl FilterbankCache {
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_rows(bank: &MelFilterbank) {
        for i in 0..bank.num_filters() {
            let row = bank.row(i);
            let c = bank.centers()[i];
            let r = bank.ranges()[i];
            assert_eq!(row.len(), bank.fft_bins());
            assert_eq!(row.iter().filter(|&&w| w == 1.0).count(), 1, "filter {}", i);
            assert_eq!(row[c], 1.0);
            for (f, &w) in row.iter().enumerate() {
                assert!(w >= 0.0);
                if f + r < c || f > c + r {
                    assert_eq!(w, 0.0, "filter {} bin {}", i, f);
                }
            }
            // left ramp rises, right ramp falls
            for f in c.saturating_sub(r)..c {
                assert!(row[f] < row[f + 1]);
            }
            for f in c..(c + r).min(bank.fft_bins() - 1) {
                assert!(row[f] > row[f + 1]);
            }
        }
        assert!(bank.centers().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn mel_round_trip() {
        for hz in [0.0f32, 20.0, 440.0, 1000.0, 4000.0, 11025.0, 22050.0] {
            let back = mels_to_hz(hz_to_mels(hz));
            assert!((back - hz).abs() <= 1e-3 * hz.max(1.0), "{} -> {}", hz, back);
        }
        assert_eq!(hz_to_mels(0.0), 0.0);
    }

    #[test]
    fn builds_triangular_rows() {
        let bank = MelFilterbank::build(512, 96, 0.0, 11025.0, 22050, DegeneratePolicy::Clamp)
            .unwrap();
        assert_eq!(bank.num_filters(), 96);
        check_rows(&bank);
    }

    #[test]
    fn sparse_filters_have_wide_ramps() {
        let bank = MelFilterbank::build(512, 10, 0.0, 8000.0, 16000, DegeneratePolicy::Reject)
            .unwrap();
        assert!(bank.ranges().iter().all(|&r| r > 1));
        check_rows(&bank);
        let row = bank.row(3);
        let (c, r) = (bank.centers()[3], bank.ranges()[3]);
        let expected = 1.0 - 1.0 / r as f32;
        assert!((row[c + 1] - expected).abs() < 1e-6);
        assert!((row[c - 1] - expected).abs() < 1e-6);
    }

    #[test]
    fn zero_width_filters_follow_policy() {
        // 128 bands over 512 bins at 22.05 kHz puts the lowest filters on the same bin
        let rejected =
            MelFilterbank::build(512, 128, 0.0, 11025.0, 22050, DegeneratePolicy::Reject);
        assert!(matches!(
            rejected,
            Err(AnalysisError::DegenerateFilter { .. })
        ));

        let clamped =
            MelFilterbank::build(512, 128, 0.0, 11025.0, 22050, DegeneratePolicy::Clamp).unwrap();
        assert_eq!(clamped.num_filters(), 128);
        assert!(clamped.ranges().iter().all(|&r| r >= 1));
        check_rows(&clamped);
    }

    #[test]
    fn rejects_bad_frequency_range() {
        for (low, high) in [(1000.0, 1000.0), (2000.0, 1000.0), (-1.0, 1000.0), (0.0, 9000.0)] {
            let res = MelFilterbank::build(256, 20, low, high, 16000, DegeneratePolicy::Clamp);
            assert!(
                matches!(res, Err(AnalysisError::DegenerateFilter { .. })),
                "{}..{}",
                low,
                high
            );
        }
        assert!(matches!(
            MelFilterbank::build(256, 0, 0.0, 8000.0, 16000, DegeneratePolicy::Clamp),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn apply_checks_dimensions() {
        let bank = MelFilterbank::build(64, 8, 0.0, 4000.0, 8000, DegeneratePolicy::Clamp).unwrap();
        let mut out = vec![0.0; 8];
        assert_eq!(
            bank.apply(&[1.0; 32], &mut out),
            Err(AnalysisError::DimensionMismatch {
                expected: 64,
                actual: 32
            })
        );
        bank.apply(&[1.0; 64], &mut out).unwrap();
        for (i, &e) in out.iter().enumerate() {
            let row_sum: f32 = bank.row(i).iter().sum();
            assert!((e - row_sum).abs() < 1e-5);
        }
    }

    #[test]
    fn cache_reuses_banks() {
        let cache = FilterbankCache::new();
        let a = cache
            .get_or_build(512, 96, 0.0, 11025.0, 22050, DegeneratePolicy::Clamp)
            .unwrap();
        let b = cache
            .get_or_build(512, 96, 0.0, 11025.0, 22050, DegeneratePolicy::Clamp)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        cache
            .get_or_build(512, 64, 0.0, 11025.0, 22050, DegeneratePolicy::Clamp)
            .unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.builds(), 2);
    }

    #[test]
    fn concurrent_misses_build_once() {
        let cache = FilterbankCache::new();
        let banks: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        cache
                            .get_or_build(512, 128, 0.0, 11025.0, 22050, DegeneratePolicy::Clamp)
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(banks.iter().all(|b| Arc::ptr_eq(b, &banks[0])));
        assert_eq!(cache.builds(), 1);
    }
}

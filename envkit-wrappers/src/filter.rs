//! Digital IIR filtering with Butterworth coefficient design.
//!
//! Coefficients come from the classic derivation: analog Butterworth
//! prototype poles, frequency pre-warp, low-pass/band-pass transform, then
//! the bilinear transform to the z-domain. Coefficients are normalized so
//! the leading denominator coefficient is 1.
use anyhow::Result;
use envkit_core::error::EnvkitError;
use std::collections::VecDeque;

/// Whether a filter passes the low band or a band between two cutoffs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterType {
    /// Passes frequencies below `highcut`.
    LowPass,
    /// Passes frequencies between `lowcut` and `highcut`.
    BandPass,
}

/// A direct-form IIR filter with one coefficient set per signal dimension.
///
/// Keeps two fixed-length rolling histories per dimension (recent inputs and
/// recent outputs, most recent first) of length `order` for low-pass and
/// `2 * order` for band-pass.
pub struct IirFilter {
    b: Vec<Vec<f64>>,
    a: Vec<Vec<f64>>,
    hist_len: usize,
    xhist: Vec<VecDeque<f64>>,
    yhist: Vec<VecDeque<f64>>,
}

impl IirFilter {
    fn new(
        b: Vec<Vec<f64>>,
        a: Vec<Vec<f64>>,
        order: usize,
        filter_type: FilterType,
    ) -> Result<Self> {
        let dim = a.len();
        let hist_len = match filter_type {
            FilterType::LowPass => order,
            FilterType::BandPass => 2 * order,
        };
        let mut b = b;
        let mut a = a;
        for i in 0..dim {
            debug_assert_eq!(b[i].len(), hist_len + 1);
            debug_assert_eq!(a[i].len(), hist_len + 1);
            let a0 = a[i][0];
            for v in b[i].iter_mut() {
                *v /= a0;
            }
            for v in a[i].iter_mut() {
                *v /= a0;
            }
        }
        let mut filter = Self {
            b,
            a,
            hist_len,
            xhist: vec![VecDeque::with_capacity(hist_len); dim],
            yhist: vec![VecDeque::with_capacity(hist_len); dim],
        };
        filter.reset();
        Ok(filter)
    }

    /// Number of signal dimensions.
    pub fn dim(&self) -> usize {
        self.a.len()
    }

    /// Clears both histories to zero.
    pub fn reset(&mut self) {
        for i in 0..self.dim() {
            self.xhist[i].clear();
            self.yhist[i].clear();
            for _ in 0..self.hist_len {
                self.xhist[i].push_back(0.0);
                self.yhist[i].push_back(0.0);
            }
        }
    }

    /// Overwrites every history slot with the given signal, giving the
    /// filter a steady-state start instead of a zero-input transient.
    pub fn seed_history(&mut self, x: &[f64]) {
        assert_eq!(x.len(), self.dim());
        for i in 0..self.dim() {
            for slot in self.xhist[i].iter_mut() {
                *slot = x[i];
            }
            for slot in self.yhist[i].iter_mut() {
                *slot = x[i];
            }
        }
    }

    /// Filters one sample per dimension and rolls the histories forward.
    pub fn apply(&mut self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.dim());
        let mut y = Vec::with_capacity(self.dim());
        for i in 0..self.dim() {
            let b = &self.b[i];
            let a = &self.a[i];
            let mut acc = b[0] * x[i];
            for (j, &xj) in self.xhist[i].iter().enumerate() {
                acc += b[j + 1] * xj;
            }
            for (j, &yj) in self.yhist[i].iter().enumerate() {
                acc -= a[j + 1] * yj;
            }
            y.push(acc);
        }
        for i in 0..self.dim() {
            self.xhist[i].push_front(x[i]);
            self.xhist[i].pop_back();
            self.yhist[i].push_front(y[i]);
            self.yhist[i].pop_back();
        }
        y
    }

    /// Numerator coefficients of one dimension (leading denominator
    /// coefficient normalized to 1).
    pub fn numerator(&self, dim: usize) -> &[f64] {
        &self.b[dim]
    }

    /// Denominator coefficients of one dimension.
    pub fn denominator(&self, dim: usize) -> &[f64] {
        &self.a[dim]
    }
}

/// A Butterworth filter bank, one low-pass or band-pass design per signal
/// dimension.
///
/// All dimensions must agree on the type: every `lowcut` zero (low-pass) or
/// every `lowcut` positive (band-pass). Frequencies are in Hz and must stay
/// below the Nyquist frequency `sampling_rate / 2`.
pub struct ButterworthFilter;

impl ButterworthFilter {
    /// Designs the filter bank and returns the ready [`IirFilter`].
    pub fn design(
        lowcut: &[f64],
        highcut: &[f64],
        sampling_rate: f64,
        order: usize,
    ) -> Result<IirFilter> {
        if lowcut.len() != highcut.len() {
            return Err(EnvkitError::InvalidConfig(format!(
                "lowcut and highcut must have the same length, got {} and {}",
                lowcut.len(),
                highcut.len()
            ))
            .into());
        }
        if lowcut.is_empty() {
            return Err(
                EnvkitError::InvalidConfig("at least one dimension is required".into()).into(),
            );
        }
        if order < 1 {
            return Err(
                EnvkitError::InvalidConfig("filter order must be at least 1, got 0".into()).into(),
            );
        }
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(EnvkitError::InvalidConfig(format!(
                "sampling rate must be positive, got {}",
                sampling_rate
            ))
            .into());
        }
        if lowcut.iter().any(|&lo| lo < 0.0) {
            return Err(EnvkitError::InvalidConfig(format!(
                "lowcut frequencies must be non-negative, got {:?}",
                lowcut
            ))
            .into());
        }
        if highcut.iter().any(|&hi| hi <= 0.0) {
            return Err(EnvkitError::InvalidConfig(format!(
                "highcut frequencies must be strictly positive, got {:?}",
                highcut
            ))
            .into());
        }
        let any_zero = lowcut.iter().any(|&lo| lo == 0.0);
        let any_pos = lowcut.iter().any(|&lo| lo > 0.0);
        if any_zero && any_pos {
            return Err(EnvkitError::InvalidConfig(format!(
                "all dimensions must be either low-pass or band-pass, got lowcut {:?}",
                lowcut
            ))
            .into());
        }
        let filter_type = if any_pos {
            FilterType::BandPass
        } else {
            FilterType::LowPass
        };
        let nyquist = 0.5 * sampling_rate;
        let mut b_all = Vec::with_capacity(lowcut.len());
        let mut a_all = Vec::with_capacity(lowcut.len());
        for (&lo, &hi) in lowcut.iter().zip(highcut.iter()) {
            let lo_n = lo / nyquist;
            let hi_n = hi / nyquist;
            if hi_n >= 1.0 {
                return Err(EnvkitError::InvalidConfig(format!(
                    "highcut {} Hz is at or above the Nyquist frequency {} Hz",
                    hi, nyquist
                ))
                .into());
            }
            if filter_type == FilterType::BandPass && lo_n >= hi_n {
                return Err(EnvkitError::InvalidConfig(format!(
                    "lowcut {} Hz must be below highcut {} Hz",
                    lo, hi
                ))
                .into());
            }
            let (b, a) = match filter_type {
                FilterType::LowPass => butter_lowpass(hi_n, order),
                FilterType::BandPass => butter_bandpass(lo_n, hi_n, order),
            };
            b_all.push(b);
            a_all.push(a);
        }
        IirFilter::new(b_all, a_all, order, filter_type)
    }
}

// A minimal complex number, enough for pole arithmetic.
#[derive(Clone, Copy, Debug)]
struct Complex {
    re: f64,
    im: f64,
}

impl Complex {
    fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    fn real(re: f64) -> Self {
        Self { re, im: 0.0 }
    }

    fn add(self, o: Complex) -> Complex {
        Complex::new(self.re + o.re, self.im + o.im)
    }

    fn sub(self, o: Complex) -> Complex {
        Complex::new(self.re - o.re, self.im - o.im)
    }

    fn mul(self, o: Complex) -> Complex {
        Complex::new(
            self.re * o.re - self.im * o.im,
            self.re * o.im + self.im * o.re,
        )
    }

    fn div(self, o: Complex) -> Complex {
        let d = o.re * o.re + o.im * o.im;
        Complex::new(
            (self.re * o.re + self.im * o.im) / d,
            (self.im * o.re - self.re * o.im) / d,
        )
    }

    fn scale(self, s: f64) -> Complex {
        Complex::new(self.re * s, self.im * s)
    }

    fn sqrt(self) -> Complex {
        let r = (self.re * self.re + self.im * self.im).sqrt().sqrt();
        let theta = self.im.atan2(self.re) / 2.0;
        Complex::new(r * theta.cos(), r * theta.sin())
    }
}

/// Analog Butterworth prototype poles on the unit circle, left half-plane.
fn prototype_poles(order: usize) -> Vec<Complex> {
    let n = order as f64;
    (0..order)
        .map(|k| {
            let m = -n + 1.0 + 2.0 * k as f64;
            let theta = std::f64::consts::PI * m / (2.0 * n);
            // -exp(i * theta)
            Complex::new(-theta.cos(), -theta.sin())
        })
        .collect()
}

/// Polynomial coefficients (descending powers, monic) from roots.
fn poly(roots: &[Complex]) -> Vec<Complex> {
    let mut coeffs = vec![Complex::real(1.0)];
    for &r in roots {
        let mut next = vec![Complex::real(0.0); coeffs.len() + 1];
        for (i, &c) in coeffs.iter().enumerate() {
            next[i] = next[i].add(c);
            next[i + 1] = next[i + 1].sub(c.mul(r));
        }
        coeffs = next;
    }
    coeffs
}

fn product(values: &[Complex]) -> Complex {
    values
        .iter()
        .fold(Complex::real(1.0), |acc, &v| acc.mul(v))
}

/// Bilinear transform of an analog zero/pole/gain design with fs = 2.
fn bilinear(
    zeros: &[Complex],
    poles: &[Complex],
    gain: f64,
) -> (Vec<f64>, Vec<f64>) {
    let fs2 = Complex::real(4.0); // 2 * fs with fs = 2
    let z_digital: Vec<Complex> = zeros
        .iter()
        .map(|&z| fs2.add(z).div(fs2.sub(z)))
        .collect();
    let p_digital: Vec<Complex> = poles
        .iter()
        .map(|&p| fs2.add(p).div(fs2.sub(p)))
        .collect();
    let num: Vec<Complex> = zeros.iter().map(|&z| fs2.sub(z)).collect();
    let den: Vec<Complex> = poles.iter().map(|&p| fs2.sub(p)).collect();
    let k_digital = gain * product(&num).div(product(&den)).re;

    // Degree-match by padding digital zeros at z = -1.
    let mut z_digital = z_digital;
    while z_digital.len() < p_digital.len() {
        z_digital.push(Complex::real(-1.0));
    }

    let b: Vec<f64> = poly(&z_digital).iter().map(|c| c.re * k_digital).collect();
    let a: Vec<f64> = poly(&p_digital).iter().map(|c| c.re).collect();
    (b, a)
}

/// Digital Butterworth low-pass for a cutoff normalized to the Nyquist
/// frequency (`0 < wn < 1`).
fn butter_lowpass(wn: f64, order: usize) -> (Vec<f64>, Vec<f64>) {
    let fs = 2.0;
    let warped = 2.0 * fs * (std::f64::consts::PI * wn / fs).tan();
    let poles: Vec<Complex> = prototype_poles(order)
        .into_iter()
        .map(|p| p.scale(warped))
        .collect();
    let gain = warped.powi(order as i32);
    bilinear(&[], &poles, gain)
}

/// Digital Butterworth band-pass for cutoffs normalized to the Nyquist
/// frequency (`0 < wlo < whi < 1`).
fn butter_bandpass(wlo: f64, whi: f64, order: usize) -> (Vec<f64>, Vec<f64>) {
    let fs = 2.0;
    let warped_lo = 2.0 * fs * (std::f64::consts::PI * wlo / fs).tan();
    let warped_hi = 2.0 * fs * (std::f64::consts::PI * whi / fs).tan();
    let bw = warped_hi - warped_lo;
    let wo = (warped_lo * warped_hi).sqrt();
    let mut poles = Vec::with_capacity(2 * order);
    for p in prototype_poles(order) {
        let s = p.scale(bw / 2.0);
        let d = s.mul(s).sub(Complex::real(wo * wo)).sqrt();
        poles.push(s.add(d));
        poles.push(s.sub(d));
    }
    // The low-pass prototype's transform leaves `order` zeros at s = 0.
    let zeros = vec![Complex::real(0.0); order];
    let gain = bw.powi(order as i32);
    bilinear(&zeros, &poles, gain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dc_gain(b: &[f64], a: &[f64]) -> f64 {
        b.iter().sum::<f64>() / a.iter().sum::<f64>()
    }

    #[test]
    fn test_first_order_lowpass_matches_closed_form() {
        // For order 1 the bilinear design has a closed form:
        // with w = tan(pi * wn / 2), b = w/(1+w) * [1, 1], a = [1, (w-1)/(w+1)].
        let wn = 0.25;
        let (b, a) = butter_lowpass(wn, 1);
        let w = (std::f64::consts::PI * wn / 2.0).tan();
        assert!((b[0] - w / (1.0 + w)).abs() < 1e-12);
        assert!((b[1] - w / (1.0 + w)).abs() < 1e-12);
        assert!((a[0] - 1.0).abs() < 1e-12);
        assert!((a[1] - (w - 1.0) / (w + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_half_band_first_order_is_averager() {
        let (b, a) = butter_lowpass(0.5, 1);
        assert!((b[0] - 0.5).abs() < 1e-12);
        assert!((b[1] - 0.5).abs() < 1e-12);
        assert!((a[0] - 1.0).abs() < 1e-12);
        assert!(a[1].abs() < 1e-12);
    }

    #[test]
    fn test_lowpass_has_unity_dc_gain() {
        for &order in &[1usize, 2, 3, 4] {
            for &wn in &[0.05, 0.2, 0.6] {
                let (b, a) = butter_lowpass(wn, order);
                assert_eq!(b.len(), order + 1);
                assert_eq!(a.len(), order + 1);
                assert!(
                    (dc_gain(&b, &a) - 1.0).abs() < 1e-9,
                    "order={} wn={}",
                    order,
                    wn
                );
            }
        }
    }

    #[test]
    fn test_bandpass_has_zero_dc_gain() {
        for &order in &[1usize, 2, 3] {
            let (b, a) = butter_bandpass(0.1, 0.4, order);
            assert_eq!(b.len(), 2 * order + 1);
            assert_eq!(a.len(), 2 * order + 1);
            assert!(dc_gain(&b, &a).abs() < 1e-9, "order={}", order);
        }
    }

    #[test]
    fn test_lowpass_poles_are_stable() {
        // All denominator roots must be inside the unit circle; check via
        // the filter settling to the input level on a constant signal.
        let mut filter = ButterworthFilter::design(&[0.0], &[4.0], 100.0, 2).unwrap();
        let mut y = 0.0;
        for _ in 0..5000 {
            y = filter.apply(&[1.0])[0];
        }
        assert!((y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_seeded_history_holds_steady_state() {
        let mut filter = ButterworthFilter::design(&[0.0, 0.0], &[4.0, 4.0], 100.0, 2).unwrap();
        filter.seed_history(&[0.25, -0.5]);
        let y = filter.apply(&[0.25, -0.5]);
        assert!((y[0] - 0.25).abs() < 1e-12);
        assert!((y[1] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_design_validations() {
        // Mismatched lengths.
        assert!(ButterworthFilter::design(&[0.0], &[4.0, 4.0], 100.0, 2).is_err());
        // Mixed low-pass and band-pass dimensions.
        assert!(ButterworthFilter::design(&[0.0, 1.0], &[4.0, 4.0], 100.0, 2).is_err());
        // Non-positive highcut.
        assert!(ButterworthFilter::design(&[0.0], &[0.0], 100.0, 2).is_err());
        // Negative lowcut.
        assert!(ButterworthFilter::design(&[-1.0], &[4.0], 100.0, 2).is_err());
        // Highcut at the Nyquist frequency.
        assert!(ButterworthFilter::design(&[0.0], &[50.0], 100.0, 2).is_err());
        // Band edges out of order.
        assert!(ButterworthFilter::design(&[5.0], &[4.0], 100.0, 2).is_err());
        // Zero order.
        assert!(ButterworthFilter::design(&[0.0], &[4.0], 100.0, 0).is_err());
    }

    #[test]
    fn test_smooths_an_alternating_signal() {
        let mut filter = ButterworthFilter::design(&[0.0], &[2.0], 100.0, 2).unwrap();
        let mut peak = 0.0f64;
        for i in 0..200 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            let y = filter.apply(&[x])[0];
            if i > 50 {
                peak = peak.max(y.abs());
            }
        }
        // A 50 Hz square wave through a 2 Hz low-pass all but vanishes.
        assert!(peak < 0.05, "peak={}", peak);
    }
}

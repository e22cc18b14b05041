//! Closed-form Black-Scholes pricing for European index options.
//!
//! No dividend yield: the index level enters undiscounted, and the rate is
//! the quote's put-call parity implied rate.
//!
//! d1 = (ln(S/K) + (r + sigma^2/2) T) / (sigma sqrt(T))
//! Call: S N(d1) - K e^(-rT) N(d1 - sigma sqrt(T)), delta N(d1)
//! Put:  K e^(-rT) N(-d1 + sigma sqrt(T)) - S N(-d1), delta -N(-d1)

use std::f64::consts::{PI, SQRT_2};

use statrs::function::erf::erfc;

use crate::data::OptionType;

/// Black-Scholes calculator at a fixed interest rate.
#[derive(Debug, Clone, Copy)]
pub struct BlackScholes {
    /// Continuously compounded interest rate
    pub rate: f64,
}

impl BlackScholes {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }

    /// Calculate d1 parameter.
    pub fn d1(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        let numerator = (spot / strike).ln() + (self.rate + 0.5 * vol * vol) * time;
        numerator / (vol * time.sqrt())
    }

    /// Calculate d2 parameter.
    pub fn d2(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        self.d1(spot, strike, time, vol) - vol * time.sqrt()
    }

    /// Standard normal CDF.
    pub fn norm_cdf(x: f64) -> f64 {
        0.5 * erfc(-x / SQRT_2)
    }

    /// Standard normal PDF.
    fn norm_pdf(x: f64) -> f64 {
        (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
    }

    pub fn call_price(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        let d1 = self.d1(spot, strike, time, vol);
        let d2 = self.d2(spot, strike, time, vol);

        spot * Self::norm_cdf(d1) - strike * (-self.rate * time).exp() * Self::norm_cdf(d2)
    }

    pub fn put_price(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        let d1 = self.d1(spot, strike, time, vol);
        let d2 = self.d2(spot, strike, time, vol);

        strike * (-self.rate * time).exp() * Self::norm_cdf(-d2) - spot * Self::norm_cdf(-d1)
    }

    /// Calculate option price based on type.
    pub fn price(&self, spot: f64, strike: f64, time: f64, vol: f64, opt_type: OptionType) -> f64 {
        match opt_type {
            OptionType::Call => self.call_price(spot, strike, time, vol),
            OptionType::Put => self.put_price(spot, strike, time, vol),
        }
    }

    pub fn delta(&self, spot: f64, strike: f64, time: f64, vol: f64, opt_type: OptionType) -> f64 {
        let d1 = self.d1(spot, strike, time, vol);

        match opt_type {
            OptionType::Call => Self::norm_cdf(d1),
            OptionType::Put => -Self::norm_cdf(-d1),
        }
    }

    /// dPrice/dVol, unscaled.
    pub fn vega(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        spot * Self::norm_pdf(self.d1(spot, strike, time, vol)) * time.sqrt()
    }

    /// Volatility that reproduces `price`.
    ///
    /// Newton-Raphson from the Brenner-Subrahmanyam guess, falling back to
    /// bisection on [`IV_FLOOR`, `IV_CEILING`] when Newton stalls. `None`
    /// when the price lies outside the range the model can reach there.
    pub fn implied_vol(
        &self,
        spot: f64,
        strike: f64,
        time: f64,
        price: f64,
        opt_type: OptionType,
    ) -> Option<f64> {
        if !(time > 0.0 && price > 0.0 && spot > 0.0 && strike > 0.0) || !price.is_finite() {
            return None;
        }

        let low_price = self.price(spot, strike, time, IV_FLOOR, opt_type);
        let high_price = self.price(spot, strike, time, IV_CEILING, opt_type);
        if !(price >= low_price && price <= high_price) {
            return None;
        }

        let mut vol = ((price / spot) * (2.0 * PI / time).sqrt()).clamp(0.01, 5.0);
        for _ in 0..NEWTON_ITERATIONS {
            let diff = self.price(spot, strike, time, vol, opt_type) - price;
            if diff.abs() < IV_PRICE_TOLERANCE {
                return Some(vol);
            }

            let vega = self.vega(spot, strike, time, vol);
            if vega.abs() < 1e-10 {
                break;
            }
            vol = (vol - diff / vega).clamp(IV_FLOOR, IV_CEILING);
        }

        let (mut lo, mut hi) = (IV_FLOOR, IV_CEILING);
        for _ in 0..BISECTION_ITERATIONS {
            let mid = 0.5 * (lo + hi);
            let diff = self.price(spot, strike, time, mid, opt_type) - price;
            if diff.abs() < IV_PRICE_TOLERANCE || hi - lo < 1e-14 {
                return Some(mid);
            }
            if diff < 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Some(0.5 * (lo + hi))
    }
}

pub const IV_FLOOR: f64 = 1e-4;
pub const IV_CEILING: f64 = 5.0;
const IV_PRICE_TOLERANCE: f64 = 1e-10;
const NEWTON_ITERATIONS: usize = 100;
const BISECTION_ITERATIONS: usize = 200;

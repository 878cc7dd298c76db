//! Dilution-adjusted Black-Scholes valuation of employee options.
//!
//! Exercising employee options creates new shares, so the option is written
//! on a dilution-adjusted share price rather than the market price. The
//! total value feeds the engine's `has_employee_options` payload and is
//! deducted from equity before the per-share division.
//!
//! All arithmetic stays in `rust_decimal::Decimal`; the transcendental
//! pieces are computed with decade-reduced series and Newton iterations
//! rather than `f64`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::GinzuError;
use crate::types::{Money, Rate, Years};
use crate::GinzuResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for the employee-option valuator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeOptionInput {
    pub stock_price: Money,
    /// Average strike of the outstanding options.
    pub strike_price: Money,
    /// Average remaining maturity in years.
    pub time_to_expiry: Years,
    pub risk_free_rate: Rate,
    /// Annualized volatility of the stock.
    pub volatility: Rate,
    pub options_outstanding: Decimal,
    pub shares_outstanding: Decimal,
}

/// Output of the employee-option valuator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeOptionOutput {
    /// Share price adjusted for the dilution of exercise.
    pub adjusted_share_price: Money,
    pub d1: Decimal,
    pub d2: Decimal,
    pub value_per_option: Money,
    /// Deducted from equity in the valuation bridge.
    pub total_value: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Value the outstanding employee options with a dilution-adjusted
/// Black-Scholes call.
///
/// Degenerate inputs (no maturity left, zero volatility, non-positive
/// adjusted price or strike, or no options at all) value to zero rather
/// than failing: an expired or worthless grant is a legitimate state.
pub fn value_employee_options(
    input: &EmployeeOptionInput,
) -> GinzuResult<EmployeeOptionOutput> {
    if input.shares_outstanding <= Decimal::ZERO {
        return Err(GinzuError::InvalidInput {
            field: "shares_outstanding".into(),
            reason: "must be positive".into(),
        });
    }
    if input.options_outstanding < Decimal::ZERO {
        return Err(GinzuError::InvalidInput {
            field: "options_outstanding".into(),
            reason: "must be non-negative".into(),
        });
    }

    let s = input.stock_price;
    let k = input.strike_price;
    let t = input.time_to_expiry;
    let n_opt = input.options_outstanding;
    let n_sh = input.shares_outstanding;

    // S* = (S * shares + K * options) / (shares + options)
    let adjusted = (s * n_sh + k * n_opt) / (n_sh + n_opt);

    let degenerate = t <= Decimal::ZERO
        || input.volatility <= Decimal::ZERO
        || adjusted <= Decimal::ZERO
        || k <= Decimal::ZERO
        || n_opt.is_zero();
    if degenerate {
        return Ok(worthless(adjusted));
    }

    let sigma = input.volatility;
    let r = input.risk_free_rate;

    let log_moneyness = match dec_ln(adjusted / k) {
        Some(v) => v,
        // adjusted > 0 and k > 0 are already established
        None => return Ok(worthless(adjusted)),
    };

    let sigma_sqrt_t = sigma * dec_sqrt(t);
    let d1 = (log_moneyness + (r + sigma * sigma / dec!(2)) * t) / sigma_sqrt_t;
    let d2 = d1 - sigma_sqrt_t;

    let call = adjusted * normal_cdf(d1) - k * dec_exp(-r * t) * normal_cdf(d2);
    let value_per_option = call.max(Decimal::ZERO);

    Ok(EmployeeOptionOutput {
        adjusted_share_price: adjusted,
        d1,
        d2,
        value_per_option,
        total_value: value_per_option * n_opt,
    })
}

fn worthless(adjusted_share_price: Money) -> EmployeeOptionOutput {
    EmployeeOptionOutput {
        adjusted_share_price,
        d1: Decimal::ZERO,
        d2: Decimal::ZERO,
        value_per_option: Decimal::ZERO,
        total_value: Decimal::ZERO,
    }
}

// ---------------------------------------------------------------------------
// Decimal math (no f64)
// ---------------------------------------------------------------------------

const EULER_E: Decimal = dec!(2.7182818284590452353602874714);
const LN_10: Decimal = dec!(2.3025850929940456840179914547);
const SQRT_10: Decimal = dec!(3.1622776601683793319988935444);
const INV_SQRT_TWO_PI: Decimal = dec!(0.3989422804014326779399460599);
const SERIES_EPSILON: Decimal = dec!(0.0000000000000000000000000001);

/// exp(x) split as e^whole * e^frac: the integer part by square-and-multiply
/// on e, the fractional part by a Maclaurin sum on (-1, 1).
fn dec_exp(x: Decimal) -> Decimal {
    let whole = x.trunc();
    let frac = x - whole;

    let mut sum = Decimal::ONE;
    let mut term = Decimal::ONE;
    for j in 1u32..=24 {
        term = term * frac / Decimal::from(j);
        sum += term;
        if term.abs() < SERIES_EPSILON {
            break;
        }
    }

    let n = whole.abs().to_u32().unwrap_or(u32::MAX);
    if n > 65 {
        // e^66 no longer fits a 96-bit mantissa; e^-66 is below its
        // resolution.
        return if whole < Decimal::ZERO {
            Decimal::ZERO
        } else {
            Decimal::MAX
        };
    }
    if whole < Decimal::ZERO {
        sum / e_to_the(n)
    } else {
        sum * e_to_the(n)
    }
}

/// Integer power of e by square-and-multiply.
fn e_to_the(mut n: u32) -> Decimal {
    let mut result = Decimal::ONE;
    let mut base = EULER_E;
    while n > 0 {
        if n & 1 == 1 {
            result *= base;
        }
        n >>= 1;
        if n > 0 {
            base *= base;
        }
    }
    result
}

/// Babylonian square root: a decade seed puts the first guess within one
/// order of magnitude of the root, then Newton steps run to fixed-point.
fn dec_sqrt(x: Decimal) -> Decimal {
    if x <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let mut guess = Decimal::ONE;
    while let Some(square) = guess.checked_mul(guess) {
        if square >= x {
            break;
        }
        guess *= dec!(10);
    }
    for _ in 0..50 {
        let next = (guess + x / guess) / dec!(2);
        if (next - guess).abs() < SERIES_EPSILON {
            return next;
        }
        guess = next;
    }
    guess
}

/// ln(x) = decades * ln(10) + 2 * artanh((m - 1) / (m + 1)), with m reduced
/// into [1/sqrt(10), sqrt(10)) so the odd-power series converges quickly.
/// Returns None for non-positive arguments.
fn dec_ln(x: Decimal) -> Option<Decimal> {
    if x <= Decimal::ZERO {
        return None;
    }
    let mut m = x;
    let mut decades = Decimal::ZERO;
    while m >= SQRT_10 {
        m /= dec!(10);
        decades += Decimal::ONE;
    }
    while m < SQRT_10 / dec!(10) {
        m *= dec!(10);
        decades -= Decimal::ONE;
    }

    let z = (m - Decimal::ONE) / (m + Decimal::ONE);
    let z_squared = z * z;
    let mut power = z;
    let mut sum = z;
    for j in 1u32..=60 {
        power *= z_squared;
        let term = power / Decimal::from(2 * j + 1);
        sum += term;
        if term.abs() < SERIES_EPSILON {
            break;
        }
    }
    Some(decades * LN_10 + dec!(2) * sum)
}

/// Standard normal PDF.
fn normal_pdf(x: Decimal) -> Decimal {
    INV_SQRT_TWO_PI * dec_exp(-(x * x) / dec!(2))
}

/// Standard normal CDF via the Maclaurin expansion
/// Phi(x) = 1/2 + phi(x) * (x + x^3/3 + x^5/(3*5) + x^7/(3*5*7) + ...).
/// Past |x| = 6 the tail mass is below 1e-9 and the result clamps.
fn normal_cdf(x: Decimal) -> Decimal {
    if x > dec!(6) {
        return Decimal::ONE;
    }
    if x < dec!(-6) {
        return Decimal::ZERO;
    }
    let x_squared = x * x;
    let mut odd = Decimal::ONE;
    let mut term = x;
    let mut sum = x;
    for _ in 0..120 {
        odd += dec!(2);
        term = term * x_squared / odd;
        sum += term;
        if term.abs() < SERIES_EPSILON {
            break;
        }
    }
    dec!(0.5) + normal_pdf(x) * sum
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

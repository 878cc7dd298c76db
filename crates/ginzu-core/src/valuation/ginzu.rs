//! FCFF "Simple Ginzu" projection engine.
//!
//! Ten explicit forecast years plus a stable-growth terminal year, folded
//! into an intrinsic per-share equity value. The pipeline runs in a fixed
//! step order so that every series is reproducible against the reference
//! model: stable-state resolution, growth path, revenues, margin
//! convergence, tax convergence, NOL shielding, lagged reinvestment, FCFF,
//! cost-of-capital path with cumulative discounting, terminal value,
//! failure-probability blend, and the equity bridge.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::GinzuError;
use crate::types::{with_metadata, ComputationOutput, Money, Multiple, ProjectionPeriod, Rate};
use crate::GinzuResult;

use super::inputs::{canonicalize, DistressProceedsTie, GinzuInput, ResolvedAssumptions};

const FORECAST_YEARS: usize = 10;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One row of the valuation tableau. Eleven rows are emitted: years 1..10
/// and a terminal row.
///
/// Terminal-row conventions: growth is the perpetual rate, cost of capital
/// is the stable WACC, sales-to-capital carries the Year 6-10 ratio, the
/// discount factor is the Year-10 cumulative factor, and `pv_fcff` holds the
/// present value of the terminal value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GinzuYearProjection {
    pub period: ProjectionPeriod,
    pub revenue_growth: Rate,
    pub revenues: Money,
    pub operating_margin: Rate,
    pub ebit: Money,
    pub tax_rate: Rate,
    pub ebit_after_tax: Money,
    /// NOL carryforward remaining after this year's shielding.
    pub nol_balance: Money,
    pub sales_to_capital: Multiple,
    pub reinvestment: Money,
    pub fcff: Money,
    pub cost_of_capital: Rate,
    pub discount_factor: Rate,
    pub pv_fcff: Money,
}

/// Output of the Ginzu valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GinzuOutput {
    /// Year-by-year tableau: years 1..10 plus the terminal row.
    pub projections: Vec<GinzuYearProjection>,

    /// Reported base EBIT plus lease and R&D adjustments.
    pub ebit_base_adjusted: Money,

    /// Sum of present values of the ten explicit FCFFs.
    pub pv_10y: Money,
    /// Undiscounted terminal value at the end of Year 10.
    pub terminal_value: Money,
    /// Terminal value discounted at the Year-10 cumulative factor.
    pub pv_terminal_value: Money,
    /// `pv_10y + pv_terminal_value`.
    pub pv_sum: Money,
    /// PV of terminal value as a share of `pv_sum`.
    pub terminal_value_pct: Rate,

    /// `pv_sum` blended with distress proceeds at the failure probability.
    pub value_of_operating_assets: Money,
    /// Operating assets less debt and minorities, plus cash and
    /// non-operating assets.
    pub value_of_equity: Money,
    /// Equity less the value of employee options.
    pub value_of_equity_common: Money,
    pub estimated_value_per_share: Money,
    /// Market price divided by estimated value per share.
    pub price_to_value: Rate,

    // Stable-state parameters actually used.
    pub perpetual_growth_rate: Rate,
    pub stable_wacc: Rate,
    pub stable_roc: Rate,
    pub terminal_tax_rate: Rate,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the full Simple Ginzu valuation.
pub fn calculate_ginzu(input: &GinzuInput) -> GinzuResult<ComputationOutput<GinzuOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let resolved = canonicalize(input)?;
    let g = resolved.perpetual_growth;
    let stable_wacc = resolved.stable_wacc;

    // The Gordon denominator must be positive before any projection work.
    if stable_wacc <= g {
        return Err(GinzuError::InvalidStableState(format!(
            "stable WACC ({stable_wacc}) must exceed the perpetual growth rate ({g})"
        )));
    }

    // Cost-of-capital path and cumulative discount factors depend only on
    // scalars; the Year-10 value doubles as the default stable ROC.
    let wacc_path = build_wacc_path(input.wacc_initial, stable_wacc);
    let discount_factors = cumulative_discount_factors(&wacc_path)?;
    let stable_roc = resolved
        .stable_roc_override
        .unwrap_or(wacc_path[FORECAST_YEARS - 1]);

    // Growth path and revenues.
    let growth = build_growth_path(input.rev_growth_y1, input.rev_cagr_y2_5, g);
    let revenues = compound_revenues(input.revenues_base, &growth)?;
    let revenue_terminal = revenues[FORECAST_YEARS - 1] * (Decimal::ONE + g);

    // Margin convergence and EBIT.
    let margins = build_margin_path(
        input.margin_y1,
        input.margin_target,
        input.margin_convergence_year,
    );
    let margin_terminal = margins[FORECAST_YEARS - 1];
    let ebit_base_adjusted = input.ebit_reported_base + resolved.ebit_base_adjustment;
    let ebit: Vec<Money> = revenues
        .iter()
        .zip(margins.iter())
        .map(|(&r, &m)| r * m)
        .collect();
    let ebit_terminal = revenue_terminal * margin_terminal;

    // Tax convergence and NOL shielding.
    let tax_path = build_tax_path(input.tax_rate_effective, resolved.terminal_tax_rate);
    let (after_tax, nol_balances) = shield_with_nol(&ebit, &tax_path, resolved.nol_start);
    let after_tax_terminal = ebit_terminal * (Decimal::ONE - resolved.terminal_tax_rate);

    // Reinvestment with lag.
    let reinvestment = build_reinvestment(
        input,
        &revenues,
        g,
        resolved.reinvestment_lag_years,
    )?;
    let reinvestment_terminal = if g > Decimal::ZERO {
        if stable_roc <= Decimal::ZERO {
            return Err(GinzuError::InvalidStableState(format!(
                "stable return on capital ({stable_roc}) must be positive when the perpetual growth rate ({g}) is positive"
            )));
        }
        after_tax_terminal * g / stable_roc
    } else {
        Decimal::ZERO
    };

    // FCFF and present values.
    let fcff: Vec<Money> = after_tax
        .iter()
        .zip(reinvestment.iter())
        .map(|(&at, &ri)| at - ri)
        .collect();
    let fcff_terminal = after_tax_terminal - reinvestment_terminal;

    let pv_fcff: Vec<Money> = fcff
        .iter()
        .zip(discount_factors.iter())
        .map(|(&f, &df)| f * df)
        .collect();
    let pv_10y: Money = pv_fcff.iter().copied().sum();

    // Terminal value (stable_wacc > g already established).
    let terminal_value = fcff_terminal / (stable_wacc - g);
    let df_year10 = discount_factors[FORECAST_YEARS - 1];
    let pv_terminal_value = terminal_value * df_year10;
    let pv_sum = pv_10y + pv_terminal_value;

    // Failure-probability blend.
    let p_fail = resolved.probability_of_failure;
    let proceeds_base = match resolved.distress_tie {
        DistressProceedsTie::BookCapital => input.book_equity + input.book_debt,
        DistressProceedsTie::DcfValue => pv_sum,
    };
    let distress_proceeds = proceeds_base * resolved.distress_proceeds_percent;
    let value_of_operating_assets =
        pv_sum * (Decimal::ONE - p_fail) + distress_proceeds * p_fail;

    // Equity bridge.
    let debt_bridge = input.book_debt + resolved.lease_debt;
    let cash_adjusted = input.cash - resolved.trapped_cash_penalty;
    let value_of_equity = value_of_operating_assets - debt_bridge - input.minority_interests
        + cash_adjusted
        + input.non_operating_assets;
    let value_of_equity_common = value_of_equity - resolved.options_value;
    let estimated_value_per_share = value_of_equity_common / input.shares_outstanding;

    let terminal_value_pct = if pv_sum.is_zero() {
        Decimal::ZERO
    } else {
        pv_terminal_value / pv_sum
    };
    let price_to_value = if estimated_value_per_share.is_zero() {
        Decimal::ZERO
    } else {
        input.stock_price / estimated_value_per_share
    };

    collect_warnings(
        &mut warnings,
        input,
        stable_wacc,
        g,
        terminal_value_pct,
        &fcff,
    );

    let projections = assemble_rows(
        input,
        &resolved,
        &growth,
        &revenues,
        &margins,
        &ebit,
        &tax_path,
        &after_tax,
        &nol_balances,
        &reinvestment,
        &fcff,
        &wacc_path,
        &discount_factors,
        &pv_fcff,
        TerminalRow {
            g,
            revenue: revenue_terminal,
            margin: margin_terminal,
            ebit: ebit_terminal,
            after_tax: after_tax_terminal,
            reinvestment: reinvestment_terminal,
            fcff: fcff_terminal,
            stable_wacc,
            discount_factor: df_year10,
            pv: pv_terminal_value,
        },
    );

    let output = GinzuOutput {
        projections,
        ebit_base_adjusted,
        pv_10y,
        terminal_value,
        pv_terminal_value,
        pv_sum,
        terminal_value_pct,
        value_of_operating_assets,
        value_of_equity,
        value_of_equity_common,
        estimated_value_per_share,
        price_to_value,
        perpetual_growth_rate: g,
        stable_wacc,
        stable_roc,
        terminal_tax_rate: resolved.terminal_tax_rate,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "FCFF Simple Ginzu (10-year, stable-growth terminal)",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Path builders
// ---------------------------------------------------------------------------

/// Five-step linear walk from `from` toward `to`. The final step lands
/// exactly on `to`.
fn converge_linear(from: Rate, to: Rate) -> Vec<Rate> {
    let step = (from - to) / dec!(5);
    (1..=5u32)
        .map(|k| if k == 5 { to } else { from - step * Decimal::from(k) })
        .collect()
}

/// Year 1 at the near-term rate, years 2..5 at the CAGR, years 6..10
/// converging linearly to the perpetual rate.
fn build_growth_path(growth_y1: Rate, cagr_y2_5: Rate, perpetual: Rate) -> Vec<Rate> {
    let mut path = Vec::with_capacity(FORECAST_YEARS);
    path.push(growth_y1);
    path.extend(std::iter::repeat(cagr_y2_5).take(4));
    path.extend(converge_linear(cagr_y2_5, perpetual));
    path
}

/// Year 1 carries the input margin; years 2..10 walk linearly to the target,
/// reaching it exactly at the convergence year and holding it after.
fn build_margin_path(margin_y1: Rate, target: Rate, convergence_year: u32) -> Vec<Rate> {
    let cy = Decimal::from(convergence_year);
    let mut path = Vec::with_capacity(FORECAST_YEARS);
    path.push(margin_y1);
    for t in 2..=FORECAST_YEARS as u32 {
        if t > convergence_year {
            path.push(target);
        } else {
            path.push(target - ((target - margin_y1) / cy) * (cy - Decimal::from(t)));
        }
    }
    path
}

/// Effective rate for years 1..5, converging linearly to the terminal rate
/// by Year 10.
fn build_tax_path(effective: Rate, terminal: Rate) -> Vec<Rate> {
    let mut path = Vec::with_capacity(FORECAST_YEARS);
    path.extend(std::iter::repeat(effective).take(5));
    path.extend(converge_linear(effective, terminal));
    path
}

/// Initial WACC for years 1..5, converging linearly to the stable WACC by
/// Year 10.
fn build_wacc_path(initial: Rate, stable: Rate) -> Vec<Rate> {
    let mut path = Vec::with_capacity(FORECAST_YEARS);
    path.extend(std::iter::repeat(initial).take(5));
    path.extend(converge_linear(initial, stable));
    path
}

fn compound_revenues(base: Money, growth: &[Rate]) -> GinzuResult<Vec<Money>> {
    let mut revenues = Vec::with_capacity(growth.len());
    let mut prev = base;
    for (t, rate) in growth.iter().enumerate() {
        let next = prev
            .checked_mul(Decimal::ONE + rate)
            .ok_or_else(|| GinzuError::NumericOverflow {
                context: format!("revenue compounding at year {}", t + 1),
            })?;
        revenues.push(next);
        prev = next;
    }
    Ok(revenues)
}

fn cumulative_discount_factors(wacc_path: &[Rate]) -> GinzuResult<Vec<Rate>> {
    let mut factors = Vec::with_capacity(wacc_path.len());
    let mut df = Decimal::ONE;
    for (t, wacc) in wacc_path.iter().enumerate() {
        let denom = Decimal::ONE + wacc;
        if denom <= Decimal::ZERO {
            return Err(GinzuError::InvalidInput {
                field: "wacc".into(),
                reason: format!("cost of capital must exceed -100% in year {}", t + 1),
            });
        }
        df /= denom;
        factors.push(df);
    }
    Ok(factors)
}

// ---------------------------------------------------------------------------
// NOL shielding and reinvestment
// ---------------------------------------------------------------------------

/// After-tax EBIT with a running NOL balance. Losses grow the balance,
/// profits are shielded until it is exhausted, and only the excess over the
/// balance is taxed.
fn shield_with_nol(ebit: &[Money], tax_path: &[Rate], nol_start: Money) -> (Vec<Money>, Vec<Money>) {
    let mut after_tax = Vec::with_capacity(ebit.len());
    let mut balances = Vec::with_capacity(ebit.len());
    let mut nol = nol_start;
    for (&e, &tax_rate) in ebit.iter().zip(tax_path.iter()) {
        if e <= Decimal::ZERO {
            after_tax.push(e);
            nol -= e;
        } else if e < nol {
            after_tax.push(e);
            nol -= e;
        } else {
            let taxes = (e - nol) * tax_rate;
            after_tax.push(e - taxes);
            nol = Decimal::ZERO;
        }
        balances.push(nol);
    }
    (after_tax, balances)
}

/// Forecast revenue at index `n` on the extended grid: 0 is the base year,
/// 1..10 are the explicit years, and beyond Year 10 revenues compound at the
/// perpetual rate.
fn revenue_at(n: u32, base: Money, revenues: &[Money], g: Rate) -> GinzuResult<Money> {
    if n == 0 {
        return Ok(base);
    }
    if (n as usize) <= revenues.len() {
        return Ok(revenues[n as usize - 1]);
    }
    let mut value = revenues[FORECAST_YEARS - 1];
    for _ in 0..(n - FORECAST_YEARS as u32) {
        value = value
            .checked_mul(Decimal::ONE + g)
            .ok_or_else(|| GinzuError::NumericOverflow {
                context: format!("revenue extrapolation to year {n}"),
            })?;
    }
    Ok(value)
}

/// Reinvestment for each explicit year: the revenue delta `lag` years ahead
/// divided by that year's sales-to-capital ratio.
fn build_reinvestment(
    input: &GinzuInput,
    revenues: &[Money],
    g: Rate,
    lag: u32,
) -> GinzuResult<Vec<Money>> {
    let mut reinvestment = Vec::with_capacity(FORECAST_YEARS);
    for t in 1..=FORECAST_YEARS as u32 {
        let ahead = revenue_at(t + lag, input.revenues_base, revenues, g)?;
        let behind = revenue_at(t + lag - 1, input.revenues_base, revenues, g)?;
        let s2c = sales_to_capital_for_year(input, t);
        reinvestment.push((ahead - behind) / s2c);
    }
    Ok(reinvestment)
}

fn sales_to_capital_for_year(input: &GinzuInput, year: u32) -> Multiple {
    if year <= 5 {
        input.sales_to_capital_1_5
    } else {
        input.sales_to_capital_6_10
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

struct TerminalRow {
    g: Rate,
    revenue: Money,
    margin: Rate,
    ebit: Money,
    after_tax: Money,
    reinvestment: Money,
    fcff: Money,
    stable_wacc: Rate,
    discount_factor: Rate,
    pv: Money,
}

#[allow(clippy::too_many_arguments)]
fn assemble_rows(
    input: &GinzuInput,
    resolved: &ResolvedAssumptions,
    growth: &[Rate],
    revenues: &[Money],
    margins: &[Rate],
    ebit: &[Money],
    tax_path: &[Rate],
    after_tax: &[Money],
    nol_balances: &[Money],
    reinvestment: &[Money],
    fcff: &[Money],
    wacc_path: &[Rate],
    discount_factors: &[Rate],
    pv_fcff: &[Money],
    terminal: TerminalRow,
) -> Vec<GinzuYearProjection> {
    let mut rows = Vec::with_capacity(FORECAST_YEARS + 1);
    for t in 0..FORECAST_YEARS {
        let year = (t + 1) as u32;
        rows.push(GinzuYearProjection {
            period: ProjectionPeriod {
                year: year as i32,
                label: format!("Year {year}"),
                is_terminal: false,
            },
            revenue_growth: growth[t],
            revenues: revenues[t],
            operating_margin: margins[t],
            ebit: ebit[t],
            tax_rate: tax_path[t],
            ebit_after_tax: after_tax[t],
            nol_balance: nol_balances[t],
            sales_to_capital: sales_to_capital_for_year(input, year),
            reinvestment: reinvestment[t],
            fcff: fcff[t],
            cost_of_capital: wacc_path[t],
            discount_factor: discount_factors[t],
            pv_fcff: pv_fcff[t],
        });
    }
    rows.push(GinzuYearProjection {
        period: ProjectionPeriod {
            year: (FORECAST_YEARS + 1) as i32,
            label: "Terminal year".to_string(),
            is_terminal: true,
        },
        revenue_growth: terminal.g,
        revenues: terminal.revenue,
        operating_margin: terminal.margin,
        ebit: terminal.ebit,
        tax_rate: resolved.terminal_tax_rate,
        ebit_after_tax: terminal.after_tax,
        nol_balance: nol_balances[FORECAST_YEARS - 1],
        sales_to_capital: input.sales_to_capital_6_10,
        reinvestment: terminal.reinvestment,
        fcff: terminal.fcff,
        cost_of_capital: terminal.stable_wacc,
        discount_factor: terminal.discount_factor,
        pv_fcff: terminal.pv,
    });
    rows
}

fn collect_warnings(
    warnings: &mut Vec<String>,
    input: &GinzuInput,
    stable_wacc: Rate,
    g: Rate,
    terminal_value_pct: Rate,
    fcff: &[Money],
) {
    if terminal_value_pct > dec!(0.85) {
        warnings.push(format!(
            "Terminal value represents {:.1}% of operating value; the valuation is dominated by stable-state assumptions",
            terminal_value_pct * dec!(100)
        ));
    }
    if input.wacc_initial > dec!(0.20) {
        warnings.push(format!(
            "Initial cost of capital of {} exceeds 20%; appropriate for high-risk situations only",
            input.wacc_initial
        ));
    }
    if stable_wacc - g < dec!(0.005) {
        warnings.push(format!(
            "Spread between stable WACC ({stable_wacc}) and perpetual growth ({g}) is under 50bp; terminal value is extremely sensitive"
        ));
    }
    if fcff.iter().all(|f| *f < Decimal::ZERO) {
        warnings.push(
            "Free cash flow to the firm is negative in every explicit year; value rests entirely on the terminal year".to_string(),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

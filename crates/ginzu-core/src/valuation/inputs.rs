//! Assumption bundle and canonicalizer for the Ginzu engine.
//!
//! The input record models every override as a `bool` switch paired with an
//! optional payload, mirroring the reference model's assumption sheet. The
//! canonicalizer validates sign/range constraints, resolves the sparse
//! switches into a fully populated [`ResolvedAssumptions`], and is the only
//! place a switch is ever read. The projection pipeline downstream sees no
//! `Option` and no conditional re-lookups.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::GinzuError;
use crate::types::{Money, Multiple, Rate};
use crate::GinzuResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What distress proceeds are tied to when a failure probability is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistressProceedsTie {
    /// Fraction of book capital (book equity + book debt).
    #[serde(rename = "B")]
    BookCapital,
    /// Fraction of the DCF value (PV of explicit flows + terminal value).
    #[serde(rename = "V")]
    DcfValue,
}

/// Full assumption bundle for one valuation run.
///
/// All currency amounts must share one unit (e.g. millions) and
/// `shares_outstanding` the same scale, so the per-share output is in
/// currency per share. No unit metadata is validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GinzuInput {
    // --- Base-year snapshot ---
    pub revenues_base: Money,
    pub ebit_reported_base: Money,
    pub book_equity: Money,
    pub book_debt: Money,
    pub cash: Money,
    pub non_operating_assets: Money,
    pub minority_interests: Money,
    pub shares_outstanding: Decimal,
    pub stock_price: Money,

    // --- Growth drivers ---
    pub rev_growth_y1: Rate,
    pub rev_cagr_y2_5: Rate,

    // --- Margin drivers ---
    pub margin_y1: Rate,
    pub margin_target: Rate,
    /// Year (1..=10) by which the operating margin reaches the target.
    pub margin_convergence_year: u32,

    // --- Reinvestment ---
    pub sales_to_capital_1_5: Multiple,
    pub sales_to_capital_6_10: Multiple,

    // --- Rates ---
    pub riskfree_rate_now: Rate,
    pub wacc_initial: Rate,
    pub tax_rate_effective: Rate,
    pub tax_rate_marginal: Rate,
    /// Used only when the stable WACC is not overridden.
    pub mature_market_erp: Rate,

    // --- Override switches + payloads ---
    #[serde(default)]
    pub override_perpetual_growth: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perpetual_growth_rate: Option<Rate>,

    #[serde(default)]
    pub override_riskfree_after_year10: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub riskfree_rate_after10: Option<Rate>,

    #[serde(default)]
    pub override_stable_wacc: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_wacc: Option<Rate>,

    #[serde(default)]
    pub override_stable_roc: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_roc: Option<Rate>,

    /// Terminal tax rate stays at the effective rate instead of converging
    /// to the marginal rate.
    #[serde(default)]
    pub override_tax_rate_convergence: bool,

    #[serde(default)]
    pub override_failure_probability: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_of_failure: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distress_proceeds_tie: Option<DistressProceedsTie>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distress_proceeds_percent: Option<Rate>,

    #[serde(default)]
    pub override_reinvestment_lag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reinvestment_lag_years: Option<u32>,

    #[serde(default)]
    pub has_nol_carryforward: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nol_start_year1: Option<Money>,

    #[serde(default)]
    pub override_trapped_cash: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trapped_cash_amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trapped_cash_foreign_tax_rate: Option<Rate>,

    // --- Optional-module payloads ---
    #[serde(default)]
    pub capitalize_rnd: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rnd_asset: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rnd_ebit_adjustment: Option<Money>,

    #[serde(default)]
    pub capitalize_operating_leases: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_debt: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_ebit_adjustment: Option<Money>,

    #[serde(default)]
    pub has_employee_options: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_value: Option<Money>,
}

/// Fully resolved assumptions consumed by the projection pipeline.
///
/// Every switch has been folded into a concrete value; payloads of disabled
/// switches are gone. `stable_roc_override` stays optional because the
/// default is the Year-10 cost of capital, which only exists once the WACC
/// path has been built.
#[derive(Debug, Clone)]
pub struct ResolvedAssumptions {
    pub perpetual_growth: Rate,
    pub stable_wacc: Rate,
    pub terminal_tax_rate: Rate,
    pub stable_roc_override: Option<Rate>,
    pub probability_of_failure: Rate,
    pub distress_tie: DistressProceedsTie,
    pub distress_proceeds_percent: Rate,
    pub reinvestment_lag_years: u32,
    pub nol_start: Money,
    /// Subtracted from cash in the equity bridge. May be negative when the
    /// foreign rate exceeds the marginal rate; it flows through unclamped.
    pub trapped_cash_penalty: Money,
    pub lease_debt: Money,
    /// Lease and R&D adjustments combined, added to reported base EBIT.
    pub ebit_base_adjustment: Money,
    pub options_value: Money,
}

// ---------------------------------------------------------------------------
// Canonicalizer
// ---------------------------------------------------------------------------

/// Validate the raw bundle and resolve switches into concrete assumptions.
pub fn canonicalize(input: &GinzuInput) -> GinzuResult<ResolvedAssumptions> {
    validate_snapshot(input)?;
    validate_drivers(input)?;

    // Perpetual growth: explicit pin, else the riskfree rate that applies
    // after Year 10, else today's riskfree rate. Independent of the stable
    // WACC override.
    let riskfree_after10 = require_payload(
        input.override_riskfree_after_year10,
        input.riskfree_rate_after10,
        "override_riskfree_after_year10",
        "riskfree_rate_after10",
    )?;
    let riskfree_for_stable = riskfree_after10.unwrap_or(input.riskfree_rate_now);

    let perpetual_growth = match require_payload(
        input.override_perpetual_growth,
        input.perpetual_growth_rate,
        "override_perpetual_growth",
        "perpetual_growth_rate",
    )? {
        Some(g) => g,
        None => riskfree_for_stable,
    };

    let stable_wacc = match require_payload(
        input.override_stable_wacc,
        input.stable_wacc,
        "override_stable_wacc",
        "stable_wacc",
    )? {
        Some(w) => w,
        None => riskfree_for_stable + input.mature_market_erp,
    };

    let terminal_tax_rate = if input.override_tax_rate_convergence {
        input.tax_rate_effective
    } else {
        input.tax_rate_marginal
    };

    let stable_roc_override = require_payload(
        input.override_stable_roc,
        input.stable_roc,
        "override_stable_roc",
        "stable_roc",
    )?;

    // Failure probability needs all three payloads.
    let (probability_of_failure, distress_tie, distress_proceeds_percent) =
        if input.override_failure_probability {
            let p = require_payload(
                true,
                input.probability_of_failure,
                "override_failure_probability",
                "probability_of_failure",
            )?
            .unwrap_or_default();
            let tie = require_payload(
                true,
                input.distress_proceeds_tie,
                "override_failure_probability",
                "distress_proceeds_tie",
            )?
            .unwrap_or(DistressProceedsTie::BookCapital);
            let pct = require_payload(
                true,
                input.distress_proceeds_percent,
                "override_failure_probability",
                "distress_proceeds_percent",
            )?
            .unwrap_or_default();
            check_fraction(p, "probability_of_failure")?;
            check_fraction(pct, "distress_proceeds_percent")?;
            (p, tie, pct)
        } else {
            (Decimal::ZERO, DistressProceedsTie::BookCapital, Decimal::ZERO)
        };

    let reinvestment_lag_years = match require_payload(
        input.override_reinvestment_lag,
        input.reinvestment_lag_years,
        "override_reinvestment_lag",
        "reinvestment_lag_years",
    )? {
        Some(lag) if lag > 3 => {
            return Err(GinzuError::InvalidInput {
                field: "reinvestment_lag_years".into(),
                reason: format!("must be between 0 and 3, got {lag}"),
            });
        }
        Some(lag) => lag,
        None => 1,
    };

    let nol_start = match require_payload(
        input.has_nol_carryforward,
        input.nol_start_year1,
        "has_nol_carryforward",
        "nol_start_year1",
    )? {
        Some(nol) if nol < Decimal::ZERO => {
            return Err(GinzuError::InvalidInput {
                field: "nol_start_year1".into(),
                reason: "must be non-negative".into(),
            });
        }
        Some(nol) => nol,
        None => Decimal::ZERO,
    };

    let trapped_cash_penalty = if input.override_trapped_cash {
        let amount = require_payload(
            true,
            input.trapped_cash_amount,
            "override_trapped_cash",
            "trapped_cash_amount",
        )?
        .unwrap_or_default();
        let foreign_rate = require_payload(
            true,
            input.trapped_cash_foreign_tax_rate,
            "override_trapped_cash",
            "trapped_cash_foreign_tax_rate",
        )?
        .unwrap_or_default();
        if amount < Decimal::ZERO {
            return Err(GinzuError::InvalidInput {
                field: "trapped_cash_amount".into(),
                reason: "must be non-negative".into(),
            });
        }
        check_fraction(foreign_rate, "trapped_cash_foreign_tax_rate")?;
        amount * (input.tax_rate_marginal - foreign_rate)
    } else {
        Decimal::ZERO
    };

    let (lease_debt, lease_ebit_adjustment) = if input.capitalize_operating_leases {
        let debt = require_payload(
            true,
            input.lease_debt,
            "capitalize_operating_leases",
            "lease_debt",
        )?
        .unwrap_or_default();
        let adj = require_payload(
            true,
            input.lease_ebit_adjustment,
            "capitalize_operating_leases",
            "lease_ebit_adjustment",
        )?
        .unwrap_or_default();
        if debt < Decimal::ZERO {
            return Err(GinzuError::InvalidInput {
                field: "lease_debt".into(),
                reason: "must be non-negative".into(),
            });
        }
        (debt, adj)
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    let rnd_ebit_adjustment = if input.capitalize_rnd {
        let asset = require_payload(true, input.rnd_asset, "capitalize_rnd", "rnd_asset")?
            .unwrap_or_default();
        let adj = require_payload(
            true,
            input.rnd_ebit_adjustment,
            "capitalize_rnd",
            "rnd_ebit_adjustment",
        )?
        .unwrap_or_default();
        if asset < Decimal::ZERO {
            return Err(GinzuError::InvalidInput {
                field: "rnd_asset".into(),
                reason: "must be non-negative".into(),
            });
        }
        adj
    } else {
        Decimal::ZERO
    };

    let options_value = match require_payload(
        input.has_employee_options,
        input.options_value,
        "has_employee_options",
        "options_value",
    )? {
        Some(v) if v < Decimal::ZERO => {
            return Err(GinzuError::InvalidInput {
                field: "options_value".into(),
                reason: "must be non-negative".into(),
            });
        }
        Some(v) => v,
        None => Decimal::ZERO,
    };

    Ok(ResolvedAssumptions {
        perpetual_growth,
        stable_wacc,
        terminal_tax_rate,
        stable_roc_override,
        probability_of_failure,
        distress_tie,
        distress_proceeds_percent,
        reinvestment_lag_years,
        nol_start,
        trapped_cash_penalty,
        lease_debt,
        ebit_base_adjustment: lease_ebit_adjustment + rnd_ebit_adjustment,
        options_value,
    })
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn validate_snapshot(input: &GinzuInput) -> GinzuResult<()> {
    if input.revenues_base < Decimal::ZERO {
        return Err(GinzuError::InvalidInput {
            field: "revenues_base".into(),
            reason: "must be non-negative".into(),
        });
    }
    if input.shares_outstanding <= Decimal::ZERO {
        return Err(GinzuError::InvalidInput {
            field: "shares_outstanding".into(),
            reason: "must be positive".into(),
        });
    }
    if input.stock_price <= Decimal::ZERO {
        return Err(GinzuError::InvalidInput {
            field: "stock_price".into(),
            reason: "must be positive".into(),
        });
    }
    for (field, value) in [
        ("book_debt", input.book_debt),
        ("cash", input.cash),
        ("non_operating_assets", input.non_operating_assets),
        ("minority_interests", input.minority_interests),
    ] {
        if value < Decimal::ZERO {
            return Err(GinzuError::InvalidInput {
                field: field.into(),
                reason: "must be non-negative".into(),
            });
        }
    }
    Ok(())
}

fn validate_drivers(input: &GinzuInput) -> GinzuResult<()> {
    if input.margin_convergence_year < 1 || input.margin_convergence_year > 10 {
        return Err(GinzuError::InvalidInput {
            field: "margin_convergence_year".into(),
            reason: format!(
                "must be between 1 and 10, got {}",
                input.margin_convergence_year
            ),
        });
    }
    if input.sales_to_capital_1_5 <= Decimal::ZERO {
        return Err(GinzuError::InvalidInput {
            field: "sales_to_capital_1_5".into(),
            reason: "must be positive".into(),
        });
    }
    if input.sales_to_capital_6_10 <= Decimal::ZERO {
        return Err(GinzuError::InvalidInput {
            field: "sales_to_capital_6_10".into(),
            reason: "must be positive".into(),
        });
    }
    check_fraction(input.tax_rate_effective, "tax_rate_effective")?;
    check_fraction(input.tax_rate_marginal, "tax_rate_marginal")?;
    Ok(())
}

fn check_fraction(value: Rate, field: &str) -> GinzuResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(GinzuError::InvalidInput {
            field: field.into(),
            reason: format!("must be between 0 and 1, got {value}"),
        });
    }
    Ok(())
}

/// Resolve a switch/payload pair. Switch on with no payload is an error;
/// switch off ignores the payload entirely.
fn require_payload<T>(
    switch_on: bool,
    payload: Option<T>,
    switch: &str,
    field: &str,
) -> GinzuResult<Option<T>> {
    match (switch_on, payload) {
        (true, None) => Err(GinzuError::InconsistentOverride {
            switch: switch.into(),
            missing: field.into(),
        }),
        (true, some) => Ok(some),
        (false, _) => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

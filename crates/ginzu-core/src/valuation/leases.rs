//! Operating-lease converter.
//!
//! Operating-lease commitments are debt in substance: the converter
//! discounts the committed payments at the pre-tax cost of debt to get a
//! debt value, charges straight-line depreciation on the implied asset, and
//! adjusts operating income by the difference between the current lease
//! expense and that depreciation. The outputs feed the engine's
//! `capitalize_operating_leases` payload.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::GinzuError;
use crate::types::{Money, Rate};
use crate::GinzuResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for the operating-lease converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConverterInput {
    /// Operating-lease expense in the current year.
    pub current_year_expense: Money,
    /// Explicit commitments for the next years, in order (up to 10).
    pub commitments: Vec<Money>,
    /// Aggregate commitment disclosed beyond the explicit years.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_commitment: Option<Money>,
    /// Years the bulk commitment is spread over, evenly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_spread_years: Option<u32>,
    /// Pre-tax cost of debt used as the discount rate.
    pub cost_of_debt: Rate,
}

/// One committed payment and its present value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseYearDetail {
    pub year: u32,
    pub commitment: Money,
    pub present_value: Money,
}

/// Output of the operating-lease converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConverterOutput {
    /// PV of all commitments at the pre-tax cost of debt.
    pub lease_debt: Money,
    /// Straight-line depreciation on the implied leased asset.
    pub depreciation: Money,
    /// Current expense less depreciation; added to reported EBIT.
    pub ebit_adjustment: Money,
    pub schedule: Vec<LeaseYearDetail>,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Convert lease commitments into debt and an EBIT adjustment.
pub fn convert_operating_leases(
    input: &LeaseConverterInput,
) -> GinzuResult<LeaseConverterOutput> {
    validate(input)?;

    let one_plus_kd = Decimal::ONE + input.cost_of_debt;
    let mut schedule = Vec::new();
    let mut lease_debt = Decimal::ZERO;
    let mut discount = Decimal::ONE;
    let mut year = 0u32;

    for &commitment in &input.commitments {
        year += 1;
        discount /= one_plus_kd;
        let pv = commitment * discount;
        lease_debt += pv;
        schedule.push(LeaseYearDetail {
            year,
            commitment,
            present_value: pv,
        });
    }

    if let Some(bulk) = input.bulk_commitment {
        // Validated to be present alongside the bulk amount.
        let spread = input.bulk_spread_years.unwrap_or(1);
        let annual = bulk / Decimal::from(spread);
        for _ in 0..spread {
            year += 1;
            discount /= one_plus_kd;
            let pv = annual * discount;
            lease_debt += pv;
            schedule.push(LeaseYearDetail {
                year,
                commitment: annual,
                present_value: pv,
            });
        }
    }

    let term = Decimal::from(year);
    let depreciation = lease_debt / term;

    Ok(LeaseConverterOutput {
        lease_debt,
        depreciation,
        ebit_adjustment: input.current_year_expense - depreciation,
        schedule,
    })
}

fn validate(input: &LeaseConverterInput) -> GinzuResult<()> {
    if input.cost_of_debt <= Decimal::ZERO {
        return Err(GinzuError::InvalidInput {
            field: "cost_of_debt".into(),
            reason: "must be positive".into(),
        });
    }
    if input.current_year_expense < Decimal::ZERO {
        return Err(GinzuError::InvalidInput {
            field: "current_year_expense".into(),
            reason: "must be non-negative".into(),
        });
    }
    if input.commitments.is_empty() && input.bulk_commitment.is_none() {
        return Err(GinzuError::InvalidInput {
            field: "commitments".into(),
            reason: "at least one commitment or a bulk amount is required".into(),
        });
    }
    if input.commitments.len() > 10 {
        return Err(GinzuError::InvalidInput {
            field: "commitments".into(),
            reason: format!(
                "at most 10 explicit years supported, got {}",
                input.commitments.len()
            ),
        });
    }
    if let Some(c) = input.commitments.iter().find(|c| **c < Decimal::ZERO) {
        return Err(GinzuError::InvalidInput {
            field: "commitments".into(),
            reason: format!("commitments must be non-negative, got {c}"),
        });
    }
    match (input.bulk_commitment, input.bulk_spread_years) {
        (Some(bulk), _) if bulk < Decimal::ZERO => Err(GinzuError::InvalidInput {
            field: "bulk_commitment".into(),
            reason: "must be non-negative".into(),
        }),
        (Some(_), None) => Err(GinzuError::InvalidInput {
            field: "bulk_spread_years".into(),
            reason: "required when a bulk commitment is given".into(),
        }),
        (Some(_), Some(0)) => Err(GinzuError::InvalidInput {
            field: "bulk_spread_years".into(),
            reason: "must be at least 1".into(),
        }),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

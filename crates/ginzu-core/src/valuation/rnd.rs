//! R&D capitalization converter.
//!
//! Research expense is an investment in future growth, not an operating
//! cost. This converter re-capitalizes it: past expenses are amortized
//! straight-line over an assumed life, the unamortized remainder becomes a
//! research asset, and reported EBIT is adjusted by the difference between
//! this year's expense and this year's amortization charge. The outputs feed
//! the engine's `capitalize_rnd` payload.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::GinzuError;
use crate::types::{Money, Rate};
use crate::GinzuResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for the R&D capitalization converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RndInput {
    /// Amortization life in years (1..=10).
    pub amortization_years: u32,
    /// Current-year R&D expense.
    pub current_expense: Money,
    /// Prior-year expenses, newest first. May be shorter than the life;
    /// missing years count as zero.
    pub prior_expenses: Vec<Money>,
}

/// One vintage of R&D spending. Age 0 is the current year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RndVintage {
    pub age: u32,
    pub expense: Money,
    pub unamortized_fraction: Rate,
    pub unamortized_value: Money,
    /// This year's amortization charge from the vintage.
    pub amortization: Money,
}

/// Output of the R&D capitalization converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RndOutput {
    /// Unamortized value of current and past R&D spending.
    pub rnd_asset: Money,
    /// Total amortization charged against this year.
    pub current_amortization: Money,
    /// Current expense less current amortization; added to reported EBIT.
    pub ebit_adjustment: Money,
    pub schedule: Vec<RndVintage>,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Capitalize an R&D expense history with straight-line amortization.
pub fn capitalize_rnd(input: &RndInput) -> GinzuResult<RndOutput> {
    validate(input)?;

    let n = input.amortization_years;
    let life = Decimal::from(n);

    let mut schedule = Vec::with_capacity(n as usize + 1);
    schedule.push(RndVintage {
        age: 0,
        expense: input.current_expense,
        unamortized_fraction: Decimal::ONE,
        unamortized_value: input.current_expense,
        amortization: Decimal::ZERO,
    });

    let mut rnd_asset = input.current_expense;
    let mut current_amortization = Decimal::ZERO;

    for k in 1..=n {
        let expense = input
            .prior_expenses
            .get(k as usize - 1)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let fraction = Decimal::from(n - k) / life;
        let unamortized_value = expense * fraction;
        let amortization = expense / life;

        rnd_asset += unamortized_value;
        current_amortization += amortization;

        schedule.push(RndVintage {
            age: k,
            expense,
            unamortized_fraction: fraction,
            unamortized_value,
            amortization,
        });
    }

    Ok(RndOutput {
        rnd_asset,
        current_amortization,
        ebit_adjustment: input.current_expense - current_amortization,
        schedule,
    })
}

fn validate(input: &RndInput) -> GinzuResult<()> {
    if input.amortization_years < 1 || input.amortization_years > 10 {
        return Err(GinzuError::InvalidInput {
            field: "amortization_years".into(),
            reason: format!("must be between 1 and 10, got {}", input.amortization_years),
        });
    }
    if input.current_expense < Decimal::ZERO {
        return Err(GinzuError::InvalidInput {
            field: "current_expense".into(),
            reason: "must be non-negative".into(),
        });
    }
    if input.prior_expenses.len() > input.amortization_years as usize {
        return Err(GinzuError::InvalidInput {
            field: "prior_expenses".into(),
            reason: format!(
                "history of {} years exceeds the amortization life of {}",
                input.prior_expenses.len(),
                input.amortization_years
            ),
        });
    }
    if let Some(e) = input.prior_expenses.iter().find(|e| **e < Decimal::ZERO) {
        return Err(GinzuError::InvalidInput {
            field: "prior_expenses".into(),
            reason: format!("expenses must be non-negative, got {e}"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

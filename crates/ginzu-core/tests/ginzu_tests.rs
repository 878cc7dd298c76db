use ginzu_core::valuation::ginzu::{calculate_ginzu, GinzuOutput};
use ginzu_core::valuation::inputs::{DistressProceedsTie, GinzuInput};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Fixtures
// ===========================================================================

/// Large online retailer, FY2023 base year, currency in millions.
fn baseline_input() -> GinzuInput {
    GinzuInput {
        revenues_base: dec!(574785),
        ebit_reported_base: dec!(36852),
        book_equity: dec!(201875),
        book_debt: dec!(161574),
        cash: dec!(86780),
        non_operating_assets: dec!(2954),
        minority_interests: dec!(0),
        shares_outstanding: dec!(10492),
        stock_price: dec!(169),
        rev_growth_y1: dec!(0.12),
        rev_cagr_y2_5: dec!(0.12),
        margin_y1: dec!(0.1133),
        margin_target: dec!(0.14),
        margin_convergence_year: 5,
        sales_to_capital_1_5: dec!(1.5),
        sales_to_capital_6_10: dec!(1.5),
        riskfree_rate_now: dec!(0.0408),
        wacc_initial: dec!(0.086),
        tax_rate_effective: dec!(0.19),
        tax_rate_marginal: dec!(0.25),
        mature_market_erp: dec!(0.046),
        override_perpetual_growth: false,
        perpetual_growth_rate: None,
        override_riskfree_after_year10: false,
        riskfree_rate_after10: None,
        override_stable_wacc: false,
        stable_wacc: None,
        override_stable_roc: false,
        stable_roc: None,
        override_tax_rate_convergence: false,
        override_failure_probability: false,
        probability_of_failure: None,
        distress_proceeds_tie: None,
        distress_proceeds_percent: None,
        override_reinvestment_lag: false,
        reinvestment_lag_years: None,
        has_nol_carryforward: false,
        nol_start_year1: None,
        override_trapped_cash: false,
        trapped_cash_amount: None,
        trapped_cash_foreign_tax_rate: None,
        capitalize_rnd: false,
        rnd_asset: None,
        rnd_ebit_adjustment: None,
        capitalize_operating_leases: false,
        lease_debt: None,
        lease_ebit_adjustment: None,
        has_employee_options: false,
        options_value: None,
    }
}

fn run(input: &GinzuInput) -> GinzuOutput {
    calculate_ginzu(input).unwrap().result
}

fn approx_eq(a: Decimal, b: Decimal, tol: Decimal) -> bool {
    (a - b).abs() < tol
}

/// Scale every currency amount (and optionally the share count) by `k`.
fn scale_input(input: &GinzuInput, k: Decimal, scale_shares: bool) -> GinzuInput {
    let mut scaled = input.clone();
    scaled.revenues_base *= k;
    scaled.ebit_reported_base *= k;
    scaled.book_equity *= k;
    scaled.book_debt *= k;
    scaled.cash *= k;
    scaled.non_operating_assets *= k;
    scaled.minority_interests *= k;
    if let Some(v) = scaled.nol_start_year1.as_mut() {
        *v *= k;
    }
    if let Some(v) = scaled.rnd_asset.as_mut() {
        *v *= k;
    }
    if let Some(v) = scaled.rnd_ebit_adjustment.as_mut() {
        *v *= k;
    }
    if let Some(v) = scaled.lease_debt.as_mut() {
        *v *= k;
    }
    if let Some(v) = scaled.lease_ebit_adjustment.as_mut() {
        *v *= k;
    }
    if let Some(v) = scaled.options_value.as_mut() {
        *v *= k;
    }
    if let Some(v) = scaled.trapped_cash_amount.as_mut() {
        *v *= k;
    }
    if scale_shares {
        scaled.shares_outstanding *= k;
    }
    scaled
}

// ===========================================================================
// Scenario 1: baseline
// ===========================================================================

#[test]
fn test_baseline_per_share_band() {
    let out = run(&baseline_input());
    // Parity anchor against the reference model.
    assert!(
        out.estimated_value_per_share > dec!(98.0)
            && out.estimated_value_per_share < dec!(98.1),
        "per-share value {} outside the reference band",
        out.estimated_value_per_share
    );
    assert!(out.pv_sum > dec!(1_100_000) && out.pv_sum < dec!(1_101_000));
}

#[test]
fn test_baseline_universal_invariants() {
    let out = run(&baseline_input());
    let rows = &out.projections;

    // Revenue ratio matches growth within 1e-9 relative error.
    let mut prev = dec!(574785);
    for row in &rows[..10] {
        let ratio = row.revenues / prev - Decimal::ONE;
        assert!(
            approx_eq(ratio, row.revenue_growth, dec!(0.000000001)),
            "year {} growth mismatch: {ratio} vs {}",
            row.period.year,
            row.revenue_growth
        );
        prev = row.revenues;
    }

    // Margin hits the target exactly at the convergence year.
    assert_eq!(rows[4].operating_margin, dec!(0.14));

    // Year-10 growth reaches the perpetual rate; years 6..9 lie strictly
    // between it and the Year-5 rate.
    assert_eq!(rows[9].revenue_growth, dec!(0.0408));
    for row in &rows[5..9] {
        assert!(row.revenue_growth < dec!(0.12));
        assert!(row.revenue_growth > dec!(0.0408));
    }

    // Tax interpolation lands exactly on the terminal rate.
    assert_eq!(rows[9].tax_rate, dec!(0.25));
    assert_eq!(out.terminal_tax_rate, dec!(0.25));

    // Discount factors strictly positive and strictly decreasing.
    for pair in rows[..10].windows(2) {
        assert!(pair[0].discount_factor > Decimal::ZERO);
        assert!(pair[1].discount_factor < pair[0].discount_factor);
    }

    // No failure probability: operating assets equal the PV sum.
    assert_eq!(out.value_of_operating_assets, out.pv_sum);

    // Per-share value times shares recovers common equity.
    assert!(approx_eq(
        out.estimated_value_per_share * dec!(10492),
        out.value_of_equity_common,
        dec!(0.000001)
    ));
}

// ===========================================================================
// Scenarios 2 and 3: growth and discount-rate stress
// ===========================================================================

#[test]
fn test_high_growth_raises_value() {
    let mut input = baseline_input();
    input.rev_growth_y1 = dec!(0.20);
    input.rev_cagr_y2_5 = dec!(0.15);
    let stressed = run(&input);
    let base = run(&baseline_input());
    assert!(
        stressed.estimated_value_per_share > base.estimated_value_per_share,
        "faster growth should raise value: {} <= {}",
        stressed.estimated_value_per_share,
        base.estimated_value_per_share
    );
}

#[test]
fn test_high_wacc_lowers_value() {
    let mut input = baseline_input();
    input.wacc_initial = dec!(0.10);
    let stressed = run(&input);
    let base = run(&baseline_input());
    assert!(
        stressed.estimated_value_per_share < base.estimated_value_per_share,
        "a higher discount rate should lower value: {} >= {}",
        stressed.estimated_value_per_share,
        base.estimated_value_per_share
    );
}

// ===========================================================================
// Scenario 4: failure probability
// ===========================================================================

#[test]
fn test_failure_probability_blends_with_book_proceeds() {
    let mut input = baseline_input();
    input.override_failure_probability = true;
    input.probability_of_failure = Some(dec!(0.10));
    input.distress_proceeds_tie = Some(DistressProceedsTie::BookCapital);
    input.distress_proceeds_percent = Some(dec!(0.50));
    let out = run(&input);
    let proceeds = dec!(0.50) * (dec!(201875) + dec!(161574));
    assert_eq!(
        out.value_of_operating_assets,
        out.pv_sum * dec!(0.90) + proceeds * dec!(0.10)
    );
    // Distress costs value relative to the going-concern case.
    let base = run(&baseline_input());
    assert!(out.estimated_value_per_share < base.estimated_value_per_share);
}

// ===========================================================================
// Scenario 5: perpetual growth pin
// ===========================================================================

#[test]
fn test_perpetual_growth_pin() {
    let mut input = baseline_input();
    input.override_perpetual_growth = true;
    input.perpetual_growth_rate = Some(dec!(0.03));
    let out = run(&input);
    let rows = &out.projections;

    assert_eq!(out.perpetual_growth_rate, dec!(0.03));
    assert_eq!(rows[9].revenue_growth, dec!(0.03));
    for row in &rows[5..9] {
        assert!(row.revenue_growth > dec!(0.03) && row.revenue_growth < dec!(0.12));
    }
    // Stable WACC still derives from the riskfree rate and the ERP; the
    // growth pin does not touch it.
    assert_eq!(out.stable_wacc, dec!(0.0868));
    let terminal = &rows[10];
    assert_eq!(
        out.terminal_value,
        terminal.fcff / (dec!(0.0868) - dec!(0.03))
    );
}

// ===========================================================================
// Scenario 6: NOL shielding
// ===========================================================================

#[test]
fn test_nol_shields_first_two_years() {
    let mut input = baseline_input();
    input.has_nol_carryforward = true;
    input.nol_start_year1 = Some(dec!(200000));
    let out = run(&input);
    let rows = &out.projections;

    // The carryforward exceeds the first two years of operating income.
    assert!(dec!(200000) > rows[0].ebit + rows[1].ebit);
    assert_eq!(rows[0].ebit_after_tax, rows[0].ebit);
    assert_eq!(rows[1].ebit_after_tax, rows[1].ebit);
    assert_eq!(
        rows[1].nol_balance,
        dec!(200000) - rows[0].ebit - rows[1].ebit
    );
    // Shielding early years adds value.
    let base = run(&baseline_input());
    assert!(out.estimated_value_per_share > base.estimated_value_per_share);
}

// ===========================================================================
// Properties
// ===========================================================================

#[test]
fn test_homogeneity_of_scale() {
    let base = run(&baseline_input());
    let scaled = run(&scale_input(&baseline_input(), dec!(1000), true));
    assert!(approx_eq(
        scaled.value_of_equity_common,
        base.value_of_equity_common * dec!(1000),
        dec!(0.01)
    ));
    assert!(approx_eq(
        scaled.estimated_value_per_share,
        base.estimated_value_per_share,
        dec!(0.0000001)
    ));
}

#[test]
fn test_stable_wacc_override_at_default_value_is_neutral() {
    let mut pinned = baseline_input();
    pinned.override_stable_wacc = true;
    // Same value the default derivation produces: riskfree + mature ERP.
    pinned.stable_wacc = Some(dec!(0.0868));
    let a = run(&baseline_input());
    let b = run(&pinned);
    assert_eq!(a.estimated_value_per_share, b.estimated_value_per_share);
    assert_eq!(a.pv_sum, b.pv_sum);
    assert_eq!(a.stable_wacc, b.stable_wacc);
}

#[test]
fn test_engine_is_idempotent() {
    let input = baseline_input();
    let a = run(&input);
    let b = run(&input);
    assert_eq!(a.estimated_value_per_share, b.estimated_value_per_share);
    assert_eq!(a.pv_10y, b.pv_10y);
    assert_eq!(a.pv_terminal_value, b.pv_terminal_value);
    for (ra, rb) in a.projections.iter().zip(b.projections.iter()) {
        assert_eq!(ra.revenues, rb.revenues);
        assert_eq!(ra.fcff, rb.fcff);
        assert_eq!(ra.pv_fcff, rb.pv_fcff);
    }
}

#[test]
fn test_price_to_value_flags_overvaluation() {
    let out = run(&baseline_input());
    // Market price 169 against ~98 of intrinsic value.
    assert!(out.price_to_value > Decimal::ONE);
    assert_eq!(
        out.price_to_value,
        dec!(169) / out.estimated_value_per_share
    );
}

#[test]
fn test_terminal_value_dominates_and_warns() {
    let result = calculate_ginzu(&baseline_input()).unwrap();
    let out = &result.result;
    assert_eq!(
        out.terminal_value_pct,
        out.pv_terminal_value / out.pv_sum
    );
    // ~72% of value sits in the terminal year here; no warning below 85%.
    assert!(out.terminal_value_pct < dec!(0.85));
    assert!(result.warnings.is_empty());
}

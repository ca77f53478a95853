//! Interest formulas.
//!
//! Every function takes an annual [`Rate`] (a fraction) and shares the
//! periods-per-year table on [`PaymentFrequency`]. Amounts are returned at full
//! working precision; round with [`Money::round_cents`] for presentation.

pub mod day_count;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};

use crate::decimal::{compound_factor, Money, Rate};
use crate::errors::{AmortizationError, Result};
use crate::types::PaymentFrequency;

pub use day_count::DayCountConvention;

fn validate_balance(balance: Money) -> Result<()> {
    if balance.is_negative() {
        log::warn!("rejected negative balance {}", balance);
        return Err(AmortizationError::InvalidArgument {
            message: format!("balance must not be negative, got {}", balance),
        });
    }
    Ok(())
}

fn validate_rate(rate: Rate) -> Result<()> {
    if rate.is_negative() {
        log::warn!("rejected negative rate {}", rate);
        return Err(AmortizationError::InvalidInterestRate { rate });
    }
    Ok(())
}

fn validate_years(years: Decimal) -> Result<()> {
    if years < Decimal::ZERO {
        return Err(AmortizationError::InvalidArgument {
            message: format!("time in years must not be negative, got {}", years),
        });
    }
    Ok(())
}

/// `base^exponent` for a non-negative exponent that may be fractional
fn pow_decimal(base: Decimal, exponent: Decimal) -> Result<Decimal> {
    if exponent.fract().is_zero() {
        let periods = exponent.to_u32().ok_or_else(|| AmortizationError::CalculationError {
            message: format!("exponent {} out of range", exponent),
        })?;
        return compound_factor(base - Decimal::ONE, periods);
    }

    base.checked_powd(exponent)
        .ok_or_else(|| AmortizationError::CalculationError {
            message: format!("{} raised to {} overflowed", base, exponent),
        })
}

/// interest for one period of `frequency` on `balance`
pub fn periodic_interest(balance: Money, annual_rate: Rate, frequency: PaymentFrequency) -> Result<Money> {
    validate_balance(balance)?;
    validate_rate(annual_rate)?;

    let periodic_rate = annual_rate.per_period(frequency.periods_per_year());
    Ok(Money::from_decimal(balance.as_decimal() * periodic_rate.as_decimal()))
}

/// simple interest `P * R * T`
pub fn simple_interest(principal: Money, annual_rate: Rate, years: Decimal) -> Result<Money> {
    validate_balance(principal)?;
    validate_rate(annual_rate)?;
    validate_years(years)?;

    Ok(Money::from_decimal(principal.as_decimal() * annual_rate.as_decimal() * years))
}

/// compound interest `P * (1 + r/n)^(n*t) - P`
pub fn compound_interest(
    principal: Money,
    annual_rate: Rate,
    compounding: PaymentFrequency,
    years: Decimal,
) -> Result<Money> {
    validate_balance(principal)?;
    validate_rate(annual_rate)?;
    validate_years(years)?;

    let n = Decimal::from(compounding.periods_per_year());
    let factor = pow_decimal(Decimal::ONE + annual_rate.as_decimal() / n, n * years)?;
    let final_amount = principal.as_decimal() * factor;

    Ok(Money::from_decimal(final_amount - principal.as_decimal()))
}

/// interest for a single day
pub fn daily_interest(balance: Money, annual_rate: Rate, convention: DayCountConvention) -> Result<Money> {
    validate_balance(balance)?;
    validate_rate(annual_rate)?;

    let daily_rate = annual_rate.per_period(convention.nominal_basis());
    Ok(Money::from_decimal(balance.as_decimal() * daily_rate.as_decimal()))
}

/// simple interest accrued on a constant balance between two dates
pub fn accrued_interest(
    balance: Money,
    annual_rate: Rate,
    start: NaiveDate,
    end: NaiveDate,
    convention: DayCountConvention,
) -> Result<Money> {
    validate_balance(balance)?;
    validate_rate(annual_rate)?;

    if end < start {
        return Err(AmortizationError::InvalidDate {
            message: format!("accrual end {} precedes start {}", end, start),
        });
    }

    let fraction = convention.year_fraction(start, end);
    Ok(Money::from_decimal(balance.as_decimal() * annual_rate.as_decimal() * fraction))
}

/// effective annual rate (APY) from a nominal rate: `(1 + nominal/n)^n - 1`
pub fn effective_annual_rate(nominal: Rate, compounding: PaymentFrequency) -> Result<Rate> {
    validate_rate(nominal)?;

    let periods = compounding.periods_per_year();
    let factor = compound_factor(nominal.as_decimal() / Decimal::from(periods), periods)?;
    Ok(Rate::from_decimal(factor - Decimal::ONE))
}

/// nominal rate compounded at `compounding` that yields the `effective` annual rate
pub fn nominal_rate(effective: Rate, compounding: PaymentFrequency) -> Result<Rate> {
    validate_rate(effective)?;

    if effective.is_zero() {
        return Ok(Rate::ZERO);
    }

    let n = Decimal::from(compounding.periods_per_year());
    let root = pow_decimal(Decimal::ONE + effective.as_decimal(), Decimal::ONE / n)?;
    Ok(Rate::from_decimal(n * (root - Decimal::ONE)))
}

/// convert a nominal rate between compounding frequencies keeping the effective rate
pub fn convert_rate(rate: Rate, from: PaymentFrequency, to: PaymentFrequency) -> Result<Rate> {
    if from == to {
        validate_rate(rate)?;
        return Ok(rate);
    }

    let effective = effective_annual_rate(rate, from)?;
    nominal_rate(effective, to)
}

/// rate per payment period when interest compounds at a different frequency:
/// `(1 + r/m)^(m/p) - 1`
pub fn equivalent_periodic_rate(
    annual_rate: Rate,
    compounding: PaymentFrequency,
    payment: PaymentFrequency,
) -> Result<Decimal> {
    validate_rate(annual_rate)?;

    if compounding == payment {
        return Ok(annual_rate.per_period(payment.periods_per_year()).as_decimal());
    }

    let m = Decimal::from(compounding.periods_per_year());
    let p = Decimal::from(payment.periods_per_year());
    let factor = pow_decimal(Decimal::ONE + annual_rate.as_decimal() / m, m / p)?;
    Ok(factor - Decimal::ONE)
}

/// interest between two dates compounding at `compounding`:
/// `B * ((1 + r/m)^(m * t) - 1)` with `t` the year fraction under `convention`
pub fn prorated_interest(
    balance: Money,
    annual_rate: Rate,
    compounding: PaymentFrequency,
    start: NaiveDate,
    end: NaiveDate,
    convention: DayCountConvention,
) -> Result<Money> {
    validate_balance(balance)?;
    validate_rate(annual_rate)?;

    let years = convention.year_fraction(start, end);
    if years.is_zero() || annual_rate.is_zero() {
        return Ok(Money::ZERO);
    }

    let m = Decimal::from(compounding.periods_per_year());
    let exponent = m * years;
    let factor = pow_decimal(Decimal::ONE + annual_rate.as_decimal() / m, exponent)?;
    Ok(Money::from_decimal(balance.as_decimal() * (factor - Decimal::ONE)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_periodic_interest() {
        let balance = Money::from_major(10_000);
        let rate = Rate::from_percentage(5);

        let monthly = periodic_interest(balance, rate, PaymentFrequency::Monthly).unwrap();
        assert_eq!(monthly.round_cents(), Money::from_str_exact("41.67").unwrap());

        let annual = periodic_interest(balance, rate, PaymentFrequency::Annual).unwrap();
        assert_eq!(annual, Money::from_major(500));

        let zero = periodic_interest(Money::ZERO, rate, PaymentFrequency::Weekly).unwrap();
        assert_eq!(zero, Money::ZERO);
    }

    #[test]
    fn test_simple_interest() {
        let interest = simple_interest(Money::from_major(10_000), Rate::from_percentage(5), dec!(3)).unwrap();
        assert_eq!(interest, Money::from_major(1_500));

        assert!(simple_interest(Money::from_major(10_000), Rate::from_percentage(5), dec!(-1)).is_err());
    }

    #[test]
    fn test_compound_interest() {
        let principal = Money::from_major(10_000);
        let rate = Rate::from_percentage(12);

        let monthly = compound_interest(principal, rate, PaymentFrequency::Monthly, Decimal::ONE).unwrap();
        assert_eq!(monthly.round_cents(), Money::from_str_exact("1268.25").unwrap());

        let annual = compound_interest(principal, rate, PaymentFrequency::Annual, Decimal::ONE).unwrap();
        assert_eq!(annual, Money::from_major(1_200));

        // half a year compounding annually is fractional
        let half = compound_interest(principal, rate, PaymentFrequency::Annual, dec!(0.5)).unwrap();
        assert!(half > Money::from_major(580) && half < Money::from_major(584));
    }

    #[test]
    fn test_daily_and_accrued_interest() {
        let balance = Money::from_major(10_000);
        let rate = Rate::from_percentage(5);

        let daily = daily_interest(balance, rate, DayCountConvention::Actual365).unwrap();
        assert_eq!(daily.round_cents(), Money::from_str_exact("1.37").unwrap());

        let accrued = accrued_interest(
            balance,
            rate,
            date(2024, 1, 1),
            date(2024, 1, 31),
            DayCountConvention::Actual365,
        )
        .unwrap();
        assert_eq!(accrued.round_cents(), Money::from_str_exact("41.10").unwrap());

        let err = accrued_interest(
            balance,
            rate,
            date(2024, 2, 1),
            date(2024, 1, 1),
            DayCountConvention::Actual365,
        )
        .unwrap_err();
        assert!(matches!(err, AmortizationError::InvalidDate { .. }));
    }

    #[test]
    fn test_effective_annual_rate() {
        let daily_apy = effective_annual_rate(Rate::from_percentage(18), PaymentFrequency::Daily).unwrap();
        assert!(daily_apy.as_percentage() > dec!(19.7));
        assert!(daily_apy.as_percentage() < dec!(19.8));

        let monthly_apy = effective_annual_rate(Rate::from_percentage(18), PaymentFrequency::Monthly).unwrap();
        assert!(monthly_apy.as_percentage() > dec!(19.5));
        assert!(monthly_apy.as_percentage() < dec!(19.6));

        let annual = effective_annual_rate(Rate::from_percentage(7), PaymentFrequency::Annual).unwrap();
        assert_eq!(annual, Rate::from_percentage(7));
    }

    #[test]
    fn test_rate_conversion_round_trip() {
        let nominal = Rate::from_percentage(12);
        let effective = effective_annual_rate(nominal, PaymentFrequency::Monthly).unwrap();
        let back = nominal_rate(effective, PaymentFrequency::Monthly).unwrap();
        assert!((back.as_decimal() - nominal.as_decimal()).abs() < dec!(0.000001));

        let quarterly = convert_rate(nominal, PaymentFrequency::Monthly, PaymentFrequency::Quarterly).unwrap();
        // fewer compounding periods need a higher nominal rate
        assert!(quarterly > nominal);
        assert_eq!(
            convert_rate(nominal, PaymentFrequency::Monthly, PaymentFrequency::Monthly).unwrap(),
            nominal
        );
    }

    #[test]
    fn test_equivalent_periodic_rate() {
        let rate = Rate::from_percentage(6);
        let same = equivalent_periodic_rate(rate, PaymentFrequency::Monthly, PaymentFrequency::Monthly).unwrap();
        assert_eq!(same, dec!(0.005));

        // semiannual compounding on monthly payments: (1.03)^(1/6) - 1
        let mixed = equivalent_periodic_rate(rate, PaymentFrequency::SemiAnnual, PaymentFrequency::Monthly).unwrap();
        assert!(mixed > dec!(0.00492) && mixed < dec!(0.00494));
    }

    #[test]
    fn test_prorated_interest() {
        let balance = Money::from_major(100_000);
        let rate = Rate::from_percentage(6);

        let semiannual = PaymentFrequency::SemiAnnual;
        let (jan, feb) = (date(2024, 1, 1), date(2024, 2, 1));

        let month = prorated_interest(balance, rate, semiannual, jan, feb, DayCountConvention::Actual365).unwrap();
        assert!(month > Money::from_major(500) && month < Money::from_major(510));

        // 31 days over a 360 day year accrue more than over 365
        let banker = prorated_interest(balance, rate, semiannual, jan, feb, DayCountConvention::Actual360).unwrap();
        assert!(banker > month);

        // 30/360 counts every month as 30 days
        let thirty = prorated_interest(balance, rate, semiannual, jan, feb, DayCountConvention::Thirty360).unwrap();
        let march = prorated_interest(balance, rate, semiannual, date(2024, 2, 1), date(2024, 3, 1), DayCountConvention::Thirty360)
            .unwrap();
        assert_eq!(thirty, march);

        let none = prorated_interest(balance, rate, semiannual, jan, jan, DayCountConvention::Actual365).unwrap();
        assert_eq!(none, Money::ZERO);
        let free = prorated_interest(balance, Rate::ZERO, PaymentFrequency::Monthly, jan, feb, DayCountConvention::Actual365)
            .unwrap();
        assert_eq!(free, Money::ZERO);
    }

    #[test]
    fn test_negative_inputs_rejected() {
        let negative_rate = Rate::from_decimal(dec!(-0.05));
        let err = periodic_interest(Money::from_major(1_000), negative_rate, PaymentFrequency::Monthly).unwrap_err();
        assert!(matches!(err, AmortizationError::InvalidInterestRate { .. }));

        let err = simple_interest(Money::from_major(-1_000), Rate::from_percentage(5), Decimal::ONE).unwrap_err();
        assert!(err.is_invalid_argument());

        assert!(effective_annual_rate(negative_rate, PaymentFrequency::Monthly).is_err());
        assert!(daily_interest(Money::from_major(-1), Rate::from_percentage(5), DayCountConvention::Actual360).is_err());
    }
}

use rust_decimal::Decimal;

use crate::decimal::{compound_factor, Money, Rate};
use crate::errors::{AmortizationError, Result};
use crate::types::PaymentFrequency;

/// default bound on periods when solving for a term
const DEFAULT_MAX_PERIODS: u32 = 20_000;

/// level payment calculator
#[derive(Debug, Clone, Copy)]
pub struct PaymentCalculator {
    max_periods: u32,
}

impl Default for PaymentCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PERIODS)
    }
}

impl PaymentCalculator {
    pub fn new(max_periods: u32) -> Self {
        Self { max_periods }
    }

    /// level payment that amortizes `principal` over `number_of_payments`
    /// periods, rounded to cents
    pub fn calculate(
        &self,
        principal: Money,
        annual_rate: Rate,
        frequency: PaymentFrequency,
        number_of_payments: u32,
    ) -> Result<Money> {
        validate_loan_terms(principal, annual_rate, number_of_payments, self.max_periods)?;

        let periodic_rate = annual_rate.per_period(frequency.periods_per_year());
        level_payment(principal, periodic_rate.as_decimal(), number_of_payments)
    }

    /// same as [`calculate`](Self::calculate) with the frequency given by name
    pub fn calculate_named(
        &self,
        principal: Money,
        annual_rate: Rate,
        frequency: &str,
        number_of_payments: u32,
    ) -> Result<Money> {
        self.calculate(principal, annual_rate, frequency.parse()?, number_of_payments)
    }

    /// number of periods a fixed payment needs to clear `balance`, with
    /// interest rounded to cents each period the way schedules are built
    pub fn number_of_payments(
        &self,
        balance: Money,
        annual_rate: Rate,
        frequency: PaymentFrequency,
        payment: Money,
    ) -> Result<u32> {
        if !balance.is_positive() {
            return Err(AmortizationError::InvalidPrincipal { principal: balance });
        }
        if !payment.is_positive() {
            return Err(AmortizationError::InvalidPaymentAmount { amount: payment });
        }
        if annual_rate.is_negative() {
            return Err(AmortizationError::InvalidInterestRate { rate: annual_rate });
        }

        let periodic_rate = annual_rate.per_period(frequency.periods_per_year()).as_decimal();
        let first_interest = Money::from_decimal(balance.as_decimal() * periodic_rate).round_cents();
        if payment <= first_interest {
            return Err(AmortizationError::PaymentBelowInterest {
                payment,
                interest: first_interest,
            });
        }

        let mut remaining = balance;
        let mut periods = 0;
        while remaining.is_positive() {
            if periods >= self.max_periods {
                return Err(AmortizationError::CalculationError {
                    message: format!("payment {} does not amortize {} within {} periods", payment, balance, self.max_periods),
                });
            }
            let interest = Money::from_decimal(remaining.as_decimal() * periodic_rate).round_cents();
            remaining -= payment - interest;
            periods += 1;
        }

        Ok(periods)
    }

    /// value today of `amount` due after `periods` periods
    pub fn present_value(
        &self,
        amount: Money,
        annual_rate: Rate,
        frequency: PaymentFrequency,
        periods: u32,
    ) -> Result<Money> {
        if annual_rate.is_negative() {
            return Err(AmortizationError::InvalidInterestRate { rate: annual_rate });
        }

        let periodic_rate = annual_rate.per_period(frequency.periods_per_year());
        let factor = compound_factor(periodic_rate.as_decimal(), periods)?;
        Ok(Money::from_decimal(amount.as_decimal() / factor))
    }
}

/// shared validation for principal, rate and payment count
pub(crate) fn validate_loan_terms(
    principal: Money,
    annual_rate: Rate,
    number_of_payments: u32,
    max_periods: u32,
) -> Result<()> {
    if !principal.is_positive() {
        log::warn!("rejected non-positive principal {}", principal);
        return Err(AmortizationError::InvalidPrincipal { principal });
    }
    if number_of_payments == 0 || number_of_payments > max_periods {
        log::warn!("rejected {} payments, limit is {}", number_of_payments, max_periods);
        return Err(AmortizationError::InvalidPaymentCount {
            count: number_of_payments,
        });
    }
    if annual_rate.is_negative() {
        log::warn!("rejected negative rate {}", annual_rate);
        return Err(AmortizationError::InvalidInterestRate { rate: annual_rate });
    }
    Ok(())
}

/// annuity payment `P * r * (1 + r)^n / ((1 + r)^n - 1)` rounded to cents,
/// straight line when the periodic rate is zero
pub(crate) fn level_payment(principal: Money, periodic_rate: Decimal, periods: u32) -> Result<Money> {
    if periods == 0 {
        return Ok(principal.round_cents());
    }

    if periodic_rate.is_zero() {
        return Ok((principal / Decimal::from(periods)).round_cents());
    }

    let compound = compound_factor(periodic_rate, periods)?;

    // (1 + r)^n / ((1 + r)^n - 1) tends to one on long terms, so scale last
    let payment = compound
        .checked_div(compound - Decimal::ONE)
        .and_then(|ratio| ratio.checked_mul(periodic_rate))
        .and_then(|factor| factor.checked_mul(principal.as_decimal()))
        .ok_or_else(|| AmortizationError::CalculationError {
            message: format!("payment on {} over {} periods overflowed", principal, periods),
        })?;

    Ok(Money::from_decimal(payment).round_cents())
}

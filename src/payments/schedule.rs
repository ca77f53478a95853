use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::AmortizationConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{AmortizationError, Result};
use crate::interest::{equivalent_periodic_rate, prorated_interest, DayCountConvention};
use crate::types::PaymentFrequency;

use super::calculator::{level_payment, validate_loan_terms};

/// row flags set by schedule mutations
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowFlags {
    pub skipped: bool,
    /// lump sum folded into this row's principal and payment
    pub prepayment: Option<Money>,
    /// interest added to the balance instead of being paid
    pub capitalized_interest: Option<Money>,
    pub balloon: bool,
}

/// one payment period of an amortization schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub payment_number: u32,
    pub payment_date: NaiveDate,
    pub beginning_balance: Money,
    pub payment_amount: Money,
    pub principal_portion: Money,
    pub interest_portion: Money,
    pub ending_balance: Money,
    /// annual rate applied in this period
    pub rate: Rate,
    /// rate block for variable-rate schedules
    pub term_number: Option<u32>,
    pub flags: RowFlags,
}

impl ScheduleRow {
    pub fn capitalized_interest(&self) -> Money {
        self.flags.capitalized_interest.unwrap_or(Money::ZERO)
    }

    /// payment net of any prepayment folded into it
    pub fn regular_payment(&self) -> Money {
        self.payment_amount - self.flags.prepayment.unwrap_or(Money::ZERO)
    }
}

/// inputs for generating a schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub principal: Money,
    pub annual_rate: Rate,
    pub frequency: PaymentFrequency,
    pub number_of_payments: u32,
    pub start_date: NaiveDate,
    /// interest compounding frequency when it differs from the payment frequency
    pub interest_frequency: Option<PaymentFrequency>,
}

impl ScheduleRequest {
    /// request starting today
    pub fn new(principal: Money, annual_rate: Rate, frequency: PaymentFrequency, number_of_payments: u32) -> Self {
        Self {
            principal,
            annual_rate,
            frequency,
            number_of_payments,
            start_date: Utc::now().date_naive(),
            interest_frequency: None,
        }
    }

    pub fn start_date(mut self, start_date: NaiveDate) -> Self {
        self.start_date = start_date;
        self
    }

    pub fn interest_frequency(mut self, frequency: PaymentFrequency) -> Self {
        self.interest_frequency = Some(frequency);
        self
    }

    pub(crate) fn terms(&self, day_count: DayCountConvention) -> RowTerms {
        RowTerms {
            start_date: self.start_date,
            frequency: self.frequency,
            interest_frequency: self.interest_frequency,
            annual_rate: self.annual_rate,
            term_number: None,
            day_count,
        }
    }
}

/// an amortization schedule together with the terms it was generated from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub principal: Money,
    pub annual_rate: Rate,
    pub frequency: PaymentFrequency,
    pub interest_frequency: Option<PaymentFrequency>,
    pub start_date: NaiveDate,
    /// level payment at generation time
    pub payment_amount: Money,
    /// lump sum due with the final payment on top of the regular payment
    #[serde(default)]
    pub balloon: Option<Money>,
    pub rows: Vec<ScheduleRow>,
}

impl Schedule {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// row by 1-based payment number
    pub fn row(&self, payment_number: u32) -> Option<&ScheduleRow> {
        if payment_number == 0 {
            return None;
        }
        self.rows.get((payment_number - 1) as usize)
    }

    /// row by payment number, rejecting numbers outside the schedule
    pub fn row_checked(&self, payment_number: u32) -> Result<&ScheduleRow> {
        self.row(payment_number)
            .ok_or(AmortizationError::PaymentNumberOutOfRange {
                payment_number,
                schedule_len: self.rows.len(),
            })
    }

    pub fn total_interest(&self) -> Money {
        self.rows.iter().map(|r| r.interest_portion).sum()
    }

    pub fn total_payment(&self) -> Money {
        self.rows.iter().map(|r| r.payment_amount).sum()
    }

    pub fn total_principal(&self) -> Money {
        self.rows.iter().map(|r| r.principal_portion).sum()
    }

    pub fn total_capitalized_interest(&self) -> Money {
        self.rows.iter().map(|r| r.capitalized_interest()).sum()
    }

    pub fn final_balance(&self) -> Money {
        self.rows.last().map(|r| r.ending_balance).unwrap_or(self.principal)
    }

    /// remaining balance after the given payment
    pub fn balance_after_payment(&self, payment_number: u32) -> Money {
        self.row(payment_number)
            .map(|r| r.ending_balance)
            .unwrap_or(self.principal)
    }

    /// first payment on or after `date`
    pub fn payment_number_on_or_after(&self, date: NaiveDate) -> Option<u32> {
        self.rows
            .iter()
            .find(|r| r.payment_date >= date)
            .map(|r| r.payment_number)
    }

    /// check row arithmetic, balance continuity, numbering, payoff and
    /// principal conservation within `tolerance`
    pub fn validate(&self, tolerance: Money) -> Result<()> {
        let first = self.rows.first().ok_or_else(|| AmortizationError::CalculationError {
            message: "schedule has no rows".to_string(),
        })?;

        if !first.beginning_balance.approx_eq(self.principal, tolerance) {
            return Err(invariant_error(first, "first beginning balance differs from principal"));
        }

        for (index, row) in self.rows.iter().enumerate() {
            if row.payment_number as usize != index + 1 {
                return Err(invariant_error(row, "payment numbers are not sequential"));
            }

            let expected_ending = row.beginning_balance - row.principal_portion + row.capitalized_interest();
            if !row.ending_balance.approx_eq(expected_ending, tolerance) {
                return Err(invariant_error(row, "ending balance does not follow from principal portion"));
            }

            if !(row.principal_portion + row.interest_portion).approx_eq(row.payment_amount, tolerance) {
                return Err(invariant_error(row, "principal and interest do not add up to payment"));
            }

            if let Some(next) = self.rows.get(index + 1) {
                if !row.ending_balance.approx_eq(next.beginning_balance, tolerance) {
                    return Err(invariant_error(row, "ending balance differs from next beginning balance"));
                }
            }
        }

        if !self.final_balance().approx_eq(Money::ZERO, tolerance) {
            return Err(AmortizationError::CalculationError {
                message: format!("final balance {} is not paid off", self.final_balance()),
            });
        }

        let conserved = self.principal + self.total_capitalized_interest();
        if !self.total_principal().approx_eq(conserved, tolerance) {
            return Err(AmortizationError::CalculationError {
                message: format!(
                    "principal portions sum to {} but {} was lent",
                    self.total_principal(),
                    conserved
                ),
            });
        }

        Ok(())
    }
}

fn invariant_error(row: &ScheduleRow, message: &str) -> AmortizationError {
    AmortizationError::CalculationError {
        message: format!("row {}: {}", row.payment_number, message),
    }
}

/// terms shared by every row of an amortization run
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowTerms {
    pub start_date: NaiveDate,
    pub frequency: PaymentFrequency,
    pub interest_frequency: Option<PaymentFrequency>,
    pub annual_rate: Rate,
    pub term_number: Option<u32>,
    /// year fraction of a period when interest compounds at another frequency
    pub day_count: DayCountConvention,
}

impl RowTerms {
    pub fn from_schedule(schedule: &Schedule, annual_rate: Rate, day_count: DayCountConvention) -> Self {
        Self {
            start_date: schedule.start_date,
            frequency: schedule.frequency,
            interest_frequency: schedule.interest_frequency,
            annual_rate,
            term_number: None,
            day_count,
        }
    }

    pub fn with_term_number(mut self, term_number: u32) -> Self {
        self.term_number = Some(term_number);
        self
    }

    fn diverging_interest_frequency(&self) -> Option<PaymentFrequency> {
        self.interest_frequency.filter(|f| *f != self.frequency)
    }

    /// rate per payment period used for level payments
    pub fn periodic_rate(&self) -> Result<Decimal> {
        let compounding = self.interest_frequency.unwrap_or(self.frequency);
        equivalent_periodic_rate(self.annual_rate, compounding, self.frequency)
    }

    pub fn level_payment(&self, balance: Money, periods: u32) -> Result<Money> {
        level_payment(balance, self.periodic_rate()?, periods)
    }

    pub fn payment_date(&self, payment_number: u32) -> Result<NaiveDate> {
        self.frequency.advance(self.start_date, payment_number)
    }

    /// interest for the period ending at `payment_number`, rounded to cents
    pub fn period_interest(&self, balance: Money, payment_number: u32) -> Result<Money> {
        let interest = match self.diverging_interest_frequency() {
            Some(compounding) => {
                let from = self.payment_date(payment_number.saturating_sub(1))?;
                let to = self.payment_date(payment_number)?;
                prorated_interest(balance, self.annual_rate, compounding, from, to, self.day_count)?
            }
            None => {
                let rate = self.annual_rate.per_period(self.frequency.periods_per_year());
                Money::from_decimal(balance.as_decimal() * rate.as_decimal())
            }
        };
        Ok(interest.round_cents())
    }
}

/// how many rows an amortization run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunLength {
    /// exactly `periods` rows; with `settle` the last row clears the balance
    Fixed { periods: u32, settle: bool },
    /// as many rows as the payment needs to clear the balance
    UntilPaid { max_periods: u32 },
    /// as many rows as the payment needs, the `periods`-th settling whatever is left
    Capped { periods: u32 },
}

/// amortize `opening_balance` with a fixed `payment` starting at `first_number`
pub(crate) fn amortize(
    terms: &RowTerms,
    opening_balance: Money,
    first_number: u32,
    payment: Money,
    length: RunLength,
) -> Result<Vec<ScheduleRow>> {
    let mut rows = Vec::new();
    let mut balance = opening_balance;

    if let RunLength::UntilPaid { .. } = length {
        let interest = terms.period_interest(balance, first_number)?;
        if payment <= interest && balance.is_positive() {
            return Err(AmortizationError::PaymentBelowInterest { payment, interest });
        }
    }

    let mut offset = 0;
    loop {
        let payment_number = first_number + offset;
        let interest = terms.period_interest(balance, payment_number)?;

        let is_last = match length {
            RunLength::Fixed { periods, settle } => settle && offset + 1 == periods,
            RunLength::UntilPaid { max_periods } => {
                if offset >= max_periods {
                    return Err(AmortizationError::CalculationError {
                        message: format!(
                            "payment {} does not clear balance {} within {} periods",
                            payment, opening_balance, max_periods
                        ),
                    });
                }
                payment >= balance + interest
            }
            RunLength::Capped { periods } => payment >= balance + interest || offset + 1 >= periods,
        };

        let (principal_portion, payment_amount) = if is_last {
            (balance, balance + interest)
        } else {
            // never pay below zero; a cleared balance leaves zero rows behind
            let principal = (payment - interest).min(balance);
            (principal, principal + interest)
        };
        let ending_balance = balance - principal_portion;

        rows.push(ScheduleRow {
            payment_number,
            payment_date: terms.payment_date(payment_number)?,
            beginning_balance: balance,
            payment_amount,
            principal_portion,
            interest_portion: interest,
            ending_balance,
            rate: terms.annual_rate,
            term_number: terms.term_number,
            flags: RowFlags::default(),
        });

        balance = ending_balance;
        offset += 1;

        match length {
            RunLength::Fixed { periods, .. } if offset >= periods => break,
            RunLength::UntilPaid { .. } | RunLength::Capped { .. } if is_last => break,
            _ => {}
        }
    }

    Ok(rows)
}

/// period-by-period schedule generator
#[derive(Debug, Clone, Default)]
pub struct ScheduleCalculator {
    config: AmortizationConfig,
}

impl ScheduleCalculator {
    pub fn new(config: AmortizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AmortizationConfig {
        &self.config
    }

    /// generate a fully amortizing schedule with `number_of_payments` rows
    pub fn generate(&self, request: &ScheduleRequest) -> Result<Schedule> {
        validate_loan_terms(
            request.principal,
            request.annual_rate,
            request.number_of_payments,
            self.config.max_periods,
        )?;

        let terms = request.terms(self.config.day_count_convention);
        let payment = terms.level_payment(request.principal, request.number_of_payments)?;
        let rows = amortize(
            &terms,
            request.principal,
            1,
            payment,
            RunLength::Fixed {
                periods: request.number_of_payments,
                settle: true,
            },
        )?;

        log::debug!(
            "generated {} {} rows for {} at {} (payment {})",
            rows.len(),
            request.frequency,
            request.principal,
            request.annual_rate,
            payment
        );

        Ok(Schedule {
            principal: request.principal,
            annual_rate: request.annual_rate,
            frequency: request.frequency,
            interest_frequency: request.interest_frequency,
            start_date: request.start_date,
            payment_amount: payment,
            balloon: None,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_log::test;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn generate(principal: i64, rate: Rate, frequency: PaymentFrequency, n: u32) -> Schedule {
        let request = ScheduleRequest::new(Money::from_major(principal), rate, frequency, n).start_date(start());
        ScheduleCalculator::default().generate(&request).unwrap()
    }

    #[test]
    fn test_monthly_schedule() {
        let schedule = generate(10_000, Rate::from_percentage(5), PaymentFrequency::Monthly, 360);

        assert_eq!(schedule.len(), 360);
        assert_eq!(schedule.payment_amount, Money::from_decimal(dec!(53.68)));

        let first = &schedule.rows[0];
        assert_eq!(first.payment_number, 1);
        assert_eq!(first.payment_date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(first.beginning_balance, Money::from_major(10_000));
        assert_eq!(first.interest_portion, Money::from_decimal(dec!(41.67)));
        assert_eq!(first.principal_portion, Money::from_decimal(dec!(12.01)));

        assert!(schedule.final_balance().approx_eq(Money::ZERO, Money::CENT));
        schedule.validate(Money::from_decimal(dec!(0.02))).unwrap();
    }

    #[test]
    fn test_balance_continuity() {
        let schedule = generate(250_000, Rate::from_percent(dec!(6.75)), PaymentFrequency::Monthly, 180);

        for pair in schedule.rows.windows(2) {
            assert_eq!(pair[0].ending_balance, pair[1].beginning_balance);
        }
        assert_eq!(schedule.final_balance(), Money::ZERO);
    }

    #[test]
    fn test_principal_conservation() {
        let schedule = generate(500_000, Rate::from_percent(dec!(4.5)), PaymentFrequency::Monthly, 360);

        let tolerance = Money::from_decimal(dec!(0.10));
        assert!(schedule.total_principal().approx_eq(Money::from_major(500_000), tolerance));
        assert_eq!(schedule.total_payment(), schedule.total_principal() + schedule.total_interest());
    }

    #[test]
    fn test_zero_rate_schedule() {
        let schedule = generate(12_000, Rate::ZERO, PaymentFrequency::Monthly, 12);

        for row in &schedule.rows {
            assert_eq!(row.payment_amount, Money::from_major(1_000));
            assert_eq!(row.interest_portion, Money::ZERO);
        }
        assert_eq!(schedule.final_balance(), Money::ZERO);
    }

    #[test]
    fn test_final_row_absorbs_rounding() {
        let schedule = generate(10_000, Rate::ZERO, PaymentFrequency::Monthly, 3);

        assert_eq!(schedule.rows[0].payment_amount, Money::from_decimal(dec!(3333.33)));
        assert_eq!(schedule.rows[2].principal_portion, Money::from_decimal(dec!(3333.34)));
        assert_eq!(schedule.final_balance(), Money::ZERO);
    }

    #[test]
    fn test_payment_dates_by_frequency() {
        let biweekly = generate(5_000, Rate::from_percentage(7), PaymentFrequency::Biweekly, 26);
        for pair in biweekly.rows.windows(2) {
            assert_eq!((pair[1].payment_date - pair[0].payment_date).num_days(), 14);
        }

        let weekly = generate(5_000, Rate::from_percentage(7), PaymentFrequency::Weekly, 52);
        for pair in weekly.rows.windows(2) {
            assert_eq!((pair[1].payment_date - pair[0].payment_date).num_days(), 7);
        }

        let monthly = generate(5_000, Rate::from_percentage(7), PaymentFrequency::Monthly, 12);
        for pair in monthly.rows.windows(2) {
            let days = (pair[1].payment_date - pair[0].payment_date).num_days();
            assert!((28..=31).contains(&days));
        }
    }

    #[test]
    fn test_diverging_interest_frequency() {
        let request = ScheduleRequest::new(Money::from_major(100_000), Rate::from_percentage(6), PaymentFrequency::Monthly, 120)
            .start_date(start())
            .interest_frequency(PaymentFrequency::SemiAnnual);
        let schedule = ScheduleCalculator::default().generate(&request).unwrap();

        assert_eq!(schedule.len(), 120);
        assert_eq!(schedule.final_balance(), Money::ZERO);

        // semiannual compounding accrues less per month than monthly compounding
        let monthly = generate(100_000, Rate::from_percentage(6), PaymentFrequency::Monthly, 120);
        assert!(schedule.payment_amount < monthly.payment_amount);

        // february is shorter than january
        assert!(schedule.rows[1].interest_portion < schedule.rows[0].interest_portion);
        schedule.validate(Money::from_decimal(dec!(0.02))).unwrap();
    }

    #[test]
    fn test_day_count_drives_prorated_interest() {
        let request = ScheduleRequest::new(Money::from_major(100_000), Rate::from_percentage(6), PaymentFrequency::Monthly, 120)
            .start_date(start())
            .interest_frequency(PaymentFrequency::SemiAnnual);

        let actual = ScheduleCalculator::default().generate(&request).unwrap();
        let thirty = ScheduleCalculator::new(AmortizationConfig {
            day_count_convention: DayCountConvention::Thirty360,
            ..Default::default()
        })
        .generate(&request)
        .unwrap();

        assert_eq!(thirty.payment_amount, actual.payment_amount);

        // january is 30 days under 30/360 but 31 actual; leap february is 29 actual
        assert!(thirty.rows[0].interest_portion < actual.rows[0].interest_portion);
        assert!(thirty.rows[1].interest_portion > actual.rows[1].interest_portion);
        thirty.validate(Money::from_decimal(dec!(0.02))).unwrap();
    }

    #[test]
    fn test_rejects_invalid_requests() {
        let calculator = ScheduleCalculator::default();

        let request = ScheduleRequest::new(Money::from_major(-1), Rate::from_percentage(5), PaymentFrequency::Monthly, 12);
        assert!(calculator.generate(&request).unwrap_err().is_invalid_argument());

        let request = ScheduleRequest::new(Money::from_major(1_000), Rate::from_percentage(5), PaymentFrequency::Monthly, 0);
        assert!(calculator.generate(&request).unwrap_err().is_invalid_argument());

        // bounded by the configured period limit before any row is built
        let request = ScheduleRequest::new(Money::from_major(1_000), Rate::ZERO, PaymentFrequency::Monthly, u32::MAX);
        let err = calculator.generate(&request).unwrap_err();
        assert!(matches!(err, AmortizationError::InvalidPaymentCount { count: u32::MAX }));

        let config = AmortizationConfig {
            max_periods: 120,
            ..Default::default()
        };
        let request = ScheduleRequest::new(Money::from_major(1_000), Rate::from_percentage(5), PaymentFrequency::Monthly, 180);
        assert!(ScheduleCalculator::new(config).generate(&request).is_err());
    }

    #[test]
    fn test_row_lookup() {
        let schedule = generate(10_000, Rate::from_percentage(5), PaymentFrequency::Monthly, 12);

        assert!(schedule.row(0).is_none());
        assert_eq!(schedule.row(12).unwrap().payment_number, 12);
        assert!(schedule.row(13).is_none());

        let err = schedule.row_checked(500).unwrap_err();
        assert!(matches!(err, AmortizationError::PaymentNumberOutOfRange { payment_number: 500, .. }));

        assert_eq!(schedule.balance_after_payment(0), schedule.principal);
        assert_eq!(
            schedule.payment_number_on_or_after(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()),
            Some(3)
        );
    }

    #[test]
    fn test_validate_detects_broken_continuity() {
        let mut schedule = generate(10_000, Rate::from_percentage(5), PaymentFrequency::Monthly, 12);
        schedule.rows[4].beginning_balance += Money::from_major(1);

        assert!(schedule.validate(Money::from_decimal(dec!(0.02))).is_err());
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::AmortizationConfig;
use crate::decimal::{compound_factor, Money, Rate};
use crate::errors::{AmortizationError, Result};
use crate::events::{LoanEvent, LoanEventKind};
use crate::types::{PaymentFrequency, RecalculationStrategy};

use super::calculator::{level_payment, validate_loan_terms};
use super::schedule::{amortize, RowTerms, RunLength, Schedule, ScheduleCalculator, ScheduleRequest, ScheduleRow};

/// changes applied to a loan from a given payment onwards
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermModification {
    pub new_rate: Option<Rate>,
    /// number of remaining payments, counting the first modified one
    pub new_term: Option<u32>,
    pub new_payment: Option<Money>,
}

impl TermModification {
    pub fn rate(new_rate: Rate) -> Self {
        Self {
            new_rate: Some(new_rate),
            ..Default::default()
        }
    }

    pub fn term(new_term: u32) -> Self {
        Self {
            new_term: Some(new_term),
            ..Default::default()
        }
    }

    pub fn payment(new_payment: Money) -> Self {
        Self {
            new_payment: Some(new_payment),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.new_rate.is_none() && self.new_term.is_none() && self.new_payment.is_none()
    }
}

/// schedule variants and mid-life changes built on the schedule calculator.
///
/// Every operation returns a new [`Schedule`]; inputs are never mutated.
#[derive(Debug, Clone, Default)]
pub struct AdvancedAmortizationService {
    calculator: ScheduleCalculator,
}

impl AdvancedAmortizationService {
    pub fn new(config: AmortizationConfig) -> Self {
        Self {
            calculator: ScheduleCalculator::new(config),
        }
    }

    pub fn config(&self) -> &AmortizationConfig {
        self.calculator.config()
    }

    /// plain fully amortizing schedule
    pub fn standard_schedule(&self, request: &ScheduleRequest) -> Result<Schedule> {
        self.calculator.generate(request)
    }

    /// schedule whose final payment also repays `balloon`.
    ///
    /// The level payment amortizes `principal - PV(balloon)`, so the last
    /// payment is the regular payment plus the balloon.
    pub fn balloon_schedule(&self, request: &ScheduleRequest, balloon: Money) -> Result<Schedule> {
        validate_loan_terms(
            request.principal,
            request.annual_rate,
            request.number_of_payments,
            self.config().max_periods,
        )?;

        if balloon.is_negative() || balloon >= request.principal {
            log::warn!("rejected balloon {} for principal {}", balloon, request.principal);
            return Err(AmortizationError::InvalidBalloon {
                balloon,
                principal: request.principal,
            });
        }

        let terms = request.terms(self.config().day_count_convention);
        let balloon = Some(balloon).filter(|b| b.is_positive());
        let (rows, payment) = reamortize(&terms, request.principal, 1, request.number_of_payments, balloon)?;

        log::debug!("generated balloon schedule with balloon {:?} and payment {}", balloon, payment);

        Ok(Schedule {
            principal: request.principal,
            annual_rate: request.annual_rate,
            frequency: request.frequency,
            interest_frequency: request.interest_frequency,
            start_date: request.start_date,
            payment_amount: payment,
            balloon,
            rows,
        })
    }

    /// schedule with a rate per block of `periods_per_term` payments; at the
    /// start of each block the carried balance is re-amortized over every
    /// remaining period at the block's rate
    pub fn variable_rate_schedule(
        &self,
        principal: Money,
        rates: &[Rate],
        periods_per_term: u32,
        frequency: PaymentFrequency,
        start_date: NaiveDate,
    ) -> Result<Schedule> {
        let first_rate = *rates.first().ok_or_else(|| AmortizationError::InvalidArgument {
            message: "variable rate schedule needs at least one rate".to_string(),
        })?;
        if periods_per_term == 0 {
            return Err(AmortizationError::InvalidPaymentCount { count: 0 });
        }

        let total_periods = u32::try_from(rates.len())
            .ok()
            .and_then(|terms| terms.checked_mul(periods_per_term))
            .ok_or_else(|| AmortizationError::InvalidArgument {
                message: format!("{} rates of {} periods is too long", rates.len(), periods_per_term),
            })?;
        for rate in rates {
            validate_loan_terms(principal, *rate, total_periods, self.config().max_periods)?;
        }

        let mut rows: Vec<ScheduleRow> = Vec::with_capacity(total_periods as usize);
        let mut balance = principal;
        let mut first_payment = None;

        for (index, rate) in rates.iter().enumerate() {
            let term_number = index as u32 + 1;
            let elapsed = index as u32 * periods_per_term;
            let terms = RowTerms {
                start_date,
                frequency,
                interest_frequency: None,
                annual_rate: *rate,
                term_number: Some(term_number),
                day_count: self.config().day_count_convention,
            };

            let payment = terms.level_payment(balance, total_periods - elapsed)?;
            first_payment.get_or_insert(payment);

            let block = amortize(
                &terms,
                balance,
                elapsed + 1,
                payment,
                RunLength::Fixed {
                    periods: periods_per_term,
                    settle: term_number as usize == rates.len(),
                },
            )?;
            if let Some(last) = block.last() {
                balance = last.ending_balance;
            }
            rows.extend(block);
        }

        log::debug!("generated variable rate schedule over {} terms", rates.len());

        Ok(Schedule {
            principal,
            annual_rate: first_rate,
            frequency,
            interest_frequency: None,
            start_date,
            payment_amount: first_payment.unwrap_or(Money::ZERO),
            balloon: None,
            rows,
        })
    }

    /// fold a lump sum into payment `payment_number` and re-amortize the rest.
    ///
    /// `ReduceEmi` keeps the number of remaining payments; `ReduceTerm` keeps
    /// the payment and drops the periods it no longer needs. A balloon stays
    /// due at the end; under `ReduceTerm` it shrinks instead of the term growing.
    pub fn apply_prepayment(
        &self,
        schedule: &Schedule,
        payment_number: u32,
        amount: Money,
        strategy: RecalculationStrategy,
    ) -> Result<Schedule> {
        let row = schedule.row_checked(payment_number)?;

        if !amount.is_positive() {
            return Err(AmortizationError::InvalidPaymentAmount { amount });
        }
        if amount >= row.ending_balance {
            log::warn!("rejected prepayment {} against balance {}", amount, row.ending_balance);
            return Err(AmortizationError::PrepaymentExceedsBalance {
                amount,
                balance: row.ending_balance,
            });
        }

        let mut prepaid = row.clone();
        prepaid.principal_portion += amount;
        prepaid.payment_amount += amount;
        prepaid.ending_balance -= amount;
        prepaid.flags.prepayment = Some(row.flags.prepayment.unwrap_or(Money::ZERO) + amount);

        let terms = self.continuation_terms(schedule, row);
        let balance = prepaid.ending_balance;
        let next = payment_number + 1;
        let remaining = (schedule.len() as u32 - payment_number).max(1);

        let (tail, balloon) = match strategy {
            RecalculationStrategy::ReduceEmi => {
                let balloon = carried_balloon(schedule, balance);
                let (tail, _) = reamortize(&terms, balance, next, remaining, balloon)?;
                (tail, balloon)
            }
            RecalculationStrategy::ReduceTerm => {
                let payment = ongoing_payment(schedule, row);
                match schedule.balloon {
                    Some(_) => {
                        let mut tail = amortize(&terms, balance, next, payment, RunLength::Capped { periods: remaining })?;
                        let balloon = if tail.len() as u32 == remaining {
                            trailing_balloon(&mut tail, payment)
                        } else {
                            None
                        };
                        (tail, balloon)
                    }
                    None => {
                        let length = RunLength::UntilPaid {
                            max_periods: self.config().max_periods,
                        };
                        (amortize(&terms, balance, next, payment, length)?, None)
                    }
                }
            }
        };

        log::info!(
            "applied prepayment {} at payment {} ({:?}), {} rows follow",
            amount,
            payment_number,
            strategy,
            tail.len()
        );

        Ok(splice(schedule, payment_number, Some(prepaid), tail, balloon))
    }

    /// skip payment `payment_number`; with `capitalize_interest` the period's
    /// interest is added to the balance, otherwise it is waived. The balance is
    /// re-amortized over the remaining periods plus one.
    pub fn skip_payment(&self, schedule: &Schedule, payment_number: u32, capitalize_interest: bool) -> Result<Schedule> {
        let row = schedule.row_checked(payment_number)?;
        if !row.beginning_balance.is_positive() {
            return Err(AmortizationError::LoanPaidOff { payment_number });
        }

        let capitalized = if capitalize_interest && row.interest_portion.is_positive() {
            Some(row.interest_portion)
        } else {
            None
        };

        let mut skipped = row.clone();
        skipped.payment_amount = Money::ZERO;
        skipped.principal_portion = Money::ZERO;
        skipped.interest_portion = Money::ZERO;
        skipped.ending_balance = row.beginning_balance + capitalized.unwrap_or(Money::ZERO);
        skipped.flags.skipped = true;
        skipped.flags.prepayment = None;
        skipped.flags.balloon = false;
        skipped.flags.capitalized_interest = capitalized;

        let terms = self.continuation_terms(schedule, row);
        let balance = skipped.ending_balance;
        let remaining = schedule.len() as u32 - payment_number + 1;
        let balloon = carried_balloon(schedule, balance);
        let (tail, _) = reamortize(&terms, balance, payment_number + 1, remaining, balloon)?;

        log::info!(
            "skipped payment {} (capitalized {}), schedule extended to {} rows",
            payment_number,
            capitalized.unwrap_or(Money::ZERO),
            payment_number as usize + tail.len()
        );

        Ok(splice(schedule, payment_number, Some(skipped), tail, balloon))
    }

    /// re-amortize from payment `payment_number` with a new rate, remaining
    /// term and/or fixed payment. A balloon stays due with the last payment.
    pub fn modify_terms(
        &self,
        schedule: &Schedule,
        payment_number: u32,
        modification: &TermModification,
    ) -> Result<Schedule> {
        if modification.is_empty() {
            return Err(AmortizationError::InvalidArgument {
                message: "term modification changes nothing".to_string(),
            });
        }

        let row = schedule.row_checked(payment_number)?;
        let balance = row.beginning_balance;
        if !balance.is_positive() {
            return Err(AmortizationError::LoanPaidOff { payment_number });
        }

        let rate = modification.new_rate.unwrap_or(row.rate);
        if rate.is_negative() {
            return Err(AmortizationError::InvalidInterestRate { rate });
        }
        if modification.new_term == Some(0) {
            return Err(AmortizationError::InvalidPaymentCount { count: 0 });
        }

        let mut terms = self.continuation_terms(schedule, row);
        terms.annual_rate = rate;
        let remaining = schedule.len() as u32 - payment_number + 1;

        let (tail, balloon) = match modification.new_payment {
            Some(payment) => {
                if !payment.is_positive() {
                    return Err(AmortizationError::InvalidPaymentAmount { amount: payment });
                }
                let interest = terms.period_interest(balance, payment_number)?;
                if payment <= interest {
                    return Err(AmortizationError::PaymentBelowInterest { payment, interest });
                }

                let length = match (modification.new_term, schedule.balloon) {
                    (Some(periods), _) => RunLength::Fixed { periods, settle: true },
                    (None, Some(_)) => RunLength::Capped { periods: remaining },
                    (None, None) => RunLength::UntilPaid {
                        max_periods: self.config().max_periods,
                    },
                };
                let mut tail = amortize(&terms, balance, payment_number, payment, length)?;

                let settled_at_end = match length {
                    RunLength::Capped { periods } => tail.len() as u32 == periods,
                    _ => true,
                };
                let balloon = if schedule.balloon.is_some() && settled_at_end {
                    trailing_balloon(&mut tail, payment)
                } else {
                    None
                };
                (tail, balloon)
            }
            None => {
                let periods = modification.new_term.unwrap_or(remaining);
                let balloon = carried_balloon(schedule, balance);
                let (tail, _) = reamortize(&terms, balance, payment_number, periods, balloon)?;
                (tail, balloon)
            }
        };

        log::info!(
            "modified terms from payment {}: rate {}, {} rows follow",
            payment_number,
            rate,
            tail.len()
        );

        Ok(splice(schedule, payment_number, None, tail, balloon))
    }

    /// apply a loan event at the first payment on or after its effective date
    pub fn apply_event(&self, schedule: &Schedule, event: &LoanEvent) -> Result<Schedule> {
        let payment_number = self.event_payment_number(schedule, event)?;

        match &event.kind {
            LoanEventKind::ExtraPayment { amount } => {
                self.apply_prepayment(schedule, payment_number, *amount, RecalculationStrategy::ReduceTerm)
            }
            LoanEventKind::SkipPayment { capitalize_interest } => {
                self.skip_payment(schedule, payment_number, *capitalize_interest)
            }
            LoanEventKind::RateChange { new_rate } => {
                self.modify_terms(schedule, payment_number, &TermModification::rate(*new_rate))
            }
            LoanEventKind::LoanModification(modification) => {
                self.modify_terms(schedule, payment_number, modification)
            }
        }
    }

    /// payment number an event takes effect at
    pub fn event_payment_number(&self, schedule: &Schedule, event: &LoanEvent) -> Result<u32> {
        schedule
            .payment_number_on_or_after(event.effective_date)
            .ok_or_else(|| AmortizationError::InvalidDate {
                message: format!("event date {} is after the last scheduled payment", event.effective_date),
            })
    }

    /// terms for rows after `row`; rows keep the rate and rate block of `row`
    fn continuation_terms(&self, schedule: &Schedule, row: &ScheduleRow) -> RowTerms {
        let terms = RowTerms::from_schedule(schedule, row.rate, self.config().day_count_convention);
        match row.term_number {
            Some(term_number) => terms.with_term_number(term_number),
            None => terms,
        }
    }
}

/// amortize `balance` over exactly `periods` rows from `first_number`,
/// leaving `balloon` to be repaid with the last one
fn reamortize(
    terms: &RowTerms,
    balance: Money,
    first_number: u32,
    periods: u32,
    balloon: Option<Money>,
) -> Result<(Vec<ScheduleRow>, Money)> {
    let payment = match balloon {
        Some(balloon) => {
            let periodic_rate = terms.periodic_rate()?;
            let discounted = Money::from_decimal(balloon.as_decimal() / compound_factor(periodic_rate, periods)?);
            level_payment(balance - discounted, periodic_rate, periods)?
        }
        None => terms.level_payment(balance, periods)?,
    };

    let mut rows = amortize(terms, balance, first_number, payment, RunLength::Fixed { periods, settle: true })?;
    if balloon.is_some() {
        if let Some(last) = rows.last_mut() {
            last.flags.balloon = true;
        }
    }
    Ok((rows, payment))
}

/// balloon still owed on `balance`, never more than the balance itself
fn carried_balloon(schedule: &Schedule, balance: Money) -> Option<Money> {
    schedule.balloon.map(|b| b.min(balance)).filter(|b| b.is_positive())
}

/// flag the last row as the balloon when it repays more than `payment`
fn trailing_balloon(rows: &mut [ScheduleRow], payment: Money) -> Option<Money> {
    let last = rows.last_mut()?;
    let excess = last.payment_amount - payment;
    if !excess.is_positive() {
        return None;
    }
    last.flags.balloon = true;
    Some(excess)
}

/// regular payment in force at `row`
fn ongoing_payment(schedule: &Schedule, row: &ScheduleRow) -> Money {
    if row.flags.skipped {
        schedule.payment_amount
    } else {
        row.regular_payment()
    }
}

/// rows before `payment_number`, then `replaced` in its place, then `tail`
fn splice(
    schedule: &Schedule,
    payment_number: u32,
    replaced: Option<ScheduleRow>,
    tail: Vec<ScheduleRow>,
    balloon: Option<Money>,
) -> Schedule {
    let kept = (payment_number - 1) as usize;
    let mut rows = Vec::with_capacity(kept + 1 + tail.len());
    rows.extend_from_slice(&schedule.rows[..kept]);
    rows.extend(replaced);
    rows.extend(tail);

    Schedule {
        principal: schedule.principal,
        annual_rate: schedule.annual_rate,
        frequency: schedule.frequency,
        interest_frequency: schedule.interest_frequency,
        start_date: schedule.start_date,
        payment_amount: schedule.payment_amount,
        balloon,
        rows,
    }
}

use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{AmortizationError, Result};

/// unique identifier for a loan
pub type LoanId = Uuid;

/// payment (and interest calculation) frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentFrequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl PaymentFrequency {
    pub const ALL: [PaymentFrequency; 7] = [
        PaymentFrequency::Daily,
        PaymentFrequency::Weekly,
        PaymentFrequency::Biweekly,
        PaymentFrequency::Monthly,
        PaymentFrequency::Quarterly,
        PaymentFrequency::SemiAnnual,
        PaymentFrequency::Annual,
    ];

    /// number of periods per year
    pub fn periods_per_year(&self) -> u32 {
        match self {
            PaymentFrequency::Daily => 365,
            PaymentFrequency::Weekly => 52,
            PaymentFrequency::Biweekly => 26,
            PaymentFrequency::Monthly => 12,
            PaymentFrequency::Quarterly => 4,
            PaymentFrequency::SemiAnnual => 2,
            PaymentFrequency::Annual => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentFrequency::Daily => "daily",
            PaymentFrequency::Weekly => "weekly",
            PaymentFrequency::Biweekly => "biweekly",
            PaymentFrequency::Monthly => "monthly",
            PaymentFrequency::Quarterly => "quarterly",
            PaymentFrequency::SemiAnnual => "semiannual",
            PaymentFrequency::Annual => "annual",
        }
    }

    /// date of the `periods`-th payment after `start`.
    ///
    /// Month based frequencies are anchored on `start` so day-of-month clamping
    /// (Jan 31 -> Feb 29) does not drift into later payments.
    pub fn advance(&self, start: NaiveDate, periods: u32) -> Result<NaiveDate> {
        let advanced = match self {
            PaymentFrequency::Daily => start.checked_add_signed(Duration::days(periods as i64)),
            PaymentFrequency::Weekly => start.checked_add_signed(Duration::days(7 * periods as i64)),
            PaymentFrequency::Biweekly => start.checked_add_signed(Duration::days(14 * periods as i64)),
            PaymentFrequency::Monthly => start.checked_add_months(Months::new(periods)),
            PaymentFrequency::Quarterly => start.checked_add_months(Months::new(3 * periods)),
            PaymentFrequency::SemiAnnual => start.checked_add_months(Months::new(6 * periods)),
            PaymentFrequency::Annual => start.checked_add_months(Months::new(12 * periods)),
        };

        advanced.ok_or_else(|| AmortizationError::InvalidDate {
            message: format!("{} plus {} {} periods is out of range", start, periods, self),
        })
    }
}

impl fmt::Display for PaymentFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentFrequency {
    type Err = AmortizationError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect();

        match normalized.as_str() {
            "daily" => Ok(PaymentFrequency::Daily),
            "weekly" => Ok(PaymentFrequency::Weekly),
            "biweekly" | "fortnightly" => Ok(PaymentFrequency::Biweekly),
            "monthly" => Ok(PaymentFrequency::Monthly),
            "quarterly" => Ok(PaymentFrequency::Quarterly),
            "semiannual" | "semiannually" => Ok(PaymentFrequency::SemiAnnual),
            "annual" | "annually" | "yearly" => Ok(PaymentFrequency::Annual),
            _ => Err(AmortizationError::UnknownFrequency {
                value: s.to_string(),
            }),
        }
    }
}

/// loan as handed over by a data provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub principal: Money,
    pub annual_rate: Rate,
    pub term_periods: u32,
    pub frequency: PaymentFrequency,
    pub start_date: NaiveDate,
    pub current_balance: Money,
}

impl Loan {
    /// new loan with a fresh id and the full principal outstanding
    pub fn new(
        principal: Money,
        annual_rate: Rate,
        term_periods: u32,
        frequency: PaymentFrequency,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal,
            annual_rate,
            term_periods,
            frequency,
            start_date,
            current_balance: principal,
        }
    }

    pub fn with_id(mut self, id: LoanId) -> Self {
        self.id = id;
        self
    }
}

/// how a schedule is re-amortized after a principal reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecalculationStrategy {
    /// keep the remaining term, lower the payment
    ReduceEmi,
    /// keep the payment, shorten the term
    ReduceTerm,
}

use std::collections::BTreeMap;

use hourglass_rs::SafeTimeProvider;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::decimal::{Money, Rate};
use crate::errors::Result;
use crate::payments::PaymentCalculator;
use crate::types::Loan;

use super::CacheManager;

const KEY_PREFIX: &str = "portfolio";

/// rate at or above which a loan counts as high rate
const HIGH_RATE_THRESHOLD_BPS: u32 = 1_000;

/// portfolio size and composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub loan_count: usize,
    pub total_principal: Money,
    pub total_outstanding: Money,
    /// rate weighted by outstanding balance
    pub weighted_average_rate: Rate,
    pub average_term_periods: Decimal,
    pub by_frequency: BTreeMap<String, usize>,
}

/// concentration and rate exposure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub loan_count: usize,
    pub largest_exposure: Money,
    /// largest outstanding balance as a fraction of the total
    pub largest_exposure_share: Decimal,
    /// herfindahl index of outstanding balances, 0 to 1
    pub concentration_index: Decimal,
    /// outstanding balance per whole-percent rate bucket ("5%" holds 5.00% to 5.99%)
    pub rate_buckets: BTreeMap<String, Money>,
    pub high_rate_exposure: Money,
}

/// scheduled cash flows across the portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub loan_count: usize,
    /// sum of each loan's level payment at its own frequency
    pub total_scheduled_payments: Money,
    /// the same payments converted to a monthly amount
    pub monthly_equivalent: Money,
    /// interest over the full term of every loan
    pub total_interest_over_term: Money,
}

/// portfolio aggregates memoised in a [`CacheManager`].
///
/// Keys hash the sorted loan set, so two different collections never share an
/// entry and the order loans are passed in does not matter.
pub struct PortfolioCache<'t> {
    cache: CacheManager<'t, Value>,
    calculator: PaymentCalculator,
}

impl<'t> PortfolioCache<'t> {
    pub fn new(time: &'t SafeTimeProvider) -> Self {
        Self::with_config(time, &CacheConfig::default())
    }

    pub fn with_config(time: &'t SafeTimeProvider, config: &CacheConfig) -> Self {
        Self {
            cache: CacheManager::with_config(time, config),
            calculator: PaymentCalculator::default(),
        }
    }

    pub fn cache(&self) -> &CacheManager<'t, Value> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut CacheManager<'t, Value> {
        &mut self.cache
    }

    pub fn portfolio_report(&mut self, loans: &[Loan]) -> Result<PortfolioReport> {
        let key = portfolio_key("report", loans)?;
        self.cached(&key, || Ok(build_report(loans)))
    }

    pub fn risk_profile(&mut self, loans: &[Loan]) -> Result<RiskProfile> {
        let key = portfolio_key("risk", loans)?;
        self.cached(&key, || Ok(build_risk_profile(loans)))
    }

    pub fn payment_summary(&mut self, loans: &[Loan]) -> Result<PaymentSummary> {
        let key = portfolio_key("payments", loans)?;
        let calculator = self.calculator;
        self.cached(&key, || build_payment_summary(&calculator, loans))
    }

    /// drop every aggregate cached for this loan set
    pub fn invalidate(&mut self, loans: &[Loan]) -> Result<usize> {
        let pattern = format!("^{}_[a-z]+_{}$", KEY_PREFIX, regex::escape(&portfolio_hash(loans)?));
        self.cache.delete_by_pattern(&pattern)
    }

    /// drop every portfolio aggregate
    pub fn invalidate_all(&mut self) -> Result<usize> {
        self.cache.delete_by_pattern(&format!("^{}_", KEY_PREFIX))
    }

    fn cached<T, F>(&mut self, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.cache.get(key) {
            match serde_json::from_value(value) {
                Ok(hit) => return Ok(hit),
                Err(e) => log::warn!("recomputing unreadable cache entry {}: {}", key, e),
            }
        }

        let computed = compute()?;
        self.cache.set(key, serde_json::to_value(&computed)?, None)?;
        Ok(computed)
    }
}

/// deterministic hash of the loan set, independent of input order and of
/// the scale amounts were written with
fn portfolio_hash(loans: &[Loan]) -> Result<String> {
    let mut sorted: Vec<Loan> = loans
        .iter()
        .map(|loan| Loan {
            principal: loan.principal.normalize(),
            annual_rate: loan.annual_rate.normalize(),
            current_balance: loan.current_balance.normalize(),
            ..loan.clone()
        })
        .collect();
    sorted.sort_by_key(|loan| loan.id);

    let canonical = serde_json::to_vec(&sorted)?;
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, &canonical).simple().to_string())
}

fn portfolio_key(kind: &str, loans: &[Loan]) -> Result<String> {
    Ok(format!("{}_{}_{}", KEY_PREFIX, kind, portfolio_hash(loans)?))
}

fn build_report(loans: &[Loan]) -> PortfolioReport {
    let total_principal: Money = loans.iter().map(|l| l.principal).sum();
    let total_outstanding: Money = loans.iter().map(|l| l.current_balance).sum();

    let weighted_average_rate = if total_outstanding.is_positive() {
        let weighted: Decimal = loans
            .iter()
            .map(|l| l.current_balance.as_decimal() * l.annual_rate.as_decimal())
            .sum();
        Rate::from_decimal((weighted / total_outstanding.as_decimal()).round_dp(6))
    } else {
        Rate::ZERO
    };

    let average_term_periods = if loans.is_empty() {
        Decimal::ZERO
    } else {
        let terms: u64 = loans.iter().map(|l| u64::from(l.term_periods)).sum();
        (Decimal::from(terms) / Decimal::from(loans.len())).round_dp(2)
    };

    let mut by_frequency = BTreeMap::new();
    for loan in loans {
        *by_frequency.entry(loan.frequency.to_string()).or_insert(0) += 1;
    }

    PortfolioReport {
        loan_count: loans.len(),
        total_principal,
        total_outstanding,
        weighted_average_rate,
        average_term_periods,
        by_frequency,
    }
}

fn build_risk_profile(loans: &[Loan]) -> RiskProfile {
    let total: Money = loans.iter().map(|l| l.current_balance).sum();
    let largest_exposure = loans
        .iter()
        .map(|l| l.current_balance)
        .max()
        .unwrap_or(Money::ZERO);

    let (largest_exposure_share, concentration_index) = if total.is_positive() {
        let share = |balance: Money| balance.as_decimal() / total.as_decimal();
        let hhi: Decimal = loans.iter().map(|l| share(l.current_balance) * share(l.current_balance)).sum();
        (share(largest_exposure).round_dp(4), hhi.round_dp(4))
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    let mut rate_buckets: BTreeMap<String, Money> = BTreeMap::new();
    for loan in loans {
        let bucket = format!("{}%", loan.annual_rate.as_percentage().floor().normalize());
        *rate_buckets.entry(bucket).or_insert(Money::ZERO) += loan.current_balance;
    }

    let high_rate = Rate::from_bps(HIGH_RATE_THRESHOLD_BPS);
    let high_rate_exposure = loans
        .iter()
        .filter(|l| l.annual_rate >= high_rate)
        .map(|l| l.current_balance)
        .sum();

    RiskProfile {
        loan_count: loans.len(),
        largest_exposure,
        largest_exposure_share,
        concentration_index,
        rate_buckets,
        high_rate_exposure,
    }
}

fn build_payment_summary(calculator: &PaymentCalculator, loans: &[Loan]) -> Result<PaymentSummary> {
    let mut total_scheduled_payments = Money::ZERO;
    let mut monthly_equivalent = Money::ZERO;
    let mut total_interest_over_term = Money::ZERO;

    for loan in loans {
        let payment = calculator.calculate(loan.principal, loan.annual_rate, loan.frequency, loan.term_periods)?;
        let per_year = Decimal::from(loan.frequency.periods_per_year());

        total_scheduled_payments += payment;
        monthly_equivalent += payment * per_year / Decimal::from(12);
        total_interest_over_term += payment * Decimal::from(loan.term_periods) - loan.principal;
    }

    Ok(PaymentSummary {
        loan_count: loans.len(),
        total_scheduled_payments,
        monthly_equivalent: monthly_equivalent.round_cents(),
        total_interest_over_term: total_interest_over_term.round_cents(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentFrequency;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;

    fn test_time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))
    }

    fn loan(principal: i64, percent: u32, term: u32, frequency: PaymentFrequency) -> Loan {
        Loan::new(
            Money::from_major(principal),
            Rate::from_percentage(percent),
            term,
            frequency,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
    }

    fn portfolio() -> Vec<Loan> {
        vec![
            loan(100_000, 5, 360, PaymentFrequency::Monthly),
            loan(50_000, 7, 120, PaymentFrequency::Monthly),
            loan(50_000, 12, 52, PaymentFrequency::Weekly),
        ]
    }

    #[test]
    fn test_portfolio_report() {
        let time = test_time();
        let mut cache = PortfolioCache::new(&time);
        let report = cache.portfolio_report(&portfolio()).unwrap();

        assert_eq!(report.loan_count, 3);
        assert_eq!(report.total_principal, Money::from_major(200_000));
        assert_eq!(report.total_outstanding, Money::from_major(200_000));
        // (100k * 5% + 50k * 7% + 50k * 12%) / 200k
        assert_eq!(report.weighted_average_rate, Rate::from_decimal(dec!(0.0725)));
        assert_eq!(report.average_term_periods, dec!(177.33));
        assert_eq!(report.by_frequency["monthly"], 2);
        assert_eq!(report.by_frequency["weekly"], 1);
    }

    #[test]
    fn test_risk_profile() {
        let time = test_time();
        let mut cache = PortfolioCache::new(&time);
        let risk = cache.risk_profile(&portfolio()).unwrap();

        assert_eq!(risk.largest_exposure, Money::from_major(100_000));
        assert_eq!(risk.largest_exposure_share, dec!(0.5));
        // 0.5^2 + 0.25^2 + 0.25^2
        assert_eq!(risk.concentration_index, dec!(0.375));
        assert_eq!(risk.rate_buckets["5%"], Money::from_major(100_000));
        assert_eq!(risk.high_rate_exposure, Money::from_major(50_000));
    }

    #[test]
    fn test_payment_summary() {
        let time = test_time();
        let mut cache = PortfolioCache::new(&time);
        let loans = vec![loan(100_000, 6, 360, PaymentFrequency::Monthly)];
        let summary = cache.payment_summary(&loans).unwrap();

        assert_eq!(summary.total_scheduled_payments, Money::from_decimal(dec!(599.55)));
        assert_eq!(summary.monthly_equivalent, Money::from_decimal(dec!(599.55)));
        assert_eq!(summary.total_interest_over_term, Money::from_decimal(dec!(115838.00)));
    }

    #[test]
    fn test_second_lookup_is_a_hit() {
        let time = test_time();
        let mut cache = PortfolioCache::new(&time);
        let loans = portfolio();

        let first = cache.portfolio_report(&loans).unwrap();
        let second = cache.portfolio_report(&loans).unwrap();
        assert_eq!(first, second);

        let stats = cache.cache().stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_keys_ignore_order_but_not_content() {
        let time = test_time();
        let mut cache = PortfolioCache::new(&time);
        let loans = portfolio();
        let mut reversed = loans.clone();
        reversed.reverse();

        cache.portfolio_report(&loans).unwrap();
        cache.portfolio_report(&reversed).unwrap();
        assert_eq!(cache.cache().stats().hits, 1);

        cache.portfolio_report(&loans[..2]).unwrap();
        assert_eq!(cache.cache().stats().misses, 2);
        assert_eq!(cache.cache().len(), 2);
    }

    #[test]
    fn test_keys_ignore_amount_scale() {
        let time = test_time();
        let mut cache = PortfolioCache::new(&time);
        let whole = loan(100_000, 5, 360, PaymentFrequency::Monthly);
        let written_with_cents = Loan {
            principal: Money::from_str_exact("100000.00").unwrap(),
            current_balance: Money::from_str_exact("100000.00").unwrap(),
            annual_rate: Rate::from_decimal(dec!(0.0500)),
            ..whole.clone()
        };

        cache.portfolio_report(&[whole]).unwrap();
        cache.portfolio_report(&[written_with_cents]).unwrap();

        assert_eq!(cache.cache().stats().hits, 1);
        assert_eq!(cache.cache().len(), 1);
    }

    #[test]
    fn test_invalidation() {
        let time = test_time();
        let mut cache = PortfolioCache::new(&time);
        let loans = portfolio();
        let other = vec![loan(10_000, 4, 24, PaymentFrequency::Monthly)];

        cache.portfolio_report(&loans).unwrap();
        cache.risk_profile(&loans).unwrap();
        cache.portfolio_report(&other).unwrap();

        assert_eq!(cache.invalidate(&loans).unwrap(), 2);
        assert_eq!(cache.cache().len(), 1);

        cache.cache_mut().set("unrelated", Value::Null, None).unwrap();
        assert_eq!(cache.invalidate_all().unwrap(), 1);
        assert_eq!(cache.cache().keys(), vec!["unrelated".to_string()]);
    }

    #[test]
    fn test_entries_expire() {
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut cache = PortfolioCache::with_config(&time, &CacheConfig { default_ttl_seconds: 60 });
        let loans = portfolio();

        cache.portfolio_report(&loans).unwrap();
        control.advance(Duration::seconds(61));
        cache.portfolio_report(&loans).unwrap();

        let stats = cache.cache().stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 2);
    }
}

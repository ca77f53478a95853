use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::CacheManager;
use crate::decimal::{Money, Rate};
use crate::errors::{AmortizationError, Result};
use crate::types::PaymentFrequency;

use super::advanced::AdvancedAmortizationService;
use super::schedule::{Schedule, ScheduleRequest};

pub const STANDARD: &str = "standard";
pub const BIWEEKLY: &str = "biweekly";
pub const VARIABLE_RATE: &str = "variable_rate";
const BALLOON_PREFIX: &str = "balloon";

/// scenarios to leave out of an alternative scenario run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioOptions {
    skip: BTreeSet<String>,
}

impl ScenarioOptions {
    /// read `skip_<name>` flags; other keys and false flags are ignored
    pub fn from_flags<I, K>(flags: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: AsRef<str>,
    {
        let skip = flags
            .into_iter()
            .filter(|(_, enabled)| *enabled)
            .filter_map(|(key, _)| key.as_ref().strip_prefix("skip_").map(str::to_string))
            .collect();
        Self { skip }
    }

    pub fn skip(mut self, name: &str) -> Self {
        self.skip.insert(name.to_string());
        self
    }

    /// `balloon` skips any balloon scenario regardless of its percentage
    pub fn is_skipped(&self, name: &str) -> bool {
        self.skip.contains(name) || (name.starts_with(BALLOON_PREFIX) && self.skip.contains(BALLOON_PREFIX))
    }
}

/// headline numbers of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub num_payments: usize,
    pub total_interest: Money,
    pub total_payment: Money,
}

impl ScenarioSummary {
    pub fn from_schedule(schedule: &Schedule) -> Self {
        Self {
            num_payments: schedule.len(),
            total_interest: schedule.total_interest().round_cents(),
            total_payment: schedule.total_payment().round_cents(),
        }
    }
}

/// generated scenarios keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub schedules: BTreeMap<String, Schedule>,
    pub summary: BTreeMap<String, ScenarioSummary>,
}

/// cost of one named schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioCost {
    pub name: String,
    pub total_cost: Money,
    pub total_interest: Money,
    pub num_payments: usize,
}

impl AdvancedAmortizationService {
    /// standard, balloon, biweekly and stepped variable-rate versions of the
    /// same loan. With a cache, each scenario is read from it when present and
    /// stored after it is built.
    pub fn generate_alternative_scenarios(
        &self,
        request: &ScheduleRequest,
        options: &ScenarioOptions,
        mut cache: Option<&mut CacheManager<'_>>,
    ) -> Result<ScenarioSet> {
        let fingerprint = self.request_fingerprint(request)?;
        let balloon_name = self.balloon_scenario_name();

        let mut set = ScenarioSet::default();
        for name in [STANDARD, balloon_name.as_str(), BIWEEKLY, VARIABLE_RATE] {
            if options.is_skipped(name) {
                log::debug!("skipping scenario {}", name);
                continue;
            }

            let key = format!("scenario_{}_{}", name, fingerprint);
            let schedule = match cached_schedule(cache.as_deref_mut(), &key) {
                Some(schedule) => schedule,
                None => {
                    let schedule = self.build_scenario(name, request)?;
                    if let Some(cache) = cache.as_deref_mut() {
                        cache.set(&key, serde_json::to_value(&schedule)?, None)?;
                    }
                    schedule
                }
            };

            set.summary.insert(name.to_string(), ScenarioSummary::from_schedule(&schedule));
            set.schedules.insert(name.to_string(), schedule);
        }

        log::info!("generated {} alternative scenarios", set.schedules.len());
        Ok(set)
    }

    /// total cost of each schedule, cheapest first
    pub fn compare_scenarios(&self, schedules: &BTreeMap<String, Schedule>) -> Vec<ScenarioCost> {
        let mut costs: Vec<ScenarioCost> = schedules
            .iter()
            .map(|(name, schedule)| ScenarioCost {
                name: name.clone(),
                total_cost: schedule.total_payment().round_cents(),
                total_interest: schedule.total_interest().round_cents(),
                num_payments: schedule.len(),
            })
            .collect();

        costs.sort_by(|a, b| a.total_cost.cmp(&b.total_cost));
        costs
    }

    fn build_scenario(&self, name: &str, request: &ScheduleRequest) -> Result<Schedule> {
        match name {
            STANDARD => self.standard_schedule(request),
            BIWEEKLY => self.standard_schedule(&biweekly_request(request)?),
            VARIABLE_RATE => self.stepped_rate_schedule(request),
            _ => {
                let percentage = self.config().scenarios.balloon_percentage;
                let balloon = (request.principal * percentage / Decimal::ONE_HUNDRED).round_cents();
                self.balloon_schedule(request, balloon)
            }
        }
    }

    fn balloon_scenario_name(&self) -> String {
        format!("{}_{}", BALLOON_PREFIX, self.config().scenarios.balloon_percentage.normalize())
    }

    /// rate rises by one step per year of payments, capped at the configured
    /// number of steps; terms shorter than two years get a single block
    fn stepped_rate_schedule(&self, request: &ScheduleRequest) -> Result<Schedule> {
        let scenarios = &self.config().scenarios;
        let n = request.number_of_payments;
        let per_year = request.frequency.periods_per_year();

        let (periods_per_term, blocks) = if n % per_year == 0 && n / per_year >= 2 {
            (per_year, n / per_year)
        } else {
            (n, 1)
        };

        let rates: Vec<Rate> = (0..blocks)
            .map(|step| {
                let steps = Decimal::from(step.min(scenarios.max_rate_steps));
                request.annual_rate + Rate::from_decimal(scenarios.rate_step.as_decimal() * steps)
            })
            .collect();

        self.variable_rate_schedule(request.principal, &rates, periods_per_term, request.frequency, request.start_date)
    }

    fn request_fingerprint(&self, request: &ScheduleRequest) -> Result<String> {
        let payload = serde_json::to_vec(&(request, &self.config().scenarios))?;
        Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, &payload).simple().to_string())
    }
}

/// same loan horizon paid every two weeks
fn biweekly_request(request: &ScheduleRequest) -> Result<ScheduleRequest> {
    let per_year = u64::from(request.frequency.periods_per_year());
    let biweekly_per_year = u64::from(PaymentFrequency::Biweekly.periods_per_year());
    let periods = (u64::from(request.number_of_payments) * biweekly_per_year).div_ceil(per_year);

    let number_of_payments = u32::try_from(periods).map_err(|_| AmortizationError::InvalidPaymentCount {
        count: request.number_of_payments,
    })?;

    Ok(ScheduleRequest {
        frequency: PaymentFrequency::Biweekly,
        number_of_payments,
        ..request.clone()
    })
}

fn cached_schedule(cache: Option<&mut CacheManager<'_>>, key: &str) -> Option<Schedule> {
    let value = cache?.get(key)?;
    match serde_json::from_value(value) {
        Ok(schedule) => {
            log::debug!("scenario cache hit for {}", key);
            Some(schedule)
        }
        Err(e) => {
            log::warn!("ignoring unreadable cached scenario {}: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use hourglass_rs::{SafeTimeProvider, TimeSource};
    use rust_decimal_macros::dec;

    fn request() -> ScheduleRequest {
        ScheduleRequest::new(Money::from_major(200_000), Rate::from_percentage(6), PaymentFrequency::Monthly, 360)
            .start_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    fn test_time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))
    }

    #[test]
    fn test_all_scenarios_generated() {
        let service = AdvancedAmortizationService::default();
        let set = service
            .generate_alternative_scenarios(&request(), &ScenarioOptions::default(), None)
            .unwrap();

        let names: Vec<&str> = set.schedules.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["balloon_20", "biweekly", "standard", "variable_rate"]);

        assert_eq!(set.summary["standard"].num_payments, 360);
        assert_eq!(set.summary["biweekly"].num_payments, 780);
        assert_eq!(set.summary["variable_rate"].num_payments, 360);
        assert_eq!(set.summary["balloon_20"].num_payments, 360);

        for schedule in set.schedules.values() {
            schedule.validate(Money::from_decimal(dec!(0.02))).unwrap();
        }
    }

    #[test]
    fn test_stepped_rates_are_capped() {
        let service = AdvancedAmortizationService::default();
        let set = service
            .generate_alternative_scenarios(&request(), &ScenarioOptions::default(), None)
            .unwrap();

        let variable = &set.schedules["variable_rate"];
        assert_eq!(variable.rows[0].rate, Rate::from_percentage(6));
        assert_eq!(variable.rows[12].rate, Rate::from_percent(dec!(6.5)));
        assert_eq!(variable.rows[48].rate, Rate::from_percentage(8));
        assert_eq!(variable.rows[359].rate, Rate::from_percentage(8));
        assert_eq!(variable.rows[359].term_number, Some(30));
    }

    #[test]
    fn test_short_term_variable_rate_is_single_block() {
        let service = AdvancedAmortizationService::default();
        let short = ScheduleRequest {
            number_of_payments: 18,
            ..request()
        };
        let set = service
            .generate_alternative_scenarios(&short, &ScenarioOptions::default(), None)
            .unwrap();

        let variable = &set.schedules["variable_rate"];
        assert!(variable.rows.iter().all(|r| r.term_number == Some(1)));
        assert_eq!(set.summary["biweekly"].num_payments, 39);
    }

    #[test]
    fn test_skip_flags() {
        let options = ScenarioOptions::from_flags([("skip_biweekly", true), ("skip_standard", false), ("verbose", true)]);
        assert!(options.is_skipped("biweekly"));
        assert!(!options.is_skipped("standard"));

        let service = AdvancedAmortizationService::default();
        let set = service
            .generate_alternative_scenarios(&request(), &options.skip("balloon"), None)
            .unwrap();

        assert!(!set.schedules.contains_key("biweekly"));
        assert!(!set.schedules.contains_key("balloon_20"));
        assert!(set.schedules.contains_key("standard"));
        assert_eq!(set.summary.len(), 2);
    }

    #[test]
    fn test_scenarios_use_cache() {
        let time = test_time();
        let mut cache = CacheManager::new(&time);
        let service = AdvancedAmortizationService::default();

        let first = service
            .generate_alternative_scenarios(&request(), &ScenarioOptions::default(), Some(&mut cache))
            .unwrap();
        assert_eq!(cache.stats().sets, 4);
        assert_eq!(cache.stats().misses, 4);

        let second = service
            .generate_alternative_scenarios(&request(), &ScenarioOptions::default(), Some(&mut cache))
            .unwrap();
        assert_eq!(cache.stats().hits, 4);
        assert_eq!(cache.stats().sets, 4);
        assert_eq!(first, second);

        assert!(cache.keys().iter().all(|k| k.starts_with("scenario_")));
    }

    #[test]
    fn test_compare_scenarios() {
        let service = AdvancedAmortizationService::default();
        let set = service
            .generate_alternative_scenarios(&request(), &ScenarioOptions::default(), None)
            .unwrap();

        let costs = service.compare_scenarios(&set.schedules);
        assert_eq!(costs.len(), 4);
        for pair in costs.windows(2) {
            assert!(pair[0].total_cost <= pair[1].total_cost);
        }

        // paying every two weeks over the same horizon is cheapest; stepping the
        // rate up is the most expensive
        assert_eq!(costs[0].name, "biweekly");
        assert_eq!(costs[3].name, "variable_rate");
    }
}

/// portfolio cache - memoised aggregates with controlled time
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use loan_amortization_rs::{Loan, Money, PaymentFrequency, PortfolioCache, Rate, SafeTimeProvider, TimeSource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== portfolio cache ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
    let controller = time.test_control().unwrap();

    let start = NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("bad date")?;
    let loans = vec![
        Loan::new(Money::from_major(300_000), Rate::from_percentage(5), 360, PaymentFrequency::Monthly, start),
        Loan::new(Money::from_major(40_000), Rate::from_percentage(9), 60, PaymentFrequency::Monthly, start),
        Loan::new(Money::from_major(15_000), Rate::from_percentage(14), 104, PaymentFrequency::Biweekly, start),
    ];

    let mut cache = PortfolioCache::new(&time);
    cache.cache_mut().set_default_ttl(300)?;

    let report = cache.portfolio_report(&loans)?;
    println!("loans: {}, outstanding ${}", report.loan_count, report.total_outstanding);
    println!("weighted average rate: {}", report.weighted_average_rate);

    let risk = cache.risk_profile(&loans)?;
    println!("largest exposure share: {}", risk.largest_exposure_share);
    println!("high rate exposure: ${}", risk.high_rate_exposure);

    let payments = cache.payment_summary(&loans)?;
    println!("monthly equivalent payments: ${}", payments.monthly_equivalent);

    // served from cache
    cache.portfolio_report(&loans)?;
    println!("\nafter repeat lookup: {:?}", cache.cache().stats());

    // entries expire after five minutes
    controller.advance(Duration::minutes(6));
    cache.portfolio_report(&loans)?;
    println!("after expiry:        {:?}", cache.cache().stats());

    let removed = cache.invalidate_all()?;
    println!("invalidated {} entries", removed);

    Ok(())
}

/// schedule mutations - prepayments, skips, rate changes and scenarios
use chrono::NaiveDate;
use loan_amortization_rs::{
    AdvancedAmortizationService, AmortizationConfig, Loan, LoanEvent, LoanEventKind, LoanService,
    MemoryDataProvider, Money, PaymentFrequency, Rate, RecalculationStrategy, ScenarioOptions, ScheduleRequest,
    TermModification,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== schedule mutations ===\n");

    let start = NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("bad date")?;
    let service = AdvancedAmortizationService::default();
    let request = ScheduleRequest::new(Money::from_major(100_000), Rate::from_percentage(6), PaymentFrequency::Monthly, 360)
        .start_date(start);
    let schedule = service.standard_schedule(&request)?;
    println!("standard: {} payments, ${} interest", schedule.len(), schedule.total_interest());

    // lump sum after the first year
    let shorter = service.apply_prepayment(&schedule, 12, Money::from_major(10_000), RecalculationStrategy::ReduceTerm)?;
    println!(
        "prepay $10,000 keeping the payment: {} payments, ${} interest",
        shorter.len(),
        shorter.total_interest()
    );

    let cheaper = service.apply_prepayment(&schedule, 12, Money::from_major(10_000), RecalculationStrategy::ReduceEmi)?;
    println!("prepay $10,000 keeping the term: payment drops to ${}", cheaper.rows[12].payment_amount);

    // payment holiday
    let skipped = service.skip_payment(&schedule, 6, true)?;
    println!("skip payment 6: {} payments", skipped.len());

    // rate reset after five years
    let reset = service.modify_terms(&schedule, 61, &TermModification::rate(Rate::from_percentage(8)))?;
    println!("rate reset to 8% at payment 61: payment ${}", reset.rows[60].payment_amount);

    // scenarios
    let scenarios = service.generate_alternative_scenarios(&request, &ScenarioOptions::default(), None)?;
    println!("\nscenarios, cheapest first:");
    for cost in service.compare_scenarios(&scenarios.schedules) {
        println!("  {:<14} ${} over {} payments", cost.name, cost.total_cost, cost.num_payments);
    }

    // events against stored schedules
    let mut provider = MemoryDataProvider::new();
    let loan_id = provider.add_loan(Loan::new(
        Money::from_major(20_000),
        Rate::from_percentage(7),
        48,
        PaymentFrequency::Monthly,
        start,
    ));
    let mut loans = LoanService::new(provider, AmortizationConfig::default());
    loans.create_schedule(loan_id)?;

    let event = LoanEvent::new(
        loan_id,
        NaiveDate::from_ymd_opt(2024, 7, 1).ok_or("bad date")?,
        LoanEventKind::ExtraPayment {
            amount: Money::from_major(2_500),
        },
    );
    let updated = loans.apply_event(loan_id, event)?;
    println!("\nstored loan after extra payment: {} payments", updated.len());

    Ok(())
}

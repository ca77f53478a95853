/// quick start - payments, interest and a schedule
use chrono::NaiveDate;
use loan_amortization_rs::interest::{effective_annual_rate, simple_interest};
use loan_amortization_rs::serialization::ScheduleView;
use loan_amortization_rs::{Money, PaymentCalculator, PaymentFrequency, Rate, ScheduleCalculator, ScheduleRequest};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== quick start ===\n");

    let principal = Money::from_major(250_000);
    let rate = Rate::from_percent(dec!(6.5));

    // level payment for each frequency
    let calculator = PaymentCalculator::default();
    let monthly = calculator.calculate(principal, rate, PaymentFrequency::Monthly, 360)?;
    let biweekly = calculator.calculate_named(principal, rate, "bi-weekly", 780)?;
    println!("monthly payment:  ${}", monthly);
    println!("biweekly payment: ${}", biweekly);

    // interest helpers
    let apy = effective_annual_rate(rate, PaymentFrequency::Monthly)?;
    println!("apy at monthly compounding: {}", apy);
    let simple = simple_interest(principal, rate, dec!(1))?;
    println!("one year of simple interest: ${}", simple.round_cents());

    // full schedule
    let request = ScheduleRequest::new(principal, rate, PaymentFrequency::Monthly, 360)
        .start_date(NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("bad date")?);
    let schedule = ScheduleCalculator::default().generate(&request)?;

    println!("\nfirst three payments:");
    for row in schedule.rows.iter().take(3) {
        println!(
            "  #{} {} payment ${} principal ${} interest ${} balance ${}",
            row.payment_number,
            row.payment_date,
            row.payment_amount,
            row.principal_portion,
            row.interest_portion,
            row.ending_balance
        );
    }
    println!("total interest: ${}", schedule.total_interest());
    println!("final balance:  ${}", schedule.final_balance());

    // export
    let view = ScheduleView::from_schedule(&schedule);
    let json = view.to_json()?;
    println!("\nexported {} bytes of json", json.len());

    Ok(())
}

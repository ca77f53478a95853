/// serializable export views of schedules
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::Result;
use crate::payments::{Schedule, ScheduleRow};

/// one schedule row with export field names and money rounded to cents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRowView {
    pub payment_number: u32,
    /// ISO 8601 date
    pub payment_date: String,
    pub beginning_balance: Money,
    pub payment_amount: Money,
    pub principal_payment: Money,
    pub interest_payment: Money,
    pub ending_balance: Money,
}

impl ScheduleRowView {
    pub fn from_row(row: &ScheduleRow) -> Self {
        ScheduleRowView {
            payment_number: row.payment_number,
            payment_date: row.payment_date.format("%Y-%m-%d").to_string(),
            beginning_balance: row.beginning_balance.round_cents(),
            payment_amount: row.payment_amount.round_cents(),
            principal_payment: row.principal_portion.round_cents(),
            interest_payment: row.interest_portion.round_cents(),
            ending_balance: row.ending_balance.round_cents(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTotalsView {
    pub number_of_payments: usize,
    pub total_payment: Money,
    pub total_principal: Money,
    pub total_interest: Money,
}

/// whole schedule for export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleView {
    pub principal: Money,
    pub annual_rate: Rate,
    pub frequency: String,
    pub payment_amount: Money,
    pub totals: ScheduleTotalsView,
    pub rows: Vec<ScheduleRowView>,
}

impl ScheduleView {
    pub fn from_schedule(schedule: &Schedule) -> Self {
        ScheduleView {
            principal: schedule.principal.round_cents(),
            annual_rate: schedule.annual_rate,
            frequency: schedule.frequency.to_string(),
            payment_amount: schedule.payment_amount.round_cents(),
            totals: ScheduleTotalsView {
                number_of_payments: schedule.len(),
                total_payment: schedule.total_payment().round_cents(),
                total_principal: schedule.total_principal().round_cents(),
                total_interest: schedule.total_interest().round_cents(),
            },
            rows: schedule.rows.iter().map(ScheduleRowView::from_row).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// export rows as a json array
pub fn rows_to_json(schedule: &Schedule) -> Result<String> {
    let rows: Vec<ScheduleRowView> = schedule.rows.iter().map(ScheduleRowView::from_row).collect();
    Ok(serde_json::to_string(&rows)?)
}

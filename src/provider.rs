use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::AmortizationConfig;
use crate::errors::{AmortizationError, Result};
use crate::events::{LoanEvent, LoanEventLog};
use crate::payments::{AdvancedAmortizationService, Schedule, ScheduleRequest, ScheduleRow};
use crate::types::{Loan, LoanId};

/// a schedule row as persisted by a data provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredScheduleRow {
    pub id: u64,
    pub loan_id: LoanId,
    pub row: ScheduleRow,
}

/// storage the loan service reads loans from and writes schedules to
pub trait DataProvider {
    fn get_loan(&self, loan_id: LoanId) -> Result<Loan>;

    /// persist one row, returning its storage id
    fn insert_schedule(&mut self, loan_id: LoanId, row: &ScheduleRow) -> Result<u64>;

    fn insert_loan_event(&mut self, event: &LoanEvent) -> Result<()>;

    /// rows dated strictly after `date`, ordered by payment number
    fn get_schedule_rows_after_date(&self, loan_id: LoanId, date: NaiveDate) -> Result<Vec<StoredScheduleRow>>;

    fn update_schedule_row(&mut self, row_id: u64, row: &ScheduleRow) -> Result<()>;

    /// delete rows dated strictly after `date`, returning how many were removed
    fn delete_schedule_after_date(&mut self, loan_id: LoanId, date: NaiveDate) -> Result<usize>;
}

/// in-memory provider
#[derive(Debug, Clone, Default)]
pub struct MemoryDataProvider {
    loans: HashMap<LoanId, Loan>,
    rows: BTreeMap<u64, StoredScheduleRow>,
    events: Vec<LoanEvent>,
    next_row_id: u64,
}

impl MemoryDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_loan(&mut self, loan: Loan) -> LoanId {
        let id = loan.id;
        self.loans.insert(id, loan);
        id
    }

    pub fn events(&self) -> &[LoanEvent] {
        &self.events
    }

    pub fn row_count(&self, loan_id: LoanId) -> usize {
        self.rows.values().filter(|r| r.loan_id == loan_id).count()
    }
}

impl DataProvider for MemoryDataProvider {
    fn get_loan(&self, loan_id: LoanId) -> Result<Loan> {
        self.loans
            .get(&loan_id)
            .cloned()
            .ok_or(AmortizationError::LoanNotFound { id: loan_id })
    }

    fn insert_schedule(&mut self, loan_id: LoanId, row: &ScheduleRow) -> Result<u64> {
        self.next_row_id += 1;
        let id = self.next_row_id;
        self.rows.insert(
            id,
            StoredScheduleRow {
                id,
                loan_id,
                row: row.clone(),
            },
        );
        Ok(id)
    }

    fn insert_loan_event(&mut self, event: &LoanEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }

    fn get_schedule_rows_after_date(&self, loan_id: LoanId, date: NaiveDate) -> Result<Vec<StoredScheduleRow>> {
        let mut rows: Vec<StoredScheduleRow> = self
            .rows
            .values()
            .filter(|r| r.loan_id == loan_id && r.row.payment_date > date)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.row.payment_number);
        Ok(rows)
    }

    fn update_schedule_row(&mut self, row_id: u64, row: &ScheduleRow) -> Result<()> {
        let stored = self
            .rows
            .get_mut(&row_id)
            .ok_or(AmortizationError::ScheduleRowNotFound { id: row_id })?;
        stored.row = row.clone();
        Ok(())
    }

    fn delete_schedule_after_date(&mut self, loan_id: LoanId, date: NaiveDate) -> Result<usize> {
        let before = self.rows.len();
        self.rows
            .retain(|_, r| !(r.loan_id == loan_id && r.row.payment_date > date));
        Ok(before - self.rows.len())
    }
}

/// generates, stores and updates loan schedules through a [`DataProvider`]
pub struct LoanService<P: DataProvider> {
    provider: P,
    service: AdvancedAmortizationService,
    events: LoanEventLog,
}

impl<P: DataProvider> LoanService<P> {
    pub fn new(provider: P, config: AmortizationConfig) -> Self {
        Self {
            provider,
            service: AdvancedAmortizationService::new(config),
            events: LoanEventLog::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn event_log(&self) -> &LoanEventLog {
        &self.events
    }

    /// generate the loan's schedule and persist every row
    pub fn create_schedule(&mut self, loan_id: LoanId) -> Result<Schedule> {
        let loan = self.provider.get_loan(loan_id)?;
        let request = ScheduleRequest::new(loan.principal, loan.annual_rate, loan.frequency, loan.term_periods)
            .start_date(loan.start_date);
        let schedule = self.service.standard_schedule(&request)?;

        for row in &schedule.rows {
            self.provider.insert_schedule(loan_id, row)?;
        }

        log::info!("stored {} schedule rows for loan {}", schedule.len(), loan_id);
        Ok(schedule)
    }

    /// rebuild the persisted schedule of a loan
    pub fn stored_schedule(&self, loan_id: LoanId) -> Result<Schedule> {
        let loan = self.provider.get_loan(loan_id)?;
        let rows: Vec<ScheduleRow> = self
            .provider
            .get_schedule_rows_after_date(loan_id, loan.start_date)?
            .into_iter()
            .map(|stored| stored.row)
            .collect();

        // a skipped row carries no payment; the first paid one sets the level
        let payment_amount = rows
            .iter()
            .find(|row| !row.flags.skipped)
            .or_else(|| rows.first())
            .map(ScheduleRow::regular_payment)
            .ok_or_else(|| AmortizationError::InvalidArgument {
                message: format!("no schedule stored for loan {}", loan_id),
            })?;

        Ok(Schedule {
            principal: loan.principal,
            annual_rate: loan.annual_rate,
            frequency: loan.frequency,
            interest_frequency: None,
            start_date: loan.start_date,
            payment_amount,
            balloon: None,
            rows,
        })
    }

    /// apply `event` to the stored schedule, rewrite the affected rows and
    /// keep the event as processed. Nothing is written if the event fails.
    pub fn apply_event(&mut self, loan_id: LoanId, event: LoanEvent) -> Result<Schedule> {
        if event.loan_id != loan_id {
            return Err(AmortizationError::InvalidArgument {
                message: format!("event {} belongs to loan {}, not {}", event.id, event.loan_id, loan_id),
            });
        }

        let updated = self.rewrite_schedule(loan_id, &event)?;

        let event_id = self.events.record(event);
        self.events.mark_processed(event_id)?;
        if let Some(processed) = self.events.get(event_id) {
            self.provider.insert_loan_event(processed)?;
        }

        Ok(updated)
    }

    /// queue an event for a later [`process_pending`](Self::process_pending)
    pub fn record_event(&mut self, event: LoanEvent) -> uuid::Uuid {
        self.events.record(event)
    }

    /// apply every unprocessed event of the loan in effective date order
    pub fn process_pending(&mut self, loan_id: LoanId) -> Result<usize> {
        let pending: Vec<LoanEvent> = self
            .events
            .pending()
            .into_iter()
            .filter(|e| e.loan_id == loan_id)
            .cloned()
            .collect();

        for event in &pending {
            self.rewrite_schedule(loan_id, event)?;
            self.events.mark_processed(event.id)?;
            if let Some(processed) = self.events.get(event.id) {
                self.provider.insert_loan_event(processed)?;
            }
        }

        Ok(pending.len())
    }

    fn rewrite_schedule(&mut self, loan_id: LoanId, event: &LoanEvent) -> Result<Schedule> {
        let loan = self.provider.get_loan(loan_id)?;
        let stored = self.provider.get_schedule_rows_after_date(loan_id, loan.start_date)?;
        let current = self.stored_schedule(loan_id)?;

        let payment_number = self.service.event_payment_number(&current, event)?;
        let updated = self.service.apply_event(&current, event)?;

        let index = (payment_number - 1) as usize;
        let (affected, replacement) = match (stored.get(index), updated.rows.get(index)) {
            (Some(affected), Some(replacement)) => (affected, replacement),
            _ => {
                return Err(AmortizationError::PaymentNumberOutOfRange {
                    payment_number,
                    schedule_len: stored.len(),
                })
            }
        };

        self.provider.update_schedule_row(affected.id, replacement)?;
        let deleted = self
            .provider
            .delete_schedule_after_date(loan_id, affected.row.payment_date)?;
        for row in &updated.rows[index + 1..] {
            self.provider.insert_schedule(loan_id, row)?;
        }

        log::info!(
            "applied {} event {} to loan {} at payment {}: replaced {} rows with {}",
            event.kind.name(),
            event.id,
            loan_id,
            payment_number,
            deleted,
            updated.len() - index - 1
        );

        Ok(updated)
    }
}

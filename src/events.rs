use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{AmortizationError, Result};
use crate::payments::TermModification;
use crate::types::LoanId;

/// what happened to a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoanEventKind {
    ExtraPayment { amount: Money },
    SkipPayment { capitalize_interest: bool },
    RateChange { new_rate: Rate },
    LoanModification(TermModification),
}

impl LoanEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            LoanEventKind::ExtraPayment { .. } => "extra_payment",
            LoanEventKind::SkipPayment { .. } => "skip_payment",
            LoanEventKind::RateChange { .. } => "rate_change",
            LoanEventKind::LoanModification(_) => "loan_modification",
        }
    }
}

/// an event against a loan, effective from a date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanEvent {
    pub id: Uuid,
    pub loan_id: LoanId,
    pub effective_date: NaiveDate,
    pub kind: LoanEventKind,
    pub processed: bool,
}

impl LoanEvent {
    pub fn new(loan_id: LoanId, effective_date: NaiveDate, kind: LoanEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            effective_date,
            kind,
            processed: false,
        }
    }
}

/// append-only log of loan events
#[derive(Debug, Clone, Default)]
pub struct LoanEventLog {
    events: Vec<LoanEvent>,
}

impl LoanEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: LoanEvent) -> Uuid {
        let id = event.id;
        log::debug!("recorded {} event {} for loan {}", event.kind.name(), id, event.loan_id);
        self.events.push(event);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<&LoanEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    /// unprocessed events ordered by effective date, then by recording order
    pub fn pending(&self) -> Vec<&LoanEvent> {
        let mut pending: Vec<&LoanEvent> = self.events.iter().filter(|e| !e.processed).collect();
        pending.sort_by_key(|e| e.effective_date);
        pending
    }

    pub fn for_loan(&self, loan_id: LoanId) -> Vec<&LoanEvent> {
        self.events.iter().filter(|e| e.loan_id == loan_id).collect()
    }

    pub fn mark_processed(&mut self, id: Uuid) -> Result<()> {
        let event = self
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(AmortizationError::EventNotFound { id })?;
        event.processed = true;
        Ok(())
    }

    pub fn events(&self) -> &[LoanEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

use thiserror::Error;
use uuid::Uuid;

use crate::decimal::{Money, Rate};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmortizationError {
    #[error("invalid principal: {principal}, must be positive")]
    InvalidPrincipal {
        principal: Money,
    },

    #[error("invalid interest rate: {rate}")]
    InvalidInterestRate {
        rate: Rate,
    },

    #[error("invalid number of payments: {count}")]
    InvalidPaymentCount {
        count: u32,
    },

    #[error("unknown payment frequency: {value}")]
    UnknownFrequency {
        value: String,
    },

    #[error("payment number {payment_number} out of range 1..={schedule_len}")]
    PaymentNumberOutOfRange {
        payment_number: u32,
        schedule_len: usize,
    },

    #[error("invalid payment amount: {amount}")]
    InvalidPaymentAmount {
        amount: Money,
    },

    #[error("prepayment {amount} must be less than outstanding balance {balance}")]
    PrepaymentExceedsBalance {
        amount: Money,
        balance: Money,
    },

    #[error("invalid balloon payment {balloon} for principal {principal}")]
    InvalidBalloon {
        balloon: Money,
        principal: Money,
    },

    #[error("payment {payment} does not cover periodic interest {interest}")]
    PaymentBelowInterest {
        payment: Money,
        interest: Money,
    },

    #[error("loan already paid off at payment {payment_number}")]
    LoanPaidOff {
        payment_number: u32,
    },

    #[error("invalid argument: {message}")]
    InvalidArgument {
        message: String,
    },

    #[error("invalid cache key: {message}")]
    InvalidCacheKey {
        message: String,
    },

    #[error("invalid ttl: {ttl} seconds, must be positive")]
    InvalidTtl {
        ttl: i64,
    },

    #[error("invalid key pattern {pattern}: {message}")]
    InvalidPattern {
        pattern: String,
        message: String,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("loan not found: {id}")]
    LoanNotFound {
        id: Uuid,
    },

    #[error("loan event not found: {id}")]
    EventNotFound {
        id: Uuid,
    },

    #[error("schedule row not found: {id}")]
    ScheduleRowNotFound {
        id: u64,
    },

    #[error("calculation error: {message}")]
    CalculationError {
        message: String,
    },

    #[error("serialization error: {message}")]
    Serialization {
        message: String,
    },
}

impl AmortizationError {
    /// caller supplied bad input; never retried
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            AmortizationError::InvalidPrincipal { .. }
                | AmortizationError::InvalidInterestRate { .. }
                | AmortizationError::InvalidPaymentCount { .. }
                | AmortizationError::UnknownFrequency { .. }
                | AmortizationError::PaymentNumberOutOfRange { .. }
                | AmortizationError::InvalidPaymentAmount { .. }
                | AmortizationError::PrepaymentExceedsBalance { .. }
                | AmortizationError::InvalidBalloon { .. }
                | AmortizationError::PaymentBelowInterest { .. }
                | AmortizationError::LoanPaidOff { .. }
                | AmortizationError::InvalidArgument { .. }
                | AmortizationError::InvalidCacheKey { .. }
                | AmortizationError::InvalidTtl { .. }
                | AmortizationError::InvalidPattern { .. }
                | AmortizationError::InvalidDate { .. }
                | AmortizationError::InvalidConfiguration { .. }
        )
    }

    /// referenced loan, event or row is absent
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AmortizationError::LoanNotFound { .. }
                | AmortizationError::EventNotFound { .. }
                | AmortizationError::ScheduleRowNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for AmortizationError {
    fn from(err: serde_json::Error) -> Self {
        AmortizationError::Serialization {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AmortizationError>;

pub mod cache;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod interest;
pub mod payments;
pub mod provider;
pub mod serialization;
pub mod types;

// re-export key types
pub use cache::{CacheManager, CacheStats, EntryMetadata, PaymentSummary, PortfolioCache, PortfolioReport, RiskProfile};
pub use config::{AmortizationConfig, CacheConfig, ScenarioConfig};
pub use decimal::{Money, Rate};
pub use errors::{AmortizationError, Result};
pub use events::{LoanEvent, LoanEventKind, LoanEventLog};
pub use interest::DayCountConvention;
pub use payments::{
    AdvancedAmortizationService, PaymentCalculator, RowFlags, ScenarioCost, ScenarioOptions, ScenarioSet,
    ScenarioSummary, Schedule, ScheduleCalculator, ScheduleRequest, ScheduleRow, TermModification,
};
pub use provider::{DataProvider, LoanService, MemoryDataProvider, StoredScheduleRow};
pub use serialization::{ScheduleRowView, ScheduleView};
pub use types::{Loan, LoanId, PaymentFrequency, RecalculationStrategy};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;

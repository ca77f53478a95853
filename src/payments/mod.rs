pub mod advanced;
pub mod calculator;
pub mod scenarios;
pub mod schedule;

pub use advanced::{AdvancedAmortizationService, TermModification};
pub use calculator::PaymentCalculator;
pub use scenarios::{ScenarioCost, ScenarioOptions, ScenarioSet, ScenarioSummary};
pub use schedule::{RowFlags, Schedule, ScheduleCalculator, ScheduleRequest, ScheduleRow};

pub mod book;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod interest;
pub mod ledger;
pub mod loan;
pub mod payments;
pub mod reconcile;
pub mod schedule;
pub mod status;
pub mod types;

// re-export key types
pub use book::LoanBook;
pub use config::{EngineConfig, LoanTerms, LoanTermsBuilder, PenaltyPolicy};
pub use decimal::{Money, Rate};
pub use errors::{LedgerError, Result};
pub use events::{Event, EventStore};
pub use interest::{InterestPlan, PenaltyAssessment, PenaltyEngine};
pub use ledger::{DueCheckpoint, LedgerAggregate, LedgerEvent, PaymentPosting};
pub use loan::LoanAccount;
pub use payments::{
    Allocation, AllocationContext, CumulativeTotals, Obligations, Payment, PaymentAllocator,
    PaymentRequest, WaterfallSplit,
};
pub use reconcile::{DriftReport, FieldDrift, Reconciler, Reconciliation};
pub use schedule::{Installment, Schedule, ScheduleGenerator, ScheduleSummary};
pub use status::StatusClassifier;
pub use types::{
    DisbursementStatus, InstallmentStatus, InterestMethodKind, LoanId, LoanStatus, PaymentId,
    PaymentStatus, RepaymentFrequency, TimeUnit,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;

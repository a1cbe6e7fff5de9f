use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{InterestMethodKind, LoanId, LoanStatus, PaymentId};

/// all events that can be emitted by a loan account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    ScheduleGenerated {
        loan_id: LoanId,
        method: InterestMethodKind,
        installments: u32,
        total_payable: Money,
        maturity_date: NaiveDate,
    },
    LoanDisbursed {
        loan_id: LoanId,
        principal: Money,
        date: NaiveDate,
    },
    LoanCancelled {
        loan_id: LoanId,
        date: NaiveDate,
    },

    // payment events
    PaymentAllocated {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        penalty: Money,
        fees: Money,
        interest: Money,
        principal: Money,
        overpayment: Money,
        installments: Vec<u32>,
        date: NaiveDate,
    },
    PaymentReversed {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        date: NaiveDate,
    },
    PaymentCancelled {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        date: NaiveDate,
    },
    InstallmentOverdue {
        loan_id: LoanId,
        installment_number: u32,
        due_date: NaiveDate,
        outstanding: Money,
        date: NaiveDate,
    },

    // status events
    StatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        date: NaiveDate,
    },
    DefaultFlagRaised {
        loan_id: LoanId,
        days_late: i64,
        date: NaiveDate,
    },

    // reconciliation events
    LedgerRebuilt {
        loan_id: LoanId,
        reason: String,
        date: NaiveDate,
    },
    DriftDetected {
        loan_id: LoanId,
        fields: Vec<String>,
        date: NaiveDate,
    },
}

impl Event {
    pub fn loan_id(&self) -> LoanId {
        match self {
            Event::ScheduleGenerated { loan_id, .. }
            | Event::LoanDisbursed { loan_id, .. }
            | Event::LoanCancelled { loan_id, .. }
            | Event::PaymentAllocated { loan_id, .. }
            | Event::PaymentReversed { loan_id, .. }
            | Event::PaymentCancelled { loan_id, .. }
            | Event::InstallmentOverdue { loan_id, .. }
            | Event::StatusChanged { loan_id, .. }
            | Event::DefaultFlagRaised { loan_id, .. }
            | Event::LedgerRebuilt { loan_id, .. }
            | Event::DriftDetected { loan_id, .. } => *loan_id,
        }
    }
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

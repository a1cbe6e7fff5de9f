use thiserror::Error;

use crate::decimal::Money;
use crate::types::{DisbursementStatus, LoanId, PaymentId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("invalid terms for loan {loan_id}: {message}")]
    InvalidTerms {
        loan_id: LoanId,
        message: String,
    },

    #[error("invalid payment {payment:?} for loan {loan_id}: {message}")]
    InvalidPayment {
        loan_id: LoanId,
        payment: Option<PaymentId>,
        message: String,
    },

    #[error("installment {installment_number} does not belong to loan {loan_id}")]
    UnknownInstallment {
        loan_id: LoanId,
        installment_number: u32,
    },

    #[error("inconsistent ledger for loan {loan_id}: {field} expected {expected}, found {actual}")]
    InconsistentAggregate {
        loan_id: LoanId,
        field: &'static str,
        expected: Money,
        actual: Money,
    },

    #[error("loan {loan_id} is already closed")]
    AlreadyClosed {
        loan_id: LoanId,
    },

    #[error("loan {loan_id} is already defaulted")]
    AlreadyDefaulted {
        loan_id: LoanId,
    },

    #[error("loan {loan_id} not active: current disbursement status is {status:?}")]
    LoanNotActive {
        loan_id: LoanId,
        status: DisbursementStatus,
    },

    #[error("loan not found: {loan_id}")]
    LoanNotFound {
        loan_id: LoanId,
    },

    #[error("loan already registered: {loan_id}")]
    DuplicateLoan {
        loan_id: LoanId,
    },

    #[error("payment {payment_id} not found on loan {loan_id}")]
    PaymentNotFound {
        loan_id: LoanId,
        payment_id: PaymentId,
    },

    #[error("invalid state for loan {loan_id}: current {current}, expected {expected}")]
    InvalidState {
        loan_id: LoanId,
        current: String,
        expected: String,
    },

    #[error("lock poisoned for loan {loan_id}")]
    LockPoisoned {
        loan_id: LoanId,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

impl LedgerError {
    /// loan the error refers to, when there is one
    pub fn loan_id(&self) -> Option<LoanId> {
        match self {
            LedgerError::InvalidTerms { loan_id, .. }
            | LedgerError::InvalidPayment { loan_id, .. }
            | LedgerError::UnknownInstallment { loan_id, .. }
            | LedgerError::InconsistentAggregate { loan_id, .. }
            | LedgerError::AlreadyClosed { loan_id }
            | LedgerError::AlreadyDefaulted { loan_id }
            | LedgerError::LoanNotActive { loan_id, .. }
            | LedgerError::LoanNotFound { loan_id }
            | LedgerError::DuplicateLoan { loan_id }
            | LedgerError::PaymentNotFound { loan_id, .. }
            | LedgerError::InvalidState { loan_id, .. }
            | LedgerError::LockPoisoned { loan_id } => Some(*loan_id),
            LedgerError::InvalidConfiguration { .. } => None,
        }
    }

    /// business rule violations surfaced to the caller as-is
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            LedgerError::AlreadyClosed { .. }
                | LedgerError::AlreadyDefaulted { .. }
                | LedgerError::LoanNotActive { .. }
        )
    }

    /// data-consistency errors, repaired by a rebuild rather than a retry
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, LedgerError::InconsistentAggregate { .. })
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

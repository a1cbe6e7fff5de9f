use chrono::NaiveDate;

use crate::decimal::Money;
use crate::schedule::Schedule;
use crate::types::InstallmentStatus;

use super::Payment;

/// fill installments with the scheduled portion of a payment
///
/// starts at the payment's installment, spills into later ones, then wraps to
/// any earlier installment still open. each installment is filled fee first,
/// then interest, then principal. returns the numbers of installments touched.
pub fn apply_payment(schedule: &mut Schedule, payment: &Payment) -> Vec<u32> {
    let mut remaining = payment.scheduled_portion();
    let mut touched = Vec::new();
    if !remaining.is_positive() {
        return touched;
    }

    let count = schedule.installments.len();
    let start = (payment.installment_number.max(1) as usize - 1).min(count.saturating_sub(1));
    let order = (start..count).chain(0..start);

    for index in order {
        if !remaining.is_positive() {
            break;
        }
        let installment = &mut schedule.installments[index];
        if installment.is_settled() {
            continue;
        }

        let fee = remaining.min(installment.remaining_fee());
        remaining -= fee;
        let interest = remaining.min(installment.remaining_interest());
        remaining -= interest;
        let principal = remaining.min(installment.remaining_principal());
        remaining -= principal;

        let taken = fee + interest + principal;
        if taken.is_zero() {
            continue;
        }

        installment.fee_paid += fee;
        installment.interest_paid += interest;
        installment.principal_paid += principal;
        installment.paid_amount += taken;
        installment.outstanding_amount = installment.scheduled_amount.saturating_sub(installment.paid_amount);
        installment.paid_date = Some(payment.payment_date);
        installment.payment_id = Some(payment.id);
        installment.is_late |= payment.payment_date > installment.lateness_anchor();
        installment.is_early |= payment.payment_date < installment.due_date;

        if installment.outstanding_amount.is_zero() {
            installment.status = InstallmentStatus::Paid;
            installment.is_partial = false;
        } else {
            installment.status = InstallmentStatus::Partial;
            installment.is_partial = true;
        }

        touched.push(installment.number);
    }

    touched
}

/// re-derive date-driven statuses of unpaid installments
///
/// returns the numbers of installments that just became overdue.
pub fn refresh_statuses(schedule: &mut Schedule, today: NaiveDate) -> Vec<u32> {
    let mut newly_overdue = Vec::new();

    for installment in schedule.installments.iter_mut().filter(|i| !i.is_settled()) {
        let status = if today > installment.lateness_anchor() {
            InstallmentStatus::Overdue
        } else if today > installment.due_date {
            InstallmentStatus::GracePeriod
        } else if installment.paid_amount > Money::ZERO {
            InstallmentStatus::Partial
        } else {
            InstallmentStatus::Pending
        };

        if status == InstallmentStatus::Overdue && installment.status != InstallmentStatus::Overdue {
            newly_overdue.push(installment.number);
        }
        installment.status = status;
    }

    newly_overdue
}

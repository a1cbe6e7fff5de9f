use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const SCORE_MAX: Decimal = dec!(100);
const LATE_WEIGHT: Decimal = dec!(30);
const ON_TIME_WEIGHT: Decimal = dec!(10);
const EARLY_WEIGHT: Decimal = dec!(5);
const MISSED_WEIGHT: Decimal = dec!(10);

const RISK_DAYS_LATE_FACTOR: Decimal = dec!(0.5);
const RISK_DAYS_LATE_CAP: Decimal = dec!(30);
const RISK_MISSED_FACTOR: Decimal = dec!(10);
const RISK_MISSED_CAP: Decimal = dec!(30);
const RISK_LATE_RATIO_WEIGHT: Decimal = dec!(20);
const RISK_BEHAVIOR_FACTOR: Decimal = dec!(0.2);

/// counters the scores are derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreInputs {
    pub installments_paid: u32,
    pub late_payments: u32,
    pub on_time_payments: u32,
    pub early_payments: u32,
    pub missed_payments: u32,
    pub days_late: i64,
}

impl ScoreInputs {
    fn share(&self, count: u32) -> Decimal {
        if self.installments_paid == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(count) / Decimal::from(self.installments_paid)
        }
    }
}

fn clamp(score: Decimal) -> Decimal {
    score.max(Decimal::ZERO).min(SCORE_MAX).round_dp(2)
}

/// payment behaviour, 0 to 100, higher is better
pub fn behavior_score(inputs: &ScoreInputs) -> Decimal {
    let score = SCORE_MAX - LATE_WEIGHT * inputs.share(inputs.late_payments)
        + ON_TIME_WEIGHT * inputs.share(inputs.on_time_payments)
        + EARLY_WEIGHT * inputs.share(inputs.early_payments)
        - MISSED_WEIGHT * Decimal::from(inputs.missed_payments);
    clamp(score)
}

/// default risk, 0 to 100, higher is worse
pub fn default_risk_score(inputs: &ScoreInputs, behavior: Decimal) -> Decimal {
    let days_late = Decimal::from(inputs.days_late.max(0));
    let lateness = (days_late * RISK_DAYS_LATE_FACTOR).min(RISK_DAYS_LATE_CAP);
    let missed = (Decimal::from(inputs.missed_payments) * RISK_MISSED_FACTOR).min(RISK_MISSED_CAP);
    let late_ratio = inputs.share(inputs.late_payments) * RISK_LATE_RATIO_WEIGHT;
    let behavior_gap = (SCORE_MAX - behavior) * RISK_BEHAVIOR_FACTOR;
    clamp(lateness + missed + late_ratio + behavior_gap)
}

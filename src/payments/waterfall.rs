use serde::{Deserialize, Serialize};

use crate::decimal::Money;

/// waterfall buckets, in the order they are settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WaterfallBucket {
    Penalty = 1,
    Fees = 2,
    Interest = 3,
    Principal = 4,
}

impl WaterfallBucket {
    pub const ORDER: [WaterfallBucket; 4] = [
        WaterfallBucket::Penalty,
        WaterfallBucket::Fees,
        WaterfallBucket::Interest,
        WaterfallBucket::Principal,
    ];
}

/// what is still owed in each bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Obligations {
    pub penalty: Money,
    pub fees: Money,
    pub interest: Money,
    pub principal: Money,
}

impl Obligations {
    pub fn total(&self) -> Money {
        self.penalty + self.fees + self.interest + self.principal
    }

    fn owed(&self, bucket: WaterfallBucket) -> Money {
        match bucket {
            WaterfallBucket::Penalty => self.penalty,
            WaterfallBucket::Fees => self.fees,
            WaterfallBucket::Interest => self.interest,
            WaterfallBucket::Principal => self.principal,
        }
        .max(Money::ZERO)
    }
}

/// result of running an amount down the waterfall
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct WaterfallSplit {
    pub penalty: Money,
    pub fees: Money,
    pub interest: Money,
    pub principal: Money,
    /// left over once every bucket is settled
    pub excess: Money,
}

impl WaterfallSplit {
    pub fn applied(&self) -> Money {
        self.penalty + self.fees + self.interest + self.principal
    }

    fn slot(&mut self, bucket: WaterfallBucket) -> &mut Money {
        match bucket {
            WaterfallBucket::Penalty => &mut self.penalty,
            WaterfallBucket::Fees => &mut self.fees,
            WaterfallBucket::Interest => &mut self.interest,
            WaterfallBucket::Principal => &mut self.principal,
        }
    }
}

/// penalty → fees → interest → principal, each capped at what it is owed
pub fn split(amount: Money, owed: &Obligations) -> WaterfallSplit {
    let mut remaining = amount.max(Money::ZERO);
    let mut result = WaterfallSplit::default();

    for bucket in WaterfallBucket::ORDER {
        let take = remaining.min(owed.owed(bucket));
        *result.slot(bucket) = take;
        remaining -= take;
    }

    result.excess = remaining;
    result
}

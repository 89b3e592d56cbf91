//! Gift code aggregate and code generation.

use super::plan::BillingCycle;
use crate::domain::foundation::{PlanRef, StateMachine, Timestamp, UserId, ValidationError};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Characters used in generated codes. Excludes 0/O and 1/I so codes
/// survive being read aloud or handwritten.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Code layout: three groups of four, e.g. "K3NP-W8RT-2QZM".
const GROUP_LEN: usize = 4;
const GROUP_COUNT: usize = 3;

/// Days a purchased code stays redeemable before lapsing.
pub const CODE_VALIDITY_DAYS: i64 = 365;

/// Lifecycle of a gift code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GiftCodeStatus {
    /// Paid for, awaiting redemption.
    Pending,
    /// Consumed by exactly one recipient.
    Redeemed,
    /// Redemption window elapsed without use.
    Expired,
}

impl GiftCodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GiftCodeStatus::Pending => "pending",
            GiftCodeStatus::Redeemed => "redeemed",
            GiftCodeStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(GiftCodeStatus::Pending),
            "redeemed" => Some(GiftCodeStatus::Redeemed),
            "expired" => Some(GiftCodeStatus::Expired),
            _ => None,
        }
    }
}

impl StateMachine for GiftCodeStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use GiftCodeStatus::*;
        matches!((self, target), (Pending, Redeemed) | (Pending, Expired))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use GiftCodeStatus::*;
        match self {
            Pending => vec![Redeemed, Expired],
            Redeemed => vec![],
            Expired => vec![],
        }
    }
}

/// A purchased gift code granting a fixed span of subscription time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftCode {
    pub code: String,
    pub plan_ref: PlanRef,
    pub billing_cycle: BillingCycle,
    pub duration_days: i64,
    pub purchased_by: UserId,
    pub redeemed_by: Option<UserId>,
    pub status: GiftCodeStatus,
    /// Checkout session that paid for the code.
    pub external_session_ref: String,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
    pub redeemed_at: Option<Timestamp>,
}

impl GiftCode {
    /// Creates a pending code tied to an unfinished checkout session.
    pub fn new(
        code: String,
        plan_ref: PlanRef,
        billing_cycle: BillingCycle,
        purchased_by: UserId,
        external_session_ref: String,
        now: Timestamp,
    ) -> Self {
        Self {
            code,
            plan_ref,
            billing_cycle,
            duration_days: billing_cycle.period_days(),
            purchased_by,
            redeemed_by: None,
            status: GiftCodeStatus::Pending,
            external_session_ref,
            expires_at: now.add_days(CODE_VALIDITY_DAYS),
            created_at: now,
            redeemed_at: None,
        }
    }

    /// Whether the redemption window has elapsed. Lazy, like subscription
    /// expiry; stored status may lag behind this check.
    pub fn is_lapsed(&self, now: Timestamp) -> bool {
        self.status == GiftCodeStatus::Pending && now.is_after(&self.expires_at)
    }

    /// Generates a random code in the canonical grouped format.
    pub fn generate_code() -> String {
        let mut rng = rand::thread_rng();
        let mut out = String::with_capacity(GROUP_COUNT * GROUP_LEN + GROUP_COUNT - 1);
        for group in 0..GROUP_COUNT {
            if group > 0 {
                out.push('-');
            }
            for _ in 0..GROUP_LEN {
                let idx = rng.gen_range(0..CODE_ALPHABET.len());
                out.push(CODE_ALPHABET[idx] as char);
            }
        }
        out
    }

    /// Normalizes user-entered codes: uppercases, strips whitespace, and
    /// regroups with dashes. Rejects characters outside the code alphabet.
    pub fn normalize_code(input: &str) -> Result<String, ValidationError> {
        let cleaned: String = input
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if cleaned.len() != GROUP_COUNT * GROUP_LEN {
            return Err(ValidationError::invalid_format(
                "gift_code",
                "wrong length",
            ));
        }
        if !cleaned.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
            return Err(ValidationError::invalid_format(
                "gift_code",
                "unknown characters",
            ));
        }

        let mut out = String::with_capacity(cleaned.len() + GROUP_COUNT - 1);
        for (i, c) in cleaned.chars().enumerate() {
            if i > 0 && i % GROUP_LEN == 0 {
                out.push('-');
            }
            out.push(c);
        }
        Ok(out)
    }
}

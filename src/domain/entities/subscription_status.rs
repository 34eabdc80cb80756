use serde::{Deserialize, Serialize};

/// Lifecycle state of an account's subscription record.
///
/// `None -> Active -> PendingCancellation -> Canceled`, with the single
/// reverse edge `PendingCancellation -> Active`. `Canceled` is terminal for a
/// record generation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    None,
    Active,
    PendingCancellation,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PendingCancellation => "pending_cancellation",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Whether the record must reference a gateway subscription.
    pub fn requires_external_id(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::PendingCancellation
        )
    }

    /// Whether the gateway still bills (or will bill until period end) for this record.
    pub fn is_live(&self) -> bool {
        self.requires_external_id()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Canceled)
    }

    /// Allowed edges of the lifecycle state machine.
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus as S;
        matches!(
            (*self, next),
            (S::None, S::Active)
                | (S::Active, S::PendingCancellation)
                | (S::PendingCancellation, S::Active)
                | (S::PendingCancellation, S::Canceled)
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(SubscriptionStatus::None),
            "active" => Ok(SubscriptionStatus::Active),
            "pending_cancellation" => Ok(SubscriptionStatus::PendingCancellation),
            "canceled" | "cancelled" => Ok(SubscriptionStatus::Canceled),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn canceled_has_no_outgoing_edges() {
        for next in [
            SubscriptionStatus::None,
            SubscriptionStatus::Active,
            SubscriptionStatus::PendingCancellation,
            SubscriptionStatus::Canceled,
        ] {
            assert!(!SubscriptionStatus::Canceled.can_transition_to(next));
        }
    }

    #[test]
    fn reactivation_edge_exists() {
        use SubscriptionStatus as S;
        assert!(S::PendingCancellation.can_transition_to(S::Active));
        assert!(!S::None.can_transition_to(S::PendingCancellation));
    }

    #[test]
    fn parses_both_spellings_of_canceled() {
        assert_eq!(
            SubscriptionStatus::from_str("cancelled").unwrap(),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            SubscriptionStatus::from_str("PENDING_CANCELLATION").unwrap(),
            SubscriptionStatus::PendingCancellation
        );
        assert!(SubscriptionStatus::from_str("paused").is_err());
    }
}

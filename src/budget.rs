use serde::Serialize;

use crate::estimator::CostEstimate;
use crate::ledger::{LedgerError, LedgerStore};
use crate::pricing::round_usd;
use crate::records::Budget;

/// Structured rejection reason, serialized into the 402 payload.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetExceededDetails {
    pub current_spend_usd: f64,
    pub limit_usd: f64,
    pub estimated_cost_usd: f64,
    pub remaining_budget_usd: f64,
}

/// Outcome of an admission query.
#[derive(Clone, Debug)]
pub enum Admission {
    Admitted {
        /// None when the project has no budget (no gate).
        limit_usd: Option<f64>,
        remaining_usd: Option<f64>,
        /// The budget's period has ended; admitted with an advisory, the
        /// caller may choose to reset.
        period_expired: bool,
    },
    Rejected(BudgetExceededDetails),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// A budget row read once; every advisory helper answers from this same
/// snapshot so a caller sees one consistent view.
#[derive(Clone, Debug)]
pub struct BudgetSnapshot {
    pub budget: Option<Budget>,
    pub now_ms: u64,
}

impl BudgetSnapshot {
    pub fn remaining(&self) -> Option<f64> {
        self.budget
            .as_ref()
            .map(|budget| budget.limit_usd - budget.spent_usd)
    }

    pub fn would_exceed(&self, cost_usd: f64) -> bool {
        match self.remaining() {
            Some(remaining) => cost_usd > remaining,
            None => false,
        }
    }

    pub fn utilization_percent(&self) -> Option<f64> {
        self.budget.as_ref().map(|budget| {
            if budget.limit_usd <= 0.0 {
                100.0
            } else {
                budget.spent_usd / budget.limit_usd * 100.0
            }
        })
    }

    /// Largest output token count affordable after `input_cost_usd`, for a
    /// model priced at `output_price_per_m`. Unlimited when no budget.
    pub fn safe_max_tokens(&self, input_cost_usd: f64, output_price_per_m: f64) -> Option<u64> {
        let remaining = self.remaining()?;
        let headroom = remaining - input_cost_usd;
        if headroom <= 0.0 || output_price_per_m <= 0.0 {
            return Some(0);
        }
        Some((headroom / output_price_per_m * 1_000_000.0).floor() as u64)
    }

    pub fn period_expired(&self) -> bool {
        self.budget
            .as_ref()
            .is_some_and(|budget| budget.period_expired(self.now_ms))
    }
}

/// Answers admission queries from ledger state. Holds no authoritative
/// copy of any budget; every decision starts with a store read.
#[derive(Clone, Debug)]
pub struct BudgetController {
    store: LedgerStore,
}

impl BudgetController {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub async fn snapshot(&self, project_id: &str) -> Result<BudgetSnapshot, LedgerError> {
        let budget = self.store.get_budget(project_id).await?;
        Ok(BudgetSnapshot {
            budget,
            now_ms: now_millis(),
        })
    }

    /// Admission for one (project, estimate) pair. No budget admits
    /// unconditionally; an expired period admits with an advisory; an
    /// estimate exactly equal to the remaining budget is admitted, one
    /// strictly above it is rejected.
    pub async fn admit(
        &self,
        project_id: &str,
        estimate: &CostEstimate,
    ) -> Result<Admission, LedgerError> {
        let snapshot = self.snapshot(project_id).await?;
        Ok(decide(&snapshot, estimate.total_estimated_cost_usd))
    }
}

fn decide(snapshot: &BudgetSnapshot, estimated_cost_usd: f64) -> Admission {
    let Some(budget) = snapshot.budget.as_ref() else {
        return Admission::Admitted {
            limit_usd: None,
            remaining_usd: None,
            period_expired: false,
        };
    };

    if snapshot.period_expired() {
        return Admission::Admitted {
            limit_usd: Some(budget.limit_usd),
            remaining_usd: snapshot.remaining(),
            period_expired: true,
        };
    }

    let remaining = budget.limit_usd - budget.spent_usd;
    if estimated_cost_usd > remaining {
        return Admission::Rejected(BudgetExceededDetails {
            current_spend_usd: round_usd(budget.spent_usd),
            limit_usd: budget.limit_usd,
            estimated_cost_usd: round_usd(estimated_cost_usd),
            remaining_budget_usd: round_usd(remaining),
        });
    }

    Admission::Admitted {
        limit_usd: Some(budget.limit_usd),
        remaining_usd: Some(remaining),
        period_expired: false,
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(limit: f64, spent: f64, period_end_ms: Option<u64>, now_ms: u64) -> BudgetSnapshot {
        BudgetSnapshot {
            budget: Some(Budget {
                project_id: "p1".to_string(),
                limit_usd: limit,
                spent_usd: spent,
                period_start_ms: 0,
                period_end_ms,
                created_at_ms: 0,
                updated_at_ms: 0,
            }),
            now_ms,
        }
    }

    #[test]
    fn no_budget_admits_with_null_limit() {
        let snapshot = BudgetSnapshot {
            budget: None,
            now_ms: 0,
        };
        match decide(&snapshot, 1_000_000.0) {
            Admission::Admitted {
                limit_usd,
                period_expired,
                ..
            } => {
                assert!(limit_usd.is_none());
                assert!(!period_expired);
            }
            Admission::Rejected(_) => panic!("should admit"),
        }
    }

    #[test]
    fn estimate_equal_to_remaining_is_admitted() {
        let snap = snapshot(1.0, 0.4, None, 0);
        assert!(decide(&snap, 0.6).is_admitted());
    }

    #[test]
    fn estimate_above_remaining_is_rejected_with_details() {
        let snap = snapshot(1.0, 0.4, None, 0);
        match decide(&snap, 0.7) {
            Admission::Rejected(details) => {
                assert_eq!(details.limit_usd, 1.0);
                assert_eq!(details.current_spend_usd, 0.4);
                assert_eq!(details.estimated_cost_usd, 0.7);
                assert!((details.remaining_budget_usd - 0.6).abs() < 1e-12);
            }
            Admission::Admitted { .. } => panic!("should reject"),
        }
    }

    #[test]
    fn expired_period_admits_with_advisory() {
        let snap = snapshot(0.001, 0.001, Some(100), 200);
        match decide(&snap, 50.0) {
            Admission::Admitted { period_expired, .. } => assert!(period_expired),
            Admission::Rejected(_) => panic!("expired budgets admit"),
        }
    }

    #[test]
    fn advisory_helpers_answer_from_one_snapshot() {
        let snap = snapshot(10.0, 2.5, None, 0);
        assert_eq!(snap.remaining(), Some(7.5));
        assert!(!snap.would_exceed(7.5));
        assert!(snap.would_exceed(7.6));
        assert_eq!(snap.utilization_percent(), Some(25.0));
        // 7.5 - 0.5 = 7.0 of headroom at $10 per million tokens.
        assert_eq!(snap.safe_max_tokens(0.5, 10.0), Some(700_000));
        assert_eq!(snap.safe_max_tokens(8.0, 10.0), Some(0));
    }

    #[tokio::test]
    async fn controller_reads_through_the_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LedgerStore::new(dir.path().join("ledger.db"));
        store.init().await.expect("init");
        store.set_budget("p1", 1.0, None).await.expect("budget");

        let controller = BudgetController::new(store.clone());
        let snap = controller.snapshot("p1").await.expect("snapshot");
        assert_eq!(snap.remaining(), Some(1.0));

        let snap = controller.snapshot("unknown").await.expect("snapshot");
        assert!(snap.budget.is_none());
    }
}

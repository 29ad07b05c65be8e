//! Circulation settings

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::user::AccountType;

/// Applied when an account type has no configured limit
pub const DEFAULT_BORROW_LIMIT: u32 = 3;
/// Applied when neither the account type nor "member" has a configured duration
pub const DEFAULT_LOAN_DAYS: u32 = 14;
/// Upper bound for loan durations and the reminder grace period
pub const MAX_DAYS: u32 = 3650;
/// Upper bound for the daily fine
pub const MAX_FINE_PER_DAY: Decimal = Decimal::ONE_THOUSAND;

/// Borrowing rules, keyed by account type slug ("member", "staff", "librarian")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CirculationSettings {
    /// Maximum simultaneous active borrowings
    pub borrow_limits: BTreeMap<String, u32>,
    /// Loan duration in days, also the renewal extension
    pub borrow_duration_days: BTreeMap<String, u32>,
    /// Fine per whole day late
    #[schema(value_type = String, example = "0.50")]
    pub fine_per_day: Decimal,
    /// Days past due before an overdue reminder is sent
    pub overdue_grace_days: u32,
}

impl Default for CirculationSettings {
    fn default() -> Self {
        let borrow_limits = [
            (AccountType::Member, 3),
            (AccountType::Staff, 5),
            (AccountType::Librarian, 10),
        ]
        .into_iter()
        .map(|(t, n)| (t.as_str().to_string(), n))
        .collect();

        let borrow_duration_days = [
            (AccountType::Member, 14),
            (AccountType::Staff, 21),
            (AccountType::Librarian, 30),
        ]
        .into_iter()
        .map(|(t, n)| (t.as_str().to_string(), n))
        .collect();

        Self {
            borrow_limits,
            borrow_duration_days,
            fine_per_day: Decimal::new(50, 2),
            overdue_grace_days: 0,
        }
    }
}

impl CirculationSettings {
    pub fn borrow_limit(&self, account_type: AccountType) -> u32 {
        self.borrow_limits
            .get(account_type.as_str())
            .copied()
            .unwrap_or(DEFAULT_BORROW_LIMIT)
    }

    /// Loan length for the type, falling back to the member duration
    pub fn loan_days(&self, account_type: AccountType) -> u32 {
        self.borrow_duration_days
            .get(account_type.as_str())
            .or_else(|| self.borrow_duration_days.get(AccountType::Member.as_str()))
            .copied()
            .unwrap_or(DEFAULT_LOAN_DAYS)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.fine_per_day.is_sign_negative() {
            return Err("fine_per_day cannot be negative".to_string());
        }
        if self.fine_per_day > MAX_FINE_PER_DAY {
            return Err(format!("fine_per_day cannot exceed {}", MAX_FINE_PER_DAY));
        }
        if let Some((kind, _)) = self.borrow_duration_days.iter().find(|(_, d)| **d == 0) {
            return Err(format!("borrow duration for {} must be at least one day", kind));
        }
        if let Some((kind, _)) = self.borrow_duration_days.iter().find(|(_, d)| **d > MAX_DAYS) {
            return Err(format!("borrow duration for {} cannot exceed {} days", kind, MAX_DAYS));
        }
        if self.overdue_grace_days > MAX_DAYS {
            return Err(format!("overdue_grace_days cannot exceed {}", MAX_DAYS));
        }
        if let Some(kind) = self
            .borrow_limits
            .keys()
            .chain(self.borrow_duration_days.keys())
            .find(|k| k.parse::<AccountType>().is_err())
        {
            return Err(format!("unknown account type: {}", kind));
        }
        Ok(())
    }
}

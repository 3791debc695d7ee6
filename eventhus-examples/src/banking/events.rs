//! Events for the banking domain
//!
//! These events capture all state changes of an account.

use eventhus::DomainEvent;
use serde::{Deserialize, Serialize};

use crate::banking::types::{Amount, Owner};

/// Event emitted when a new account is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreated {
    /// Who owns the account
    pub owner: Owner,
}

/// Event emitted when money is deposited into an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositPerformed {
    /// Amount deposited
    pub amount: Amount,
}

/// Event emitted when money is withdrawn from an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalPerformed {
    /// Amount withdrawn
    pub amount: Amount,
}

/// Event emitted when an account changes hands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerChanged {
    /// The new owner
    pub owner: Owner,
}

/// All possible events of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AccountEvent {
    /// Account was opened
    AccountCreated(AccountCreated),
    /// Money was deposited
    DepositPerformed(DepositPerformed),
    /// Money was withdrawn
    WithdrawalPerformed(WithdrawalPerformed),
    /// Ownership moved
    OwnerChanged(OwnerChanged),
}

impl DomainEvent for AccountEvent {
    fn event_types() -> Vec<&'static str> {
        vec![
            "AccountCreated",
            "DepositPerformed",
            "WithdrawalPerformed",
            "OwnerChanged",
        ]
    }
}

impl From<AccountCreated> for AccountEvent {
    fn from(event: AccountCreated) -> Self {
        Self::AccountCreated(event)
    }
}

impl From<DepositPerformed> for AccountEvent {
    fn from(event: DepositPerformed) -> Self {
        Self::DepositPerformed(event)
    }
}

impl From<WithdrawalPerformed> for AccountEvent {
    fn from(event: WithdrawalPerformed) -> Self {
        Self::WithdrawalPerformed(event)
    }
}

impl From<OwnerChanged> for AccountEvent {
    fn from(event: OwnerChanged) -> Self {
        Self::OwnerChanged(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventhus::event::{decode_payload, encode_payload};

    #[test]
    fn payloads_travel_without_their_tag() {
        let (event_type, data) = encode_payload(&AccountEvent::from(DepositPerformed { amount: 300 })).unwrap();

        assert_eq!(event_type.as_ref(), "DepositPerformed");
        assert_eq!(data, serde_json::json!({ "amount": 300 }));

        let decoded: AccountEvent = decode_payload(&event_type, &data).unwrap();
        assert_eq!(decoded, AccountEvent::DepositPerformed(DepositPerformed { amount: 300 }));
    }
}

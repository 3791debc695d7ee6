//! The bank account aggregate

use eventhus::{require, Aggregate, CommandResult, HandleCommand};

use crate::banking::commands::{ChangeOwner, CreateAccount, PerformDeposit, PerformWithdrawal};
use crate::banking::events::{
    AccountCreated, AccountEvent, DepositPerformed, OwnerChanged, WithdrawalPerformed,
};
use crate::banking::types::{Amount, Owner};

/// A bank account, rebuilt from its events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    owner: Option<Owner>,
    balance: Amount,
}

impl Account {
    /// The current owner; `None` before the account is created.
    pub const fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    /// The current balance.
    pub const fn balance(&self) -> Amount {
        self.balance
    }
}

impl Aggregate for Account {
    const AGGREGATE_TYPE: &'static str = "account";
    type Event = AccountEvent;

    fn apply(&mut self, event: &AccountEvent) {
        match event {
            AccountEvent::AccountCreated(created) => self.owner = Some(created.owner.clone()),
            AccountEvent::DepositPerformed(deposit) => self.balance += deposit.amount,
            AccountEvent::WithdrawalPerformed(withdrawal) => self.balance -= withdrawal.amount,
            AccountEvent::OwnerChanged(changed) => self.owner = Some(changed.owner.clone()),
        }
    }
}

impl HandleCommand<CreateAccount> for Account {
    fn handle(&self, command: &CreateAccount) -> CommandResult<Vec<AccountEvent>> {
        Ok(vec![AccountCreated {
            owner: command.owner.clone(),
        }
        .into()])
    }
}

impl HandleCommand<PerformDeposit> for Account {
    fn handle(&self, command: &PerformDeposit) -> CommandResult<Vec<AccountEvent>> {
        require!(
            command.amount > 0,
            "deposit amount must be positive, got {}",
            command.amount
        );
        require!(
            self.balance.checked_add(command.amount).is_some(),
            "deposit of {} would overflow balance {}",
            command.amount,
            self.balance
        );
        Ok(vec![DepositPerformed {
            amount: command.amount,
        }
        .into()])
    }
}

impl HandleCommand<PerformWithdrawal> for Account {
    fn handle(&self, command: &PerformWithdrawal) -> CommandResult<Vec<AccountEvent>> {
        require!(
            command.amount > 0,
            "withdrawal amount must be positive, got {}",
            command.amount
        );
        require!(
            self.balance >= command.amount,
            "insufficient funds: balance {}, requested {}",
            self.balance,
            command.amount
        );
        Ok(vec![WithdrawalPerformed {
            amount: command.amount,
        }
        .into()])
    }
}

impl HandleCommand<ChangeOwner> for Account {
    fn handle(&self, command: &ChangeOwner) -> CommandResult<Vec<AccountEvent>> {
        // Handing the account to its current owner changes nothing
        if self.owner.as_ref() == Some(&command.owner) {
            return Ok(Vec::new());
        }
        Ok(vec![OwnerChanged {
            owner: command.owner.clone(),
        }
        .into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventhus::{AggregateId, AggregateRoot, CommandError, Version};

    fn owner(name: &str) -> Owner {
        Owner::try_new(name).unwrap()
    }

    fn funded(balance: Amount) -> Account {
        let history = vec![
            AccountEvent::from(AccountCreated { owner: owner("A") }),
            AccountEvent::from(DepositPerformed { amount: balance }),
        ];
        AggregateRoot::<Account>::from_history(AggregateId::new(), &history).into_state()
    }

    #[test]
    fn replay_tracks_balance_and_owner() {
        let history = vec![
            AccountEvent::from(AccountCreated { owner: owner("A") }),
            AccountEvent::from(DepositPerformed { amount: 300 }),
            AccountEvent::from(WithdrawalPerformed { amount: 249 }),
            AccountEvent::from(OwnerChanged { owner: owner("B") }),
        ];
        let root = AggregateRoot::<Account>::from_history(AggregateId::new(), &history);

        assert_eq!(root.version(), Version::new(4));
        assert_eq!(root.state().balance(), 51);
        assert_eq!(root.state().owner(), Some(&owner("B")));
    }

    #[test]
    fn overdrawing_is_a_domain_rule_violation() {
        let account = funded(100);
        let command = PerformWithdrawal::new(AggregateId::new(), Version::new(2), 101);

        let result = HandleCommand::<PerformWithdrawal>::handle(&account, &command);
        assert_eq!(
            result,
            Err(CommandError::DomainRuleViolation(
                "insufficient funds: balance 100, requested 101".to_string()
            ))
        );
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let account = funded(100);
        let deposit = PerformDeposit::new(AggregateId::new(), Version::new(2), 0);
        let withdrawal = PerformWithdrawal::new(AggregateId::new(), Version::new(2), -5);

        assert!(HandleCommand::<PerformDeposit>::handle(&account, &deposit)
            .unwrap_err()
            .is_domain_rule_violation());
        assert!(HandleCommand::<PerformWithdrawal>::handle(&account, &withdrawal)
            .unwrap_err()
            .is_domain_rule_violation());
    }

    #[test]
    fn deposits_that_would_overflow_the_balance_are_rejected() {
        let account = funded(300);
        let command = PerformDeposit::new(AggregateId::new(), Version::new(2), Amount::MAX);

        let result = HandleCommand::<PerformDeposit>::handle(&account, &command);
        assert_eq!(
            result,
            Err(CommandError::DomainRuleViolation(format!(
                "deposit of {} would overflow balance 300",
                Amount::MAX
            )))
        );

        let fits = PerformDeposit::new(AggregateId::new(), Version::new(2), Amount::MAX - 300);
        assert!(HandleCommand::<PerformDeposit>::handle(&account, &fits).is_ok());
    }

    #[test]
    fn withdrawing_the_whole_balance_is_allowed() {
        let account = funded(100);
        let command = PerformWithdrawal::new(AggregateId::new(), Version::new(2), 100);

        let events = HandleCommand::<PerformWithdrawal>::handle(&account, &command).unwrap();
        assert_eq!(events, vec![AccountEvent::from(WithdrawalPerformed { amount: 100 })]);
    }

    #[test]
    fn giving_the_account_to_its_owner_emits_nothing() {
        let account = funded(0);
        let same = ChangeOwner::new(AggregateId::new(), Version::new(2), owner("A"));
        let other = ChangeOwner::new(AggregateId::new(), Version::new(2), owner("B"));

        assert!(HandleCommand::<ChangeOwner>::handle(&account, &same).unwrap().is_empty());
        assert_eq!(HandleCommand::<ChangeOwner>::handle(&account, &other).unwrap().len(), 1);
    }
}

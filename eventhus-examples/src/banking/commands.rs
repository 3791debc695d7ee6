//! Commands accepted by a bank account

use eventhus::{AggregateId, Command, Version};

use crate::banking::types::{Amount, Owner};

/// Open a new account for an owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAccount {
    /// The account to create
    pub account_id: AggregateId,
    /// Who will own it
    pub owner: Owner,
}

impl CreateAccount {
    /// Creates the command.
    pub const fn new(account_id: AggregateId, owner: Owner) -> Self {
        Self { account_id, owner }
    }
}

impl Command for CreateAccount {
    const COMMAND_TYPE: &'static str = "CreateAccount";

    fn aggregate_id(&self) -> AggregateId {
        self.account_id
    }

    fn version(&self) -> Version {
        Version::initial()
    }
}

/// Put money into an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformDeposit {
    /// The target account
    pub account_id: AggregateId,
    /// The version the caller last saw
    pub version: Version,
    /// How much to deposit
    pub amount: Amount,
}

impl PerformDeposit {
    /// Creates the command.
    pub const fn new(account_id: AggregateId, version: Version, amount: Amount) -> Self {
        Self {
            account_id,
            version,
            amount,
        }
    }
}

impl Command for PerformDeposit {
    const COMMAND_TYPE: &'static str = "PerformDeposit";

    fn aggregate_id(&self) -> AggregateId {
        self.account_id
    }

    fn version(&self) -> Version {
        self.version
    }
}

/// Take money out of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformWithdrawal {
    /// The target account
    pub account_id: AggregateId,
    /// The version the caller last saw
    pub version: Version,
    /// How much to withdraw
    pub amount: Amount,
}

impl PerformWithdrawal {
    /// Creates the command.
    pub const fn new(account_id: AggregateId, version: Version, amount: Amount) -> Self {
        Self {
            account_id,
            version,
            amount,
        }
    }
}

impl Command for PerformWithdrawal {
    const COMMAND_TYPE: &'static str = "PerformWithdrawal";

    fn aggregate_id(&self) -> AggregateId {
        self.account_id
    }

    fn version(&self) -> Version {
        self.version
    }
}

/// Hand an account over to someone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOwner {
    /// The target account
    pub account_id: AggregateId,
    /// The version the caller last saw
    pub version: Version,
    /// The new owner
    pub owner: Owner,
}

impl ChangeOwner {
    /// Creates the command.
    pub const fn new(account_id: AggregateId, version: Version, owner: Owner) -> Self {
        Self {
            account_id,
            version,
            owner,
        }
    }
}

impl Command for ChangeOwner {
    const COMMAND_TYPE: &'static str = "ChangeOwner";

    fn aggregate_id(&self) -> AggregateId {
        self.account_id
    }

    fn version(&self) -> Version {
        self.version
    }
}

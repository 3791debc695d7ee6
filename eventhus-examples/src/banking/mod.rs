//! Banking domain example
//!
//! A single `account` aggregate that can be opened, funded, drawn down and
//! handed to a new owner. Every command carries the version the caller last
//! saw, so two tellers working from the same snapshot cannot both win.

pub mod account;
pub mod commands;
pub mod events;
pub mod types;

use std::sync::Arc;

use eventhus::{CommandRegister, EventRegister, RegistryError, Repository};

pub use account::Account;
pub use commands::{ChangeOwner, CreateAccount, PerformDeposit, PerformWithdrawal};
pub use events::{AccountCreated, AccountEvent, DepositPerformed, OwnerChanged, WithdrawalPerformed};
pub use types::{Amount, Owner};

/// An event register that knows every account event.
pub fn event_register() -> Result<EventRegister, RegistryError> {
    let mut events = EventRegister::new();
    events.set::<AccountEvent>()?;
    Ok(events)
}

/// Binds every account command to its handler.
pub fn wire_commands(
    commands: &mut CommandRegister,
    repository: &Arc<Repository>,
) -> Result<(), RegistryError> {
    commands
        .wire::<Account, CreateAccount>(Arc::clone(repository))?
        .wire::<Account, PerformDeposit>(Arc::clone(repository))?
        .wire::<Account, PerformWithdrawal>(Arc::clone(repository))?
        .wire::<Account, ChangeOwner>(Arc::clone(repository))?;
    Ok(())
}

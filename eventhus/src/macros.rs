//! Helper macros for command decisions.

/// Helper macro to check business rules in command handlers.
///
/// If the condition is false, it returns a `DomainRuleViolation` error with
/// the provided message. The message may be a format string with arguments.
///
/// # Example
///
/// ```ignore
/// use eventhus::require;
///
/// fn handle(&self, command: &PerformWithdrawal) -> CommandResult<Vec<AccountEvent>> {
///     require!(command.amount > 0, "withdrawal amount must be positive");
///     require!(
///         self.balance >= command.amount,
///         "insufficient funds: balance {}, requested {}",
///         self.balance,
///         command.amount
///     );
///     // ... rest of the logic
/// }
/// ```
#[macro_export]
macro_rules! require {
    ($condition:expr, $message:expr) => {
        if !$condition {
            return Err($crate::CommandError::DomainRuleViolation(
                $message.to_string(),
            ));
        }
    };
    ($condition:expr, $fmt:expr, $($arg:tt)+) => {
        if !$condition {
            return Err($crate::CommandError::DomainRuleViolation(
                format!($fmt, $($arg)+),
            ));
        }
    };
}

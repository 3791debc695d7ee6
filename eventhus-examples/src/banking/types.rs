//! Domain types for the banking example

use nutype::nutype;

/// Name of an account's owner.
///
/// Trimmed and non-empty; parse it once at the edge and pass it around.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 100),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct Owner(String);

/// Money in whole units.
///
/// Signed so that a negative request reaches the account and is rejected
/// there as a business rule instead of failing to parse.
pub type Amount = i64;

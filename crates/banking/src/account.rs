use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bankstream_core::{AccountId, Entity, LedgerError, LedgerResult, TransactionId};

/// Fractional digits a stored amount may carry.
pub const AMOUNT_SCALE: u32 = 4;

/// Check that `amount` is positive and representable at [`AMOUNT_SCALE`].
///
/// Trailing zeros do not count against the scale.
pub fn validate_amount(amount: Decimal, subject: &str) -> LedgerResult<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid_amount(amount, format!("{subject} must be positive")));
    }
    check_scale(amount, subject)
}

fn check_scale(amount: Decimal, subject: &str) -> LedgerResult<()> {
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(LedgerError::invalid_amount(
            amount,
            format!("{subject} has more than {AMOUNT_SCALE} decimal places"),
        ));
    }
    Ok(())
}

/// Direction of a journal entry.
///
/// `Unknown` exists because wire messages may carry an unspecified type; it is
/// never accepted for posting or summarizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Unknown,
    In,
    Out,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Unknown => "UNKNOWN",
            TransactionType::In => "IN",
            TransactionType::Out => "OUT",
        }
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Ok(TransactionType::In),
            "OUT" => Ok(TransactionType::Out),
            "UNKNOWN" => Ok(TransactionType::Unknown),
            other => Err(LedgerError::UnknownTransactionType(other.to_string())),
        }
    }
}

/// A bank account and its current balance.
///
/// The balance is the running sum of every signed transaction posted against
/// the account. It only changes through [`Account::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub account_number: String,
    pub balance: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn open(
        account_number: impl Into<String>,
        opening_balance: Decimal,
        currency: impl Into<String>,
        now: DateTime<Utc>,
    ) -> LedgerResult<Self> {
        if opening_balance.is_sign_negative() {
            return Err(LedgerError::invalid_amount(
                opening_balance,
                "opening balance must not be negative",
            ));
        }
        check_scale(opening_balance, "opening balance")?;
        Ok(Self {
            id: AccountId::new(),
            account_number: account_number.into(),
            balance: opening_balance,
            currency: currency.into(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fail with `InsufficientFunds` if `tx` is an OUT larger than the balance.
    pub fn ensure_can_post(&self, tx: &Transaction) -> LedgerResult<()> {
        if tx.kind == TransactionType::Out && self.balance < tx.amount {
            return Err(LedgerError::InsufficientFunds {
                account_number: self.account_number.clone(),
                balance: self.balance,
                requested: tx.amount,
            });
        }
        Ok(())
    }

    /// Check and apply one journal entry to this account's balance.
    ///
    /// Nothing is mutated when the check fails.
    pub fn apply(&mut self, tx: &Transaction) -> LedgerResult<()> {
        if tx.account_id != self.id {
            return Err(LedgerError::storage(
                format!("apply({})", self.account_number),
                format!("transaction {} belongs to account {}", tx.id, tx.account_id),
            ));
        }
        self.ensure_can_post(tx)?;
        self.balance += tx.signed_amount();
        self.updated_at = tx.created_at;
        Ok(())
    }
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// One immutable journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub kind: TransactionType,
    /// Positive magnitude; the sign comes from `kind`.
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        account_id: AccountId,
        kind: TransactionType,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
        notes: impl Into<String>,
        now: DateTime<Utc>,
    ) -> LedgerResult<Self> {
        if kind == TransactionType::Unknown {
            return Err(LedgerError::UnknownTransactionType(kind.to_string()));
        }
        validate_amount(amount, "amount")?;
        Ok(Self {
            id: TransactionId::new(),
            account_id,
            kind,
            amount,
            occurred_at,
            notes: notes.into(),
            created_at: now,
        })
    }

    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionType::In => self.amount,
            TransactionType::Out => -self.amount,
            TransactionType::Unknown => Decimal::ZERO,
        }
    }
}

impl Entity for Transaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn account(balance: i64) -> Account {
        Account::open("ACC-1", dec(balance), "USD", Utc::now()).unwrap()
    }

    fn tx(acct: &Account, kind: TransactionType, amount: i64) -> Transaction {
        Transaction::new(acct.id, kind, dec(amount), Utc::now(), "", Utc::now()).unwrap()
    }

    #[test]
    fn in_increases_balance() {
        let mut a = account(100);
        let t = tx(&a, TransactionType::In, 40);
        a.apply(&t).unwrap();
        assert_eq!(a.balance, dec(140));
    }

    #[test]
    fn out_beyond_balance_is_rejected_without_mutation() {
        let mut a = account(10);
        let t = tx(&a, TransactionType::Out, 50);
        let err = a.apply(&t).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(a.balance, dec(10));
    }

    #[test]
    fn out_of_exact_balance_reaches_zero() {
        let mut a = account(25);
        let t = tx(&a, TransactionType::Out, 25);
        a.apply(&t).unwrap();
        assert_eq!(a.balance, Decimal::ZERO);
    }

    #[test]
    fn rejects_non_positive_amounts_and_unknown_type() {
        let a = account(0);
        let zero = Transaction::new(a.id, TransactionType::In, Decimal::ZERO, Utc::now(), "", Utc::now());
        assert!(matches!(zero, Err(LedgerError::InvalidAmount { .. })));

        let unknown = Transaction::new(a.id, TransactionType::Unknown, dec(1), Utc::now(), "", Utc::now());
        assert!(matches!(unknown, Err(LedgerError::UnknownTransactionType(_))));
    }

    #[test]
    fn amounts_finer_than_four_decimals_are_rejected() {
        assert!(validate_amount(Decimal::new(12_345, 4), "amount").is_ok());
        // 1.50000: trailing zeros are fine.
        assert!(validate_amount(Decimal::new(150_000, 5), "amount").is_ok());
        assert!(matches!(
            validate_amount(Decimal::new(1, 5), "amount"),
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert!(Account::open("ACC-1", Decimal::new(100_001, 5), "USD", Utc::now()).is_err());
    }

    #[test]
    fn rejects_foreign_transaction() {
        let mut a = account(10);
        let other = account(10);
        let t = tx(&other, TransactionType::In, 1);
        assert!(a.apply(&t).is_err());
        assert_eq!(a.balance, dec(10));
    }

    #[test]
    fn parses_transaction_type_case_insensitively() {
        assert_eq!("in".parse::<TransactionType>().unwrap(), TransactionType::In);
        assert_eq!("OUT".parse::<TransactionType>().unwrap(), TransactionType::Out);
        assert!("sideways".parse::<TransactionType>().is_err());
    }

    proptest! {
        #[test]
        fn balance_tracks_sum_of_applied_postings(
            opening in 0i64..10_000,
            postings in proptest::collection::vec((any::<bool>(), 1i64..5_000), 0..40)
        ) {
            let mut a = account(opening);
            let mut expected = dec(opening);
            for (is_in, amount) in postings {
                let kind = if is_in { TransactionType::In } else { TransactionType::Out };
                let t = tx(&a, kind, amount);
                let before = a.balance;
                match a.apply(&t) {
                    Ok(()) => {
                        expected += t.signed_amount();
                        prop_assert_eq!(a.balance, before + t.signed_amount());
                    }
                    Err(_) => {
                        prop_assert_eq!(kind, TransactionType::Out);
                        prop_assert!(before < dec(amount));
                        prop_assert_eq!(a.balance, before);
                    }
                }
                prop_assert!(!a.balance.is_sign_negative());
            }
            prop_assert_eq!(a.balance, expected);
        }
    }
}

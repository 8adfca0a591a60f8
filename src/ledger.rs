//! Account balances
//!
//! A balance only changes through a version-checked commit built by
//! [`prepare_debit`] or [`prepare_credit`]. Those helpers add the account write
//! to a caller's [`AtomicWrite`] so a debit can travel with the wagers it pays
//! for and a credit with the wager it settles.

use crate::{
    errors::{LedgerError, LedgerResult, ValidationError},
    games::types::{Account, HistoryKind, HistoryStatus, Role},
    history,
    optimistic::retry_on_conflict,
    storage::{get_json, AtomicWrite, CommitOutcome, SharedStore, Versioned},
};
use chrono::{DateTime, Utc};

const ACCOUNT_PREFIX: &str = "account/";
const MAX_ACCOUNT_ID_LEN: usize = 32;

pub fn account_key(id: &str) -> Vec<u8> {
    format!("{}{}", ACCOUNT_PREFIX, id).into_bytes()
}

/// Ids are embedded in store keys, so `/` and other separators are refused
pub fn validate_account_id(id: &str) -> Result<(), ValidationError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ACCOUNT_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidAccountId(id.to_string()))
    }
}

/// Debit `amount` from the account read at `current`, conditioned on its version.
/// Fails with `InsufficientFunds` before touching `write`.
pub fn prepare_debit(
    write: &mut AtomicWrite,
    current: &Versioned<Account>,
    amount: u64,
) -> LedgerResult<Account> {
    let available = current.value.balance;
    let balance = available
        .checked_sub(amount)
        .ok_or(LedgerError::InsufficientFunds {
            required: amount,
            available,
        })?;
    stage(write, current, balance)
}

/// Credit `amount` to the account read at `current`, conditioned on its version
pub fn prepare_credit(
    write: &mut AtomicWrite,
    current: &Versioned<Account>,
    amount: u64,
) -> LedgerResult<Account> {
    let balance = current
        .value
        .balance
        .checked_add(amount)
        .ok_or(ValidationError::Overflow)?;
    stage(write, current, balance)
}

fn stage(write: &mut AtomicWrite, current: &Versioned<Account>, balance: u64) -> LedgerResult<Account> {
    let key = account_key(&current.value.id);
    let updated = Account {
        balance,
        ..current.value.clone()
    };
    write.check(key.clone(), Some(current.version));
    write.put_json(key, &updated)?;
    Ok(updated)
}

pub struct AccountLedger {
    store: SharedStore,
    max_attempts: u32,
}

impl AccountLedger {
    pub fn new(store: SharedStore, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    /// Create an account with a zero balance
    pub fn register(&self, id: &str, role: Role, now: DateTime<Utc>) -> LedgerResult<Account> {
        validate_account_id(id)?;
        let account = Account {
            id: id.to_string(),
            balance: 0,
            role,
            created_at: now,
        };

        let key = account_key(id);
        let mut write = AtomicWrite::new();
        write.check(key.clone(), None);
        write.put_json(key, &account)?;
        match self.store.commit(write)? {
            CommitOutcome::Committed(_) => {
                tracing::info!(account = id, role = ?role, "Account registered");
                Ok(account)
            }
            CommitOutcome::Conflict => Err(LedgerError::AlreadyExists(format!("account {}", id))),
        }
    }

    /// Account with its version token
    pub fn load(&self, id: &str) -> LedgerResult<Versioned<Account>> {
        validate_account_id(id)?;
        get_json(&*self.store, &account_key(id))?
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", id)))
    }

    pub fn get_account(&self, id: &str) -> LedgerResult<Account> {
        Ok(self.load(id)?.value)
    }

    pub fn debit(&self, id: &str, amount: u64) -> LedgerResult<Account> {
        self.apply(id, |write, current| prepare_debit(write, current, amount))
    }

    pub fn credit(&self, id: &str, amount: u64) -> LedgerResult<Account> {
        self.apply(id, |write, current| prepare_credit(write, current, amount))
    }

    /// Administrative deposit, recorded in the account history
    pub fn top_up(&self, id: &str, amount: u64, now: DateTime<Utc>) -> LedgerResult<Account> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let account = self.apply(id, |write, current| {
            let updated = prepare_credit(write, current, amount)?;
            let entry = history::new_entry(
                id,
                HistoryKind::TopUp,
                amount,
                format!("Top-up of {}", amount),
                HistoryStatus::Completed,
                now,
            );
            history::prepare_entry(write, &entry)?;
            Ok(updated)
        })?;
        tracing::info!(account = id, amount, balance = account.balance, "Account topped up");
        Ok(account)
    }

    /// Administrative withdrawal, recorded in the account history
    pub fn withdraw(&self, id: &str, amount: u64, now: DateTime<Utc>) -> LedgerResult<Account> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let account = self.apply(id, |write, current| {
            let updated = prepare_debit(write, current, amount)?;
            let entry = history::new_entry(
                id,
                HistoryKind::Withdraw,
                amount,
                format!("Withdrawal of {}", amount),
                HistoryStatus::Completed,
                now,
            );
            history::prepare_entry(write, &entry)?;
            Ok(updated)
        })?;
        tracing::info!(account = id, amount, balance = account.balance, "Account withdrawal");
        Ok(account)
    }

    /// Read-modify-write loop around a single account
    fn apply<F>(&self, id: &str, mut build: F) -> LedgerResult<Account>
    where
        F: FnMut(&mut AtomicWrite, &Versioned<Account>) -> LedgerResult<Account>,
    {
        retry_on_conflict(self.max_attempts, |_| {
            let current = self.load(id)?;
            let mut write = AtomicWrite::new();
            let updated = build(&mut write, &current)?;
            match self.store.commit(write)? {
                CommitOutcome::Committed(_) => Ok(Some(updated)),
                CommitOutcome::Conflict => Ok(None),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::AuditLog;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn ledger() -> (AccountLedger, SharedStore) {
        let store = MemoryStore::shared();
        (AccountLedger::new(store.clone(), 5), store)
    }

    #[test]
    fn test_register_and_duplicate() {
        let (ledger, _) = ledger();
        let account = ledger.register("alice", Role::User, Utc::now()).unwrap();
        assert_eq!(account.balance, 0);
        assert!(matches!(
            ledger.register("alice", Role::User, Utc::now()),
            Err(LedgerError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_account_id_validation() {
        assert!(validate_account_id("alice_01.x-y").is_ok());
        let long = "x".repeat(33);
        for bad in ["", "a/b", "has space", "ü", long.as_str()] {
            assert!(validate_account_id(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_debit_and_credit() {
        let (ledger, _) = ledger();
        ledger.register("alice", Role::User, Utc::now()).unwrap();
        ledger.credit("alice", 500).unwrap();
        let account = ledger.debit("alice", 200).unwrap();
        assert_eq!(account.balance, 300);

        match ledger.debit("alice", 301) {
            Err(LedgerError::InsufficientFunds {
                required,
                available,
            }) => {
                assert_eq!(required, 301);
                assert_eq!(available, 300);
            }
            other => panic!("expected insufficient funds, got {:?}", other),
        }
        assert_eq!(ledger.get_account("alice").unwrap().balance, 300);
    }

    #[test]
    fn test_credit_overflow_rejected() {
        let (ledger, _) = ledger();
        ledger.register("alice", Role::User, Utc::now()).unwrap();
        ledger.credit("alice", u64::MAX).unwrap();
        assert!(matches!(
            ledger.credit("alice", 1),
            Err(LedgerError::Validation(ValidationError::Overflow))
        ));
    }

    #[test]
    fn test_missing_account() {
        let (ledger, _) = ledger();
        assert!(matches!(ledger.credit("ghost", 1), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_adjustments_write_history() {
        let (ledger, store) = ledger();
        ledger.register("alice", Role::User, Utc::now()).unwrap();
        ledger.top_up("alice", 1000, Utc::now()).unwrap();
        ledger.withdraw("alice", 400, Utc::now()).unwrap();
        assert!(ledger.top_up("alice", 0, Utc::now()).is_err());

        let page = AuditLog::new(store).history_page("alice", None, 10).unwrap();
        let kinds: Vec<HistoryKind> = page.items.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&HistoryKind::TopUp));
        assert!(kinds.contains(&HistoryKind::Withdraw));
        assert_eq!(ledger.get_account("alice").unwrap().balance, 600);
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let store = MemoryStore::shared();
        let ledger = Arc::new(AccountLedger::new(store, 50));
        ledger.register("alice", Role::User, Utc::now()).unwrap();
        ledger.credit("alice", 1000).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.debit("alice", 300).is_ok())
            })
            .collect();
        let succeeded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(succeeded, 3);
        assert_eq!(ledger.get_account("alice").unwrap().balance, 100);
    }
}

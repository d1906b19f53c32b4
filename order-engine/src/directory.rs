//! Account registration and lookup

use market_core::{ledger, Account, AccountId, Province, Result, Storage};
use chrono::Utc;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// Opens and fetches accounts
#[derive(Clone)]
pub struct AccountDirectory {
    storage: Arc<Storage>,
}

impl AccountDirectory {
    pub(crate) fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Open a new account with an opening balance
    pub fn register(
        &self,
        display_name: &str,
        home_province: Option<Province>,
        opening_balance: Decimal,
    ) -> Result<Account> {
        if display_name.trim().is_empty() {
            return Err(market_core::Error::Validation(
                "display name must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let mut account = Account::new(display_name.trim(), home_province, now);

        let mut unit = self.storage.begin_unit();
        ledger::open_account_balance(&mut unit, &mut account, opening_balance, now)?;
        unit.commit()?;

        tracing::info!(
            account = %account.account_id,
            display_name = %account.display_name,
            opening_balance = %opening_balance,
            "Account opened"
        );
        Ok(account)
    }

    /// Fetch an account by ID
    pub fn get(&self, account_id: &AccountId) -> Result<Account> {
        self.storage.get_account(account_id)
    }
}

impl fmt::Debug for AccountDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountDirectory").finish_non_exhaustive()
    }
}

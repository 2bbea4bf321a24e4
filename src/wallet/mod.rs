//! Wallet capability.
//!
//! A browser wallet is reached through whatever object the host injects; here
//! it is an explicit [`WalletProvider`] handed to the code that needs it.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use alloy_primitives::{Address, U256};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Callback invoked with the wallet's new account list.
pub type AccountsListener = Box<dyn Fn(&[Address]) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("wallet exposes no accounts (locked or not connected)")]
    NoAccounts,
    #[error("wallet request rejected: {0}")]
    Rejected(String),
}

/// Account that signs contract calls on a given chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub address: Address,
    pub chain_id: u64,
}

pub trait WalletProvider: Send + Sync {
    fn chain_id(&self) -> Result<u64, WalletError>;

    /// Accounts the user has exposed to the dapp, selected account first.
    fn list_accounts(&self) -> Result<Vec<Address>, WalletError>;

    /// Signer for the selected account.
    fn get_signer(&self) -> Result<Signer, WalletError> {
        let address = self
            .list_accounts()?
            .first()
            .copied()
            .ok_or(WalletError::NoAccounts)?;
        Ok(Signer {
            address,
            chain_id: self.chain_id()?,
        })
    }

    /// Balance in wei.
    fn get_balance(&self, account: Address) -> Result<U256, WalletError>;

    fn on_accounts_changed(&self, listener: AccountsListener) -> SubscriptionId;

    /// Returns false when `id` was not subscribed.
    fn remove_listener(&self, id: SubscriptionId) -> bool;
}

/// Shared "current signer" cell, kept in sync with the wallet's selected account.
#[derive(Clone, Debug, Default)]
pub struct SignerSlot {
    inner: Arc<RwLock<Option<Address>>>,
}

impl SignerSlot {
    pub fn new(initial: Option<Address>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn get(&self) -> Option<Address> {
        *self.inner.read()
    }

    pub fn set(&self, account: Option<Address>) {
        *self.inner.write() = account;
    }

    /// Subscribe this slot to `wallet` so it follows account switches.
    pub fn track(&self, wallet: &dyn WalletProvider) -> SubscriptionId {
        let slot = self.clone();
        wallet.on_accounts_changed(Box::new(move |accounts| {
            let selected = accounts.first().copied();
            debug!(?selected, "wallet accounts changed");
            slot.set(selected);
        }))
    }
}

#[derive(Default)]
struct WalletState {
    chain_id: u64,
    accounts: Vec<Address>,
    balances: BTreeMap<Address, U256>,
}

/// Wallet held entirely in memory; backs tests and offline fixtures.
#[derive(Default)]
pub struct InMemoryWallet {
    state: RwLock<WalletState>,
    listeners: Mutex<Vec<(SubscriptionId, Arc<AccountsListener>)>>,
    next_id: AtomicU64,
}

impl InMemoryWallet {
    pub fn new(chain_id: u64, accounts: Vec<Address>) -> Self {
        Self {
            state: RwLock::new(WalletState {
                chain_id,
                accounts,
                balances: BTreeMap::new(),
            }),
            ..Self::default()
        }
    }

    pub fn set_balance(&self, account: Address, wei: U256) {
        self.state.write().balances.insert(account, wei);
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.state.write().chain_id = chain_id;
    }

    /// Replace the exposed accounts and notify every listener with the new list.
    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.state.write().accounts = accounts.clone();
        let listeners: Vec<Arc<AccountsListener>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&accounts);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl WalletProvider for InMemoryWallet {
    fn chain_id(&self) -> Result<u64, WalletError> {
        Ok(self.state.read().chain_id)
    }

    fn list_accounts(&self) -> Result<Vec<Address>, WalletError> {
        Ok(self.state.read().accounts.clone())
    }

    fn get_balance(&self, account: Address) -> Result<U256, WalletError> {
        Ok(self
            .state
            .read()
            .balances
            .get(&account)
            .copied()
            .unwrap_or_default())
    }

    fn on_accounts_changed(&self, listener: AccountsListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    fn remove_listener(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}

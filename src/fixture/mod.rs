use std::{collections::BTreeMap, fs, path::Path, sync::Arc};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{
    contracts::{InMemoryAskMi, InMemoryChain, InMemoryFactory},
    wallet::InMemoryWallet,
};

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("reading fixture: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing fixture: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("factory lists instance {instance} for {owner}, but it is not deployed")]
    MissingInstance { owner: Address, instance: Address },
}

/// Snapshot of a chain as seen through a wallet, used to run sessions offline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainFixture {
    pub chain_id: u64,
    /// Exposed accounts, selected account first.
    pub accounts: Vec<Address>,
    #[serde(default)]
    pub balances: BTreeMap<Address, U256>,
    pub factory: InMemoryFactory,
    #[serde(default)]
    pub ask_mis: Vec<InMemoryAskMi>,
}

impl ChainFixture {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn build(&self) -> Result<(Arc<InMemoryWallet>, InMemoryChain), FixtureError> {
        for (owner, instance) in &self.factory.instances {
            if !self.ask_mis.iter().any(|c| c.address == *instance) {
                return Err(FixtureError::MissingInstance {
                    owner: *owner,
                    instance: *instance,
                });
            }
        }

        let wallet = InMemoryWallet::new(self.chain_id, self.accounts.clone());
        for (account, wei) in &self.balances {
            wallet.set_balance(*account, *wei);
        }

        let mut chain = InMemoryChain::new();
        chain.deploy_factory(self.factory.clone());
        for contract in &self.ask_mis {
            chain.deploy_ask_mi(contract.clone());
        }
        Ok((Arc::new(wallet), chain))
    }
}

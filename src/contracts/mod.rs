use std::{collections::BTreeMap, sync::Arc};

use alloy_primitives::{Address, U256};
use askmi_core::MultihashRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::wallet::{Signer, WalletError, WalletProvider};

pub const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("no contract deployed at {0}")]
    NotDeployed(Address),
    #[error("execution reverted: {0}")]
    Reverted(String),
}

/// A paid question as stored by an AskMi instance. An unanswered question
/// carries an answer record of size zero.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub question: MultihashRecord,
    #[serde(default)]
    pub answer: MultihashRecord,
    #[serde(default)]
    pub tip: U256,
}

/// Read side of an AskMi instance.
pub trait AskMi: Send + Sync {
    fn address(&self) -> Address;
    fn owner(&self) -> Result<Address, ContractError>;
    /// Question prices in wei, cheapest tier first.
    fn get_tiers(&self) -> Result<Vec<U256>, ContractError>;
    fn get_questioners(&self) -> Result<Vec<Address>, ContractError>;
    fn get_questions(&self, questioner: Address) -> Result<Vec<Question>, ContractError>;
}

/// Deploys AskMi instances and indexes them by owner.
pub trait AskMiFactory: Send + Sync {
    fn address(&self) -> Address;
    /// Reverts when `owner` has not deployed an instance.
    fn get_my_ask_mi(&self, owner: Address) -> Result<Address, ContractError>;
}

/// Binds contract handles to an address and the signer that will send calls.
pub trait ContractBackend {
    fn ask_mi(&self, address: Address, signer: &Signer) -> Result<Arc<dyn AskMi>, ContractError>;
    fn ask_mi_factory(
        &self,
        address: Address,
        signer: &Signer,
    ) -> Result<Arc<dyn AskMiFactory>, ContractError>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InMemoryAskMi {
    pub address: Address,
    pub owner: Address,
    pub tiers: Vec<U256>,
    #[serde(default)]
    pub questions: BTreeMap<Address, Vec<Question>>,
}

impl InMemoryAskMi {
    pub fn new(address: Address, owner: Address, tiers: Vec<U256>) -> Self {
        Self {
            address,
            owner,
            tiers,
            questions: BTreeMap::new(),
        }
    }

    pub fn ask(&mut self, questioner: Address, question: Question) {
        self.questions.entry(questioner).or_default().push(question);
    }
}

impl AskMi for InMemoryAskMi {
    fn address(&self) -> Address {
        self.address
    }

    fn owner(&self) -> Result<Address, ContractError> {
        Ok(self.owner)
    }

    fn get_tiers(&self) -> Result<Vec<U256>, ContractError> {
        Ok(self.tiers.clone())
    }

    fn get_questioners(&self) -> Result<Vec<Address>, ContractError> {
        Ok(self.questions.keys().copied().collect())
    }

    fn get_questions(&self, questioner: Address) -> Result<Vec<Question>, ContractError> {
        Ok(self.questions.get(&questioner).cloned().unwrap_or_default())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InMemoryFactory {
    pub address: Address,
    #[serde(default)]
    pub instances: BTreeMap<Address, Address>,
}

impl InMemoryFactory {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            instances: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, owner: Address, instance: Address) {
        self.instances.insert(owner, instance);
    }
}

impl AskMiFactory for InMemoryFactory {
    fn address(&self) -> Address {
        self.address
    }

    fn get_my_ask_mi(&self, owner: Address) -> Result<Address, ContractError> {
        self.instances
            .get(&owner)
            .copied()
            .ok_or_else(|| ContractError::Reverted(format!("no AskMi instance for {owner}")))
    }
}

/// Contracts deployed on an in-memory chain.
#[derive(Default)]
pub struct InMemoryChain {
    ask_mis: BTreeMap<Address, Arc<InMemoryAskMi>>,
    factories: BTreeMap<Address, Arc<InMemoryFactory>>,
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy_ask_mi(&mut self, contract: InMemoryAskMi) {
        self.ask_mis.insert(contract.address, Arc::new(contract));
    }

    pub fn deploy_factory(&mut self, factory: InMemoryFactory) {
        self.factories.insert(factory.address, Arc::new(factory));
    }
}

impl ContractBackend for InMemoryChain {
    fn ask_mi(&self, address: Address, signer: &Signer) -> Result<Arc<dyn AskMi>, ContractError> {
        let contract = self
            .ask_mis
            .get(&address)
            .ok_or(ContractError::NotDeployed(address))?;
        debug!(%address, signer = %signer.address, "AskMi handle created");
        Ok(Arc::clone(contract) as Arc<dyn AskMi>)
    }

    fn ask_mi_factory(
        &self,
        address: Address,
        signer: &Signer,
    ) -> Result<Arc<dyn AskMiFactory>, ContractError> {
        let factory = self
            .factories
            .get(&address)
            .ok_or(ContractError::NotDeployed(address))?;
        debug!(%address, signer = %signer.address, "AskMiFactory handle created");
        Ok(Arc::clone(factory) as Arc<dyn AskMiFactory>)
    }
}

/// Render wei as ether the way wallets do: `1.0`, `0.05`, `0.000000000000000001`.
pub fn format_ether(wei: U256) -> String {
    let unit = U256::from(WEI_PER_ETHER);
    let whole = wei / unit;
    // remainder is below 10^18 and fits the lowest limb
    let fraction = format!("{:018}", (wei % unit).as_limbs()[0]);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{fraction}")
    }
}

/// Balance of `account` in ether, floored to two decimals.
pub fn rounded_eth_balance(
    wallet: &dyn WalletProvider,
    account: Address,
) -> Result<f64, WalletError> {
    let wei = wallet.get_balance(account)?;
    let hundredths = wei / U256::from(WEI_PER_ETHER / 100);
    let hundredths = u128::try_from(hundredths).unwrap_or(u128::MAX);
    Ok(hundredths as f64 / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::wallet::InMemoryWallet;

    fn ether(milli: u64) -> U256 {
        U256::from(milli) * U256::from(WEI_PER_ETHER / 1_000)
    }

    #[test]
    fn formats_ether_like_a_wallet() {
        assert_eq!(format_ether(U256::ZERO), "0.0");
        assert_eq!(format_ether(ether(1_000)), "1.0");
        assert_eq!(format_ether(ether(500)), "0.5");
        assert_eq!(format_ether(ether(12_050)), "12.05");
        assert_eq!(format_ether(U256::from(1)), "0.000000000000000001");
    }

    #[test]
    fn balance_is_floored_to_cents() {
        let account = Address::repeat_byte(0xa1);
        let wallet = InMemoryWallet::new(1, vec![account]);
        wallet.set_balance(account, ether(1_239));
        assert_eq!(rounded_eth_balance(&wallet, account).unwrap(), 1.23);
        wallet.set_balance(account, U256::from(9_999_999_999_999_999u64));
        assert_eq!(rounded_eth_balance(&wallet, account).unwrap(), 0.0);
    }

    #[test]
    fn factory_reverts_for_unknown_owner() {
        let owner = Address::repeat_byte(1);
        let mut factory = InMemoryFactory::new(Address::repeat_byte(0xfa));
        assert!(matches!(
            factory.get_my_ask_mi(owner),
            Err(ContractError::Reverted(_))
        ));
        factory.register(owner, Address::repeat_byte(0xa5));
        assert_eq!(factory.get_my_ask_mi(owner).unwrap(), Address::repeat_byte(0xa5));
    }

    #[test]
    fn chain_rejects_unknown_addresses() {
        let signer = Signer {
            address: Address::repeat_byte(1),
            chain_id: 1,
        };
        let mut chain = InMemoryChain::new();
        let missing = Address::repeat_byte(0x33);
        assert!(matches!(
            chain.ask_mi(missing, &signer),
            Err(ContractError::NotDeployed(addr)) if addr == missing
        ));

        let mut contract = InMemoryAskMi::new(missing, signer.address, vec![ether(10)]);
        contract.ask(
            Address::repeat_byte(2),
            Question {
                question: MultihashRecord::sha2_256(b"why?"),
                answer: MultihashRecord::absent(),
                tip: U256::ZERO,
            },
        );
        chain.deploy_ask_mi(contract);
        let handle = chain.ask_mi(missing, &signer).expect("deployed");
        assert_eq!(handle.get_questioners().unwrap(), vec![Address::repeat_byte(2)]);
        assert!(handle.get_questions(Address::repeat_byte(9)).unwrap().is_empty());
    }
}

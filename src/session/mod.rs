//! Session setup for the AskMi dapp.
//!
//! A session is everything a page needs after connecting: the tracked
//! signer, a contract handle bound to it, and the initial contract reads.
//! Setup either returns a complete session or the first error; nothing is
//! left half-initialised in shared state.

use std::{collections::BTreeMap, sync::Arc};

use alloy_primitives::Address;
use askmi_core::{encode_identifier, EncodingError, Identifier, MultihashRecord};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    config::AppConfig,
    contracts::{format_ether, AskMi, AskMiFactory, ContractBackend, ContractError, Question},
    wallet::{SignerSlot, SubscriptionId, WalletError, WalletProvider},
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("wallet is on chain {actual}, dapp is configured for chain {expected}")]
    WrongChain { expected: u64, actual: u64 },
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error("corrupt identifier from {questioner}: {source}")]
    Identifier {
        questioner: Address,
        #[source]
        source: EncodingError,
    },
}

/// A question with its records resolved to identifiers; `None` marks a slot
/// that has not been populated yet.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct QuestionView {
    pub question: Option<Identifier>,
    pub answer: Option<Identifier>,
    pub tip: String,
}

impl QuestionView {
    pub fn is_answered(&self) -> bool {
        self.answer.is_some()
    }
}

/// Fail unless the wallet is connected to `expected`.
pub fn detect_chain(wallet: &dyn WalletProvider, expected: u64) -> Result<(), SessionError> {
    let actual = wallet.chain_id()?;
    if actual != expected {
        return Err(SessionError::WrongChain { expected, actual });
    }
    debug!(chain_id = actual, "wallet on expected chain");
    Ok(())
}

/// Signer slot subscribed to account changes; unsubscribes on drop.
struct SignerTracking {
    slot: SignerSlot,
    wallet: Arc<dyn WalletProvider>,
    subscription: SubscriptionId,
}

impl SignerTracking {
    fn start(wallet: Arc<dyn WalletProvider>) -> Result<Self, SessionError> {
        let accounts = wallet.list_accounts()?;
        let slot = SignerSlot::new(accounts.first().copied());
        let subscription = slot.track(wallet.as_ref());
        Ok(Self {
            slot,
            wallet,
            subscription,
        })
    }
}

impl Drop for SignerTracking {
    fn drop(&mut self) {
        self.wallet.remove_listener(self.subscription);
    }
}

pub struct AskMiSession {
    tracking: SignerTracking,
    pub contract: Arc<dyn AskMi>,
    pub owner: Address,
    /// Tier prices formatted in ether.
    pub tiers: Vec<String>,
    pub questioners: Vec<Address>,
    pub questions: BTreeMap<Address, Vec<QuestionView>>,
}

impl AskMiSession {
    pub fn signer(&self) -> Option<Address> {
        self.tracking.slot.get()
    }

    pub fn signer_slot(&self) -> &SignerSlot {
        &self.tracking.slot
    }

    /// Whether the currently selected account owns this instance.
    pub fn is_owner(&self) -> bool {
        self.signer() == Some(self.owner)
    }

    pub fn unanswered(&self) -> impl Iterator<Item = (Address, &QuestionView)> + '_ {
        self.questions.iter().flat_map(|(questioner, views)| {
            views
                .iter()
                .filter(|view| !view.is_answered())
                .map(move |view| (*questioner, view))
        })
    }
}

/// Connect to the AskMi instance at `address` and load its initial state.
pub fn setup_ask_mi(
    config: &AppConfig,
    address: Address,
    wallet: Arc<dyn WalletProvider>,
    backend: &dyn ContractBackend,
) -> Result<AskMiSession, SessionError> {
    detect_chain(wallet.as_ref(), config.chain_id)?;
    let signer = wallet.get_signer()?;
    let tracking = SignerTracking::start(Arc::clone(&wallet))?;
    let contract = backend.ask_mi(address, &signer)?;

    let (questioners, questions) = load_questions(contract.as_ref())?;
    let tiers = contract
        .get_tiers()?
        .into_iter()
        .map(format_ether)
        .collect();
    let owner = contract.owner()?;

    info!(
        %address,
        %owner,
        questioners = questioners.len(),
        "AskMi session ready"
    );
    Ok(AskMiSession {
        tracking,
        contract,
        owner,
        tiers,
        questioners,
        questions,
    })
}

fn load_questions(
    contract: &dyn AskMi,
) -> Result<(Vec<Address>, BTreeMap<Address, Vec<QuestionView>>), SessionError> {
    let questioners = contract.get_questioners()?;
    let mut questions = BTreeMap::new();
    for questioner in &questioners {
        let views = contract
            .get_questions(*questioner)?
            .iter()
            .map(|question| resolve_question(*questioner, question))
            .collect::<Result<Vec<_>, _>>()?;
        questions.insert(*questioner, views);
    }
    Ok((questioners, questions))
}

fn resolve_question(questioner: Address, question: &Question) -> Result<QuestionView, SessionError> {
    let resolve = |record: &MultihashRecord| {
        encode_identifier(record).map_err(|source| SessionError::Identifier { questioner, source })
    };
    Ok(QuestionView {
        question: resolve(&question.question)?,
        answer: resolve(&question.answer)?,
        tip: format_ether(question.tip),
    })
}

pub struct FactorySession {
    tracking: SignerTracking,
    pub factory: Arc<dyn AskMiFactory>,
    /// The signer's own AskMi instance, if it has deployed one.
    pub my_ask_mi: Option<Address>,
}

impl FactorySession {
    pub fn signer(&self) -> Option<Address> {
        self.tracking.slot.get()
    }

    pub fn signer_slot(&self) -> &SignerSlot {
        &self.tracking.slot
    }
}

/// Connect to the factory named by `config` and look up the signer's instance.
pub fn setup_ask_mi_factory(
    config: &AppConfig,
    wallet: Arc<dyn WalletProvider>,
    backend: &dyn ContractBackend,
) -> Result<FactorySession, SessionError> {
    let tracking = SignerTracking::start(Arc::clone(&wallet))?;
    detect_chain(wallet.as_ref(), config.chain_id)?;
    let signer = wallet.get_signer()?;
    let factory = backend.ask_mi_factory(config.provider_address, &signer)?;

    let my_ask_mi = match factory.get_my_ask_mi(signer.address) {
        Ok(instance) => Some(instance),
        Err(ContractError::Reverted(reason)) => {
            info!(account = %signer.address, %reason, "account has no AskMi instance");
            None
        }
        Err(err) => return Err(err.into()),
    };

    Ok(FactorySession {
        tracking,
        factory,
        my_ask_mi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy_primitives::U256;

    use crate::{
        contracts::{InMemoryAskMi, InMemoryChain, InMemoryFactory, WEI_PER_ETHER},
        wallet::InMemoryWallet,
    };

    const CHAIN: u64 = 31337;

    fn owner() -> Address {
        Address::repeat_byte(0x0e)
    }

    fn questioner() -> Address {
        Address::repeat_byte(0x9a)
    }

    fn factory_address() -> Address {
        Address::repeat_byte(0xfa)
    }

    fn instance_address() -> Address {
        Address::repeat_byte(0xa5)
    }

    fn chain() -> InMemoryChain {
        let mut contract = InMemoryAskMi::new(
            instance_address(),
            owner(),
            vec![U256::from(WEI_PER_ETHER / 100), U256::from(WEI_PER_ETHER)],
        );
        contract.ask(
            questioner(),
            Question {
                question: MultihashRecord::sha2_256(b"first"),
                answer: MultihashRecord::sha2_256(b"answer"),
                tip: U256::from(WEI_PER_ETHER / 2),
            },
        );
        contract.ask(
            questioner(),
            Question {
                question: MultihashRecord::sha2_256(b"second"),
                answer: MultihashRecord::absent(),
                tip: U256::ZERO,
            },
        );
        let mut factory = InMemoryFactory::new(factory_address());
        factory.register(owner(), instance_address());

        let mut chain = InMemoryChain::new();
        chain.deploy_ask_mi(contract);
        chain.deploy_factory(factory);
        chain
    }

    fn config() -> AppConfig {
        AppConfig::new(factory_address(), CHAIN).unwrap()
    }

    #[test]
    fn ask_mi_session_loads_contract_state() {
        let wallet = Arc::new(InMemoryWallet::new(CHAIN, vec![owner()]));
        let session = setup_ask_mi(&config(), instance_address(), wallet, &chain()).unwrap();

        assert_eq!(session.owner, owner());
        assert!(session.is_owner());
        assert_eq!(session.tiers, vec!["0.01".to_string(), "1.0".to_string()]);
        assert_eq!(session.questioners, vec![questioner()]);

        let views = &session.questions[&questioner()];
        assert_eq!(views.len(), 2);
        assert!(views[0].is_answered());
        assert_eq!(views[0].tip, "0.5");
        assert_eq!(views[1].answer, None);
        assert_eq!(
            views[1].question.as_ref().unwrap().record().unwrap(),
            MultihashRecord::sha2_256(b"second")
        );
        assert_eq!(session.unanswered().count(), 1);
    }

    #[test]
    fn wrong_chain_is_rejected() {
        let wallet = Arc::new(InMemoryWallet::new(1, vec![owner()]));
        match setup_ask_mi(&config(), instance_address(), wallet, &chain()) {
            Err(SessionError::WrongChain { expected, actual }) => {
                assert_eq!(expected, CHAIN);
                assert_eq!(actual, 1);
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected chain mismatch"),
        }
    }

    #[test]
    fn corrupt_record_surfaces_as_error() {
        let mut contract = InMemoryAskMi::new(instance_address(), owner(), vec![]);
        let mut broken = MultihashRecord::sha2_256(b"q");
        broken.size = U256::from(31);
        contract.ask(
            questioner(),
            Question {
                question: broken,
                answer: MultihashRecord::absent(),
                tip: U256::ZERO,
            },
        );
        let mut chain = InMemoryChain::new();
        chain.deploy_ask_mi(contract);

        let wallet = Arc::new(InMemoryWallet::new(CHAIN, vec![owner()]));
        assert!(matches!(
            setup_ask_mi(&config(), instance_address(), wallet, &chain),
            Err(SessionError::Identifier {
                source: EncodingError::SizeMismatch { .. },
                ..
            })
        ));
    }

    #[test]
    fn session_follows_account_changes_and_unsubscribes() {
        let wallet = Arc::new(InMemoryWallet::new(CHAIN, vec![owner()]));
        let session = setup_ask_mi(&config(), instance_address(), wallet.clone(), &chain()).unwrap();
        assert_eq!(wallet.listener_count(), 1);

        wallet.set_accounts(vec![questioner()]);
        assert_eq!(session.signer(), Some(questioner()));
        assert!(!session.is_owner());

        drop(session);
        assert_eq!(wallet.listener_count(), 0);
    }

    #[test]
    fn factory_session_finds_instance() {
        let wallet = Arc::new(InMemoryWallet::new(CHAIN, vec![owner()]));
        let session = setup_ask_mi_factory(&config(), wallet, &chain()).unwrap();
        assert_eq!(session.my_ask_mi, Some(instance_address()));
        assert_eq!(session.signer(), Some(owner()));
        assert_eq!(session.factory.address(), factory_address());
    }

    #[test]
    fn factory_session_without_instance() {
        let wallet = Arc::new(InMemoryWallet::new(CHAIN, vec![questioner()]));
        let session = setup_ask_mi_factory(&config(), wallet, &chain()).unwrap();
        assert_eq!(session.my_ask_mi, None);
    }

    #[test]
    fn missing_factory_is_an_error() {
        let wallet = Arc::new(InMemoryWallet::new(CHAIN, vec![owner()]));
        let config = AppConfig::new(Address::repeat_byte(0x77), CHAIN).unwrap();
        assert!(matches!(
            setup_ask_mi_factory(&config, wallet.clone(), &chain()),
            Err(SessionError::Contract(ContractError::NotDeployed(_)))
        ));
        // the failed setup must not leave a listener behind
        assert_eq!(wallet.listener_count(), 0);
    }

    #[test]
    fn locked_wallet_cannot_start_a_session() {
        let wallet = Arc::new(InMemoryWallet::new(CHAIN, vec![]));
        assert!(matches!(
            setup_ask_mi_factory(&config(), wallet, &chain()),
            Err(SessionError::Wallet(WalletError::NoAccounts))
        ));
    }
}

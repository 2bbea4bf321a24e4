//! Wallet and contract integration for the AskMi dapp.
//!
//! The content identifier codec lives in `askmi-core`; this crate wires it to
//! the outside world:
//!
//! * [`config`]: validated startup configuration (factory address, chain id).
//! * [`wallet`]: the [`wallet::WalletProvider`] capability and an in-memory wallet.
//! * [`contracts`]: AskMi and factory contract interfaces, ether formatting.
//! * [`session`]: connecting a wallet to the contracts and loading initial state.
//! * [`fixture`]: JSON chain snapshots for running sessions offline.

pub mod config;
pub mod contracts;
pub mod fixture;
pub mod session;
pub mod wallet;

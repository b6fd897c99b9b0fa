//! # StorageHub Client
//!
//! The off-chain agent run by a Backup Storage Provider (BSP). It follows the chain through a
//! [`blockchain_service::BlockchainService`], keeps the Provider's files and Merkle Patricia
//! Forest locally, and reacts to what happens on chain:
//!
//! - Volunteers for new storage requests once its threshold allows it, receives the file and
//!   confirms storing it, coalescing confirmations into batches.
//! - Answers the challenges of its forest when its challenge tick comes.
//! - Stops storing files with the two-phase request/confirm protocol.
//!
//! Every extrinsic that changes the BSP's forest root is sent while holding the forest root
//! write lock of the Provider (see [`shc_forest_lock`]), so proofs are never generated against a
//! root that is about to change.

pub mod blockchain_service;
pub mod builder;
pub mod config;
pub mod handler;
pub mod tasks;
pub mod types;

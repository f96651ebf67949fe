//! Control-plane client for an oracle-guided asset vault.
//!
//! Inspects vault state, moves funds, issues privileged trading signals and
//! follows vault events. All vault logic runs in the remote contract; this
//! crate only reads, submits transactions and polls logs through
//! [`gateway::ChainGateway`].

pub mod amount;
pub mod auth;
pub mod commands;
pub mod config;
pub mod gateway;
pub mod monitor;
pub mod orchestrator;
pub mod portfolio;
pub mod roles;
pub mod vault;

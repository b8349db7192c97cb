// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pricing and credit accounts for SmsGate.
//!
//! - **Tariff**: what one message costs
//! - **Accounts**: user registration and credit top-ups, each top-up recorded
//!   in the ledger

pub mod accounts;
pub mod tariff;

pub use accounts::AccountService;
pub use tariff::{FixedTariff, Tariff};

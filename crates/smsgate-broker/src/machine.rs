// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event-driven state machine for a single broker connection.
//!
//! ```text
//! Disconnected --ConnectRequested--> Connecting --Established--> Connected
//!      ^                                 |                           |
//!      +-----------ConnectFailed---------+                           |
//!      +------------------------------Lost---------------------------+
//!
//! any live state --CloseRequested--> Closing --Released--> Disconnected (terminal)
//! ```

use smsgate_core::{ConnectionState, SmsGateError};

/// Inputs that drive a [`ConnectionMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectRequested,
    Established,
    ConnectFailed,
    Lost,
    CloseRequested,
    Released,
}

/// Pure transition table for [`ConnectionState`]. Holds no I/O.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    terminated: bool,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            terminated: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True once an explicit close has completed. No further connects are allowed.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Applies `event` and returns the resulting state.
    ///
    /// Events that arrive while closing (a late `Established`, a `Lost` from the
    /// session being torn down) leave the machine in `Closing`. A connect after
    /// termination fails with [`SmsGateError::Closed`].
    pub fn apply(&mut self, event: ConnectionEvent) -> Result<ConnectionState, SmsGateError> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        if self.terminated {
            return match event {
                E::CloseRequested | E::Released | E::Lost => Ok(self.state),
                _ => Err(SmsGateError::Closed),
            };
        }

        let next = match (self.state, event) {
            (S::Disconnected, E::ConnectRequested) => S::Connecting,
            (S::Connecting, E::Established) => S::Connected,
            (S::Connecting, E::ConnectFailed) => S::Disconnected,
            (S::Connected, E::Lost) => S::Disconnected,
            (S::Disconnected, E::Lost) => S::Disconnected,
            (S::Disconnected | S::Connecting | S::Connected, E::CloseRequested) => S::Closing,
            (S::Closing, E::Released) => {
                self.terminated = true;
                S::Disconnected
            }
            (S::Closing, _) => S::Closing,
            (state, event) => {
                return Err(SmsGateError::Internal(format!(
                    "invalid connection transition: {event:?} while {state}"
                )));
            }
        };

        self.state = next;
        Ok(next)
    }
}

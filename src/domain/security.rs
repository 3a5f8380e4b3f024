//! Pairing / authentication state machine.
//!
//! ```text
//! Disabled                      (SecurityMode::None, terminal)
//!
//! Idle ──pairing request──▶ AwaitingPasskeyDisplay ──passkey shown──▶ AwaitingPeerConfirmation
//!  ▲                                                                          │
//!  └──────────── disconnect ──── Complete { success } ◀──── stack result ─────┘
//! ```
//!
//! A disconnect before the stack reports a result abandons the session
//! without firing the authentication-complete channel.

use crate::domain::dispatcher::EventDispatcher;
use crate::domain::error::DispatchError;
use crate::domain::models::{PairingResponse, PeerId, SecurityMode};
use rand::Rng;
use tracing::{debug, info, warn};

/// Passkeys are six decimal digits.
pub const PASS_KEY_MODULUS: u32 = 1_000_000;

/// Render a passkey the way it is shown to the user, zero padded.
/// Returns `None` for values that do not fit in six digits.
pub fn format_pass_key(pass_key: u32) -> Option<String> {
    (pass_key < PASS_KEY_MODULUS).then(|| format!("{:06}", pass_key))
}

pub fn generate_pass_key() -> u32 {
    rand::thread_rng().gen_range(0..PASS_KEY_MODULUS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityState {
    Disabled,
    Idle,
    AwaitingPasskeyDisplay,
    AwaitingPeerConfirmation,
    Complete { success: bool },
}

/// One pairing attempt. Lives from the stack's pairing request until the
/// connection drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationSession {
    pub peer: PeerId,
    pub pass_key: Option<String>,
    pub outcome: Option<bool>,
}

/// Result of a transition, together with any handler failures it produced.
#[derive(Debug)]
pub struct Step<T> {
    pub value: T,
    pub handler_failures: Option<DispatchError>,
}

impl<T> Step<T> {
    fn quiet(value: T) -> Self {
        Self {
            value,
            handler_failures: None,
        }
    }

    fn dispatched(value: T, result: Result<(), DispatchError>) -> Self {
        Self {
            value,
            handler_failures: result.err(),
        }
    }
}

/// What a pairing request produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingAttempt {
    pub response: PairingResponse,
    /// Pending session of another peer that this request replaced.
    pub replaced: SessionEnd,
}

impl PairingAttempt {
    fn answer(response: PairingResponse) -> Self {
        Self {
            response,
            replaced: SessionEnd::None,
        }
    }
}

/// How a session ended when it was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// No session was active.
    None,
    /// Pairing never reached a result.
    Abandoned(PeerId),
    /// The session had already completed.
    Closed(PeerId),
}

pub struct SecurityStateMachine {
    mode: SecurityMode,
    state: SecurityState,
    session: Option<AuthenticationSession>,
}

impl SecurityStateMachine {
    pub fn new(mode: SecurityMode) -> Self {
        let state = if mode.authentication_enabled() {
            SecurityState::Idle
        } else {
            SecurityState::Disabled
        };
        Self {
            mode,
            state,
            session: None,
        }
    }

    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    pub fn state(&self) -> SecurityState {
        self.state
    }

    pub fn session(&self) -> Option<&AuthenticationSession> {
        self.session.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SecurityState::Complete { success: true })
    }

    /// The stack asks for pairing. `stack_pass_key` is the passkey the stack
    /// generated, if any; otherwise one is generated here. A stack passkey
    /// that does not fit in six digits is rejected.
    pub fn on_pairing_request(
        &mut self,
        peer: PeerId,
        stack_pass_key: Option<u32>,
        dispatcher: &mut EventDispatcher,
    ) -> Step<PairingAttempt> {
        if self.state == SecurityState::Disabled {
            warn!(
                "Pairing request from {} while security is disabled, accepting without \
                 authentication",
                peer
            );
            return Step::quiet(PairingAttempt::answer(
                PairingResponse::AcceptWithoutAuthentication,
            ));
        }

        let pass_key = match stack_pass_key {
            Some(key) => match format_pass_key(key) {
                Some(text) => text,
                None => {
                    warn!(
                        "Pass key {} from the stack for {} has more than six digits, rejecting",
                        key, peer
                    );
                    return Step::quiet(PairingAttempt::answer(PairingResponse::Reject));
                }
            },
            None => format!("{:06}", generate_pass_key()),
        };

        let mut replaced = SessionEnd::None;
        match self.state {
            SecurityState::AwaitingPasskeyDisplay | SecurityState::AwaitingPeerConfirmation => {
                if let Some(previous) = &self.session {
                    warn!(
                        "Pairing request from {} while pairing with {} is pending, restarting",
                        peer, previous.peer
                    );
                    if previous.peer != peer {
                        info!("Pairing with {} abandoned", previous.peer);
                        replaced = SessionEnd::Abandoned(previous.peer);
                    }
                }
            }
            SecurityState::Complete { .. } => {
                debug!("Re-pairing requested by {}", peer);
            }
            SecurityState::Idle | SecurityState::Disabled => {}
        }

        self.state = SecurityState::AwaitingPasskeyDisplay;
        self.session = Some(AuthenticationSession {
            peer,
            pass_key: Some(pass_key.clone()),
            outcome: None,
        });

        info!("Pairing with {}, showing pass key", peer);
        let dispatched = dispatcher.emit_show_pass_key(&pass_key);
        self.state = SecurityState::AwaitingPeerConfirmation;

        let attempt = PairingAttempt {
            response: PairingResponse::DisplayPasskey(pass_key),
            replaced,
        };
        Step::dispatched(attempt, dispatched)
    }

    /// The stack reports the pairing result. Fires the authentication-complete
    /// channel at most once per session, and only for the session's own peer.
    pub fn on_authentication_result(
        &mut self,
        peer: PeerId,
        success: bool,
        dispatcher: &mut EventDispatcher,
    ) -> Step<bool> {
        match self.state {
            SecurityState::Disabled => {
                warn!(
                    "Authentication result from {} while security is disabled, ignoring",
                    peer
                );
                return Step::quiet(false);
            }
            SecurityState::Complete { .. } => {
                warn!("Duplicate authentication result from {}, ignoring", peer);
                return Step::quiet(false);
            }
            SecurityState::Idle => {
                // Bonded peers re-encrypt without a passkey exchange.
                debug!("Authentication result from {} without pairing request", peer);
                self.session = Some(AuthenticationSession {
                    peer,
                    pass_key: None,
                    outcome: None,
                });
            }
            SecurityState::AwaitingPasskeyDisplay | SecurityState::AwaitingPeerConfirmation => {
                if let Some(session) = &self.session {
                    if session.peer != peer {
                        warn!(
                            "Authentication result from {} while pairing with {}, ignoring",
                            peer, session.peer
                        );
                        return Step::quiet(false);
                    }
                }
            }
        }

        if let Some(session) = self.session.as_mut() {
            session.outcome = Some(success);
        }
        self.state = SecurityState::Complete { success };

        if success {
            info!("Authentication with {} succeeded", peer);
        } else {
            warn!("Authentication with {} failed", peer);
        }
        let dispatched = dispatcher.emit_authentication_complete(success);
        Step::dispatched(true, dispatched)
    }

    /// Drop any session and return to `Idle`. Never fires a channel.
    pub fn on_disconnect(&mut self, peer: PeerId) -> SessionEnd {
        if self.state == SecurityState::Disabled {
            return SessionEnd::None;
        }
        if let Some(session) = &self.session {
            if session.peer != peer {
                debug!(
                    "Disconnect of {} does not affect session with {}",
                    peer, session.peer
                );
                return SessionEnd::None;
            }
        }
        self.reset()
    }

    /// Tear down whatever session exists, regardless of peer.
    pub fn reset(&mut self) -> SessionEnd {
        let end = match self.session.take() {
            None => SessionEnd::None,
            Some(session) if session.outcome.is_none() => {
                info!("Pairing with {} abandoned", session.peer);
                SessionEnd::Abandoned(session.peer)
            }
            Some(session) => SessionEnd::Closed(session.peer),
        };
        if self.state != SecurityState::Disabled {
            self.state = SecurityState::Idle;
        }
        end
    }
}

//! Request lifecycle
//!
//! Pure state machine: `advance` takes the current state and an event and
//! returns the next state, or `IllegalTransition`. The pipeline drives it as
//! it works so that an impossible sequence (a second retry, an event after
//! completion) surfaces as an error instead of a silent loop.
//!
//! ```text
//! Draft → AuthCheck → Blocked
//!                   → Attached → Sent → Success
//!                                     → Failed
//!                                     → Retrying → Sent(retried) → Success | Failed
//! ```

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Draft,
    /// Deciding whether and which credential to attach.
    AuthCheck,
    /// Not sent: no usable credential. Terminal.
    Blocked,
    /// Credential attached, or none needed.
    Attached,
    Sent { retried: bool },
    /// Got a 401, waiting on a refresh before the single resend.
    Retrying,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEvent {
    Submit,
    Block,
    Attach,
    Send,
    Unauthorized,
    Succeed,
    Fail,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Blocked | RequestState::Success | RequestState::Failed
        )
    }
}

/// Apply `event` to `state`. Pure function: no I/O.
pub fn advance(state: RequestState, event: RequestEvent) -> Result<RequestState> {
    use RequestEvent as E;
    use RequestState as S;

    let next = match (state, event) {
        (S::Draft, E::Submit) => S::AuthCheck,

        (S::AuthCheck, E::Block) => S::Blocked,
        (S::AuthCheck, E::Attach) => S::Attached,
        // Proactive refresh failed before anything was sent.
        (S::AuthCheck, E::Fail) => S::Failed,

        (S::Attached, E::Send) => S::Sent { retried: false },

        (S::Sent { .. }, E::Succeed) => S::Success,
        (S::Sent { .. }, E::Fail) => S::Failed,
        (S::Sent { retried: false }, E::Unauthorized) => S::Retrying,

        (S::Retrying, E::Send) => S::Sent { retried: true },
        (S::Retrying, E::Fail) => S::Failed,

        (state, event) => {
            return Err(Error::IllegalTransition(format!("{event:?} in {state:?}")));
        }
    };
    Ok(next)
}

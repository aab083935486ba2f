//! Negotiation states of a [`RoapSession`].
//!
//! [`RoapSession`]: super::RoapSession

/// State of the SDP negotiation driven by a [`RoapSession`].
///
/// At every instant a session is in exactly one of these states. The
/// intermediate states cover the window in which an asynchronous
/// peer-connection primitive (or the SDP munger) is outstanding.
///
/// [`RoapSession`]: super::RoapSession
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NegotiationState {
    /// No exchange is in flight.
    Idle,

    /// `createOffer()` for a locally initiated exchange is outstanding.
    CreatingLocalOffer,

    /// `setLocalDescription()` of a locally created offer is outstanding.
    SettingLocalOffer,

    /// Local offer has been emitted, a remote answer is awaited.
    WaitingForAnswer,

    /// `setRemoteDescription()` of a received answer is outstanding.
    SettingRemoteAnswer,

    /// `createOffer()` flow triggered by a received offer request is
    /// outstanding.
    HandlingOfferRequest,

    /// `setRemoteDescription()` of a received offer is outstanding.
    SettingRemoteOffer,

    /// `createAnswer()`/`setLocalDescription()` for a received offer is
    /// outstanding.
    CreatingLocalAnswer,

    /// Local answer has been emitted, a remote acknowledgement is awaited.
    WaitingForOk,

    /// Terminal: a local peer-connection primitive rejected.
    BrowserError,

    /// Terminal: the remote peer reported an unrecoverable error, or retry
    /// attempts are exhausted.
    RemoteError,

    /// Terminal: the session was closed by the host.
    Closed,
}

impl NegotiationState {
    /// Indicates whether no exchange is in flight.
    #[inline]
    #[must_use]
    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }

    /// Indicates whether this state is absorbing: no input will ever be
    /// acted upon again.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::BrowserError | Self::RemoteError | Self::Closed)
    }

    /// Indicates whether a local offer is being created and has not been
    /// emitted yet.
    ///
    /// A re-entrant offer initiation arriving in this window discards the
    /// creation in progress and reissues it under the same sequence number.
    #[inline]
    #[must_use]
    pub fn is_restart_window(self) -> bool {
        matches!(
            self,
            Self::CreatingLocalOffer
                | Self::SettingLocalOffer
                | Self::HandlingOfferRequest
        )
    }

    /// Indicates whether a remote offer arriving now collides with an own
    /// offer that is being created or already awaits its answer.
    #[inline]
    #[must_use]
    pub fn is_glare_window(self) -> bool {
        self.is_restart_window() || self == Self::WaitingForAnswer
    }
}

#[cfg(test)]
mod test {
    use super::NegotiationState as S;

    const ALL: [S; 12] = [
        S::Idle,
        S::CreatingLocalOffer,
        S::SettingLocalOffer,
        S::WaitingForAnswer,
        S::SettingRemoteAnswer,
        S::HandlingOfferRequest,
        S::SettingRemoteOffer,
        S::CreatingLocalAnswer,
        S::WaitingForOk,
        S::BrowserError,
        S::RemoteError,
        S::Closed,
    ];

    #[test]
    fn idle_is_only_idle() {
        for state in &ALL {
            assert_eq!(state.is_idle(), *state == S::Idle, "{:?}", state);
        }
    }

    #[test]
    fn terminal_states() {
        for state in &ALL {
            assert_eq!(
                state.is_terminal(),
                matches!(state, S::BrowserError | S::RemoteError | S::Closed),
                "{:?}",
                state,
            );
        }
    }

    #[test]
    fn restart_window_is_before_offer_emission() {
        for state in &ALL {
            assert_eq!(
                state.is_restart_window(),
                matches!(
                    state,
                    S::CreatingLocalOffer
                        | S::SettingLocalOffer
                        | S::HandlingOfferRequest
                ),
                "{:?}",
                state,
            );
        }
    }

    #[test]
    fn glare_window_extends_restart_window() {
        for state in &ALL {
            assert_eq!(
                state.is_glare_window(),
                state.is_restart_window() || *state == S::WaitingForAnswer,
                "{:?}",
                state,
            );
        }
        assert!(!S::WaitingForOk.is_glare_window());
        assert!(!S::SettingRemoteOffer.is_glare_window());
    }
}

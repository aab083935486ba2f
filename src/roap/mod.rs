//! Signaling coordinator driving [ROAP] SDP negotiation over an injected
//! peer connection.
//!
//! A [`RoapSession`] is the single source of truth for one negotiation: it
//! owns the [`NegotiationState`], the sequence number discipline, glare
//! resolution, the retry policy and the queue of pending renegotiations.
//! Outbound [`RoapMessage`]s are emitted as [`RoapEvent`]s in strict causal
//! order with the state transitions that produced them; the host is expected
//! to transmit them to the remote peer immediately.
//!
//! [ROAP]: https://tools.ietf.org/html/draft-jennings-rtcweb-signaling-01

mod message;
mod state;

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use derive_more::Display;
use futures::{channel::mpsc, stream::LocalBoxStream};
use medea_reactive::ObservableCell;
use tracerr::Traced;

use crate::{
    platform::{self, RtcPeerConnection, SdpMunger, SdpType},
    utils::{Caused, SignalingError},
};

#[doc(inline)]
pub use self::{
    message::{
        InvalidRoapMessage, RoapErrorType, RoapMessage, RoapMessageType,
        LOCAL_TIE_BREAKER,
    },
    state::NegotiationState,
};

/// Maximum number of retryable remote errors absorbed per offer. The next
/// retryable error terminates the session in
/// [`NegotiationState::RemoteError`].
const MAX_OFFER_RETRIES: u32 = 3;

/// Errors that may occur while driving a [`RoapSession`].
#[derive(Clone, Debug, Display)]
pub enum RoapError {
    /// Occurs when an SDP offer cannot be obtained from the underlying peer
    /// connection.
    #[display(fmt = "Failed to create SDP offer: {}", _0)]
    CreateOfferFailed(platform::Error),

    /// Occurs when an SDP answer cannot be obtained from the underlying
    /// peer connection.
    #[display(fmt = "Failed to create SDP answer: {}", _0)]
    CreateAnswerFailed(platform::Error),

    /// Occurs if the local description of the underlying peer connection
    /// cannot be changed.
    #[display(fmt = "Failed to set local SDP description: {}", _0)]
    SetLocalDescriptionFailed(platform::Error),

    /// Occurs if the remote description of the underlying peer connection
    /// cannot be changed.
    #[display(fmt = "Failed to set remote SDP description: {}", _0)]
    SetRemoteDescriptionFailed(platform::Error),

    /// Occurs when the injected [`SdpMunger`] rejects a locally produced
    /// SDP.
    #[display(fmt = "Failed to process local SDP: {}", _0)]
    MungeLocalSdpFailed(platform::Error),

    /// Occurs when the underlying peer connection reports no local
    /// description right after one has been set successfully.
    #[display(fmt = "Local description is missing after being set")]
    LocalDescriptionMissing,

    /// Occurs when an inbound message misses a field required by its type.
    #[display(fmt = "Malformed ROAP message: {}", _0)]
    MalformedMessage(InvalidRoapMessage),

    /// Occurs when the remote peer reports an unrecoverable error.
    #[display(fmt = "Remote peer sent {} error for seq {}", _0, _1)]
    RemoteFailure(RoapErrorType, u64),

    /// Occurs when the remote peer keeps rejecting the offer after all
    /// permitted retries.
    #[display(fmt = "Retry attempts for SDP offer are exhausted")]
    RetryAttemptsExhausted,

    /// Occurs on any input after [`RoapSession::close()`].
    #[display(fmt = "ROAP session is closed")]
    SessionClosed,
}

impl Caused for RoapError {
    fn name(&self) -> &'static str {
        match self {
            Self::CreateOfferFailed(_) => "CreateOfferFailed",
            Self::CreateAnswerFailed(_) => "CreateAnswerFailed",
            Self::SetLocalDescriptionFailed(_) => "SetLocalDescriptionFailed",
            Self::SetRemoteDescriptionFailed(_) => {
                "SetRemoteDescriptionFailed"
            }
            Self::MungeLocalSdpFailed(_) => "MungeLocalSdpFailed",
            Self::LocalDescriptionMissing => "LocalDescriptionMissing",
            Self::MalformedMessage(_) => "MalformedMessage",
            Self::RemoteFailure(..) => "RemoteFailure",
            Self::RetryAttemptsExhausted => "RetryAttemptsExhausted",
            Self::SessionClosed => "SessionClosed",
        }
    }

    fn cause(self) -> Option<platform::Error> {
        match self {
            Self::CreateOfferFailed(err)
            | Self::CreateAnswerFailed(err)
            | Self::SetLocalDescriptionFailed(err)
            | Self::SetRemoteDescriptionFailed(err)
            | Self::MungeLocalSdpFailed(err) => Some(err),
            Self::LocalDescriptionMissing
            | Self::MalformedMessage(_)
            | Self::RemoteFailure(..)
            | Self::RetryAttemptsExhausted
            | Self::SessionClosed => None,
        }
    }
}

type Result<T> = std::result::Result<T, Traced<RoapError>>;

/// Events emitted from a [`RoapSession`].
#[derive(Clone, Debug)]
pub enum RoapEvent {
    /// A [`RoapMessage`] must be transmitted to the remote peer
    /// immediately.
    RoapMessageToSend {
        /// Message to transmit.
        roap_message: RoapMessage,
    },

    /// The session entered a terminal error state and will not produce any
    /// further outbound messages.
    RoapFailure {
        /// Reason of the failure.
        error: SignalingError,
    },
}

/// Kind of a local offer being created.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum OfferKind {
    /// Offer initiated by the local side.
    Initiated,

    /// Offer requested by the remote side via
    /// [`RoapMessageType::OfferRequest`].
    Requested,
}

/// Last offer emitted by the local side, reused verbatim on retries.
#[derive(Clone, Debug)]
struct SentOffer {
    /// Type the offer was emitted as ([`RoapMessageType::Offer`] or
    /// [`RoapMessageType::OfferResponse`]).
    message_type: RoapMessageType,

    /// Munged SDP of the offer.
    sdp: String,

    /// Tie-breaker of the offer, if it carried one.
    tie_breaker: Option<u32>,
}

/// Coordinator of [ROAP] SDP negotiation for a single peer connection.
///
/// Constructed per peer connection, starts in [`NegotiationState::Idle`].
/// At most one SDP exchange is in flight at any time; concurrent exchanges
/// are impossible by construction of the state machine.
///
/// All futures returned by a session must be polled to completion on the
/// one logical execution context the session lives on; dropping them
/// mid-flight abandons the exchange they drive.
///
/// [ROAP]: https://tools.ietf.org/html/draft-jennings-rtcweb-signaling-01
pub struct RoapSession {
    /// Current state of the negotiation state machine.
    state: ObservableCell<NegotiationState>,

    /// Sequence number of the exchange in flight, or of the last completed
    /// exchange when idle.
    seq: Cell<u64>,

    /// Set when an offer initiation could not be folded into the exchange
    /// in flight; consumed on the next return to
    /// [`NegotiationState::Idle`].
    pending_local_offer: Cell<bool>,

    /// Set when an offer initiation arrives while a local offer is being
    /// created and has not been emitted yet; makes the creation in progress
    /// reissue the peer-connection primitives once more under the same
    /// sequence number.
    restart_offer: Cell<bool>,

    /// Number of retryable remote errors absorbed for the offer in flight.
    retry_count: Cell<u32>,

    /// Last emitted local offer, reused verbatim on retries.
    last_offer: RefCell<Option<SentOffer>>,

    /// Session identifier of the offering side, carried through unchanged
    /// from inbound messages onto every outbound one.
    offerer_session_id: RefCell<Option<String>>,

    /// Session identifier of the answering side, carried through unchanged
    /// from inbound messages onto every outbound one.
    answerer_session_id: RefCell<Option<String>>,

    /// Underlying peer connection whose primitives this session drives.
    peer: Rc<dyn RtcPeerConnection>,

    /// Host-supplied rewriter of locally produced SDP.
    sdp_munger: Rc<dyn SdpMunger>,

    /// Subscribers of [`RoapEvent`]s.
    subs: RefCell<Vec<mpsc::UnboundedSender<RoapEvent>>>,
}

impl RoapSession {
    /// Creates a new idle [`RoapSession`] driving the provided peer
    /// connection.
    #[must_use]
    pub fn new(
        peer: Rc<dyn RtcPeerConnection>,
        sdp_munger: Rc<dyn SdpMunger>,
    ) -> Self {
        Self {
            state: ObservableCell::new(NegotiationState::Idle),
            seq: Cell::new(0),
            pending_local_offer: Cell::new(false),
            restart_offer: Cell::new(false),
            retry_count: Cell::new(0),
            last_offer: RefCell::new(None),
            offerer_session_id: RefCell::new(None),
            answerer_session_id: RefCell::new(None),
            peer,
            sdp_munger,
            subs: RefCell::new(Vec::new()),
        }
    }

    /// Returns [`LocalBoxStream`] into which all [`RoapEvent`]s of this
    /// session will be emitted.
    pub fn subscribe(&self) -> LocalBoxStream<'static, RoapEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.subs.borrow_mut().push(tx);

        Box::pin(rx)
    }

    /// Returns [`LocalBoxStream`] into which every [`NegotiationState`]
    /// update of this session will be emitted.
    pub fn on_state_change(&self) -> LocalBoxStream<'static, NegotiationState> {
        self.state.subscribe()
    }

    /// Returns current [`NegotiationState`] of this session.
    #[inline]
    #[must_use]
    pub fn state(&self) -> NegotiationState {
        self.state.get()
    }

    /// Returns the sequence number of the exchange in flight, or of the
    /// last completed exchange when idle.
    #[inline]
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq.get()
    }

    /// Closes this session.
    ///
    /// Idempotent. Any non-terminal state transitions to
    /// [`NegotiationState::Closed`]; both [`RoapSession::initiate_offer()`]
    /// and [`RoapSession::roap_message_received()`] fail with
    /// [`RoapError::SessionClosed`] afterwards. Emits nothing.
    ///
    /// An exchange whose asynchronous step is still outstanding is
    /// abandoned: its resumption emits nothing and leaves the state
    /// untouched.
    pub fn close(&self) {
        if !self.state.get().is_terminal() {
            self.transition(NegotiationState::Closed);
        }
    }

    /// Requests that a new local offer/answer exchange begins.
    ///
    /// The returned future resolves once the request has been accepted by
    /// the session, not when the exchange completes:
    ///
    /// - idle: a fresh exchange starts under the next sequence number and
    ///   the future resolves after the resulting offer has been emitted;
    /// - a local offer is being created but has not been emitted yet: the
    ///   creation in progress reissues every peer-connection primitive once
    ///   more under the same sequence number, and this future resolves
    ///   immediately;
    /// - any later state of an exchange: the request is queued and a fresh
    ///   exchange starts automatically on the next return to idle.
    ///
    /// Downstream failures are never reported through the returned future,
    /// only via [`RoapEvent::RoapFailure`].
    ///
    /// # Errors
    ///
    /// With [`RoapError::SessionClosed`] if this session has been
    /// [`close()`]d.
    ///
    /// [`close()`]: RoapSession::close
    pub async fn initiate_offer(&self) -> Result<()> {
        let state = self.state.get();
        if state == NegotiationState::Closed {
            return Err(tracerr::new!(RoapError::SessionClosed));
        }
        if state.is_terminal() {
            log::warn!("initiate_offer() ignored in state {:?}", state);
            return Ok(());
        }

        if state.is_restart_window() {
            self.restart_offer.set(true);
        } else if state.is_idle() {
            self.begin_local_offer().await;
        } else {
            self.pending_local_offer.set(true);
        }
        Ok(())
    }

    /// Delivers an inbound [`RoapMessage`] to this session.
    ///
    /// The message is validated, checked against the sequence discipline
    /// and dispatched into the state machine; any resulting peer-connection
    /// calls and outbound messages are driven to completion before the
    /// returned future resolves. Downstream failures are never reported
    /// through the returned future, only via [`RoapEvent::RoapFailure`].
    ///
    /// # Errors
    ///
    /// With [`RoapError::SessionClosed`] if this session has been
    /// [`close()`]d.
    ///
    /// [`close()`]: RoapSession::close
    pub async fn roap_message_received(&self, msg: RoapMessage) -> Result<()> {
        let state = self.state.get();
        if state == NegotiationState::Closed {
            return Err(tracerr::new!(RoapError::SessionClosed));
        }
        if state.is_terminal() {
            log::warn!(
                "{} message ignored in state {:?}",
                msg.message_type,
                state,
            );
            return Ok(());
        }

        if let Err(err) = msg.validate() {
            self.emit(RoapMessage::error(RoapErrorType::Failed, msg.seq));
            self.fail(
                NegotiationState::RemoteError,
                tracerr::new!(RoapError::MalformedMessage(err)),
            );
            return Ok(());
        }
        self.remember_session_ids(&msg);

        let is_error = msg.message_type == RoapMessageType::Error;
        let seq_matches = if state.is_idle() {
            msg.seq >= self.seq.get()
        } else {
            msg.seq == self.seq.get()
        };
        if !seq_matches {
            if is_error {
                // Never answer an ERROR with an ERROR.
                log::warn!("ignoring ROAP ERROR with stale seq {}", msg.seq);
            } else {
                self.emit(RoapMessage::error(
                    RoapErrorType::OutOfOrder,
                    msg.seq,
                ));
            }
            return Ok(());
        }

        let is_retryable_error = is_error
            && msg.error_type.map_or(false, RoapErrorType::is_retryable);
        if !is_retryable_error {
            self.retry_count.set(0);
        }

        use RoapMessageType as Type;
        match msg.message_type {
            Type::Offer | Type::OfferRequest if state.is_glare_window() => {
                // Simultaneous offers: the local tie-breaker is fixed at
                // LOCAL_TIE_BREAKER, so the local offer wins and stays
                // untouched awaiting its answer.
                self.emit(RoapMessage::error(RoapErrorType::Conflict, msg.seq));
            }
            Type::Offer if state.is_idle() => {
                if let Err(err) = self.handle_remote_offer(msg).await {
                    self.local_failure(err);
                }
            }
            Type::OfferRequest if state.is_idle() => {
                self.seq.set(msg.seq);
                if let Err(err) =
                    self.create_and_send_offer(OfferKind::Requested).await
                {
                    self.local_failure(err);
                }
            }
            Type::Answer if state == NegotiationState::WaitingForAnswer => {
                if let Err(err) = self.handle_remote_answer(msg).await {
                    self.local_failure(err);
                }
            }
            Type::Ok if state == NegotiationState::WaitingForOk => {
                self.complete_exchange().await;
            }
            Type::Error => {
                self.handle_remote_error(&msg);
            }
            _ => {
                self.emit(RoapMessage::error(
                    RoapErrorType::InvalidState,
                    msg.seq,
                ));
            }
        }
        Ok(())
    }

    /// Starts a fresh locally initiated exchange under the next sequence
    /// number.
    async fn begin_local_offer(&self) {
        self.seq.set(self.seq.get() + 1);
        if let Err(err) = self.create_and_send_offer(OfferKind::Initiated).await
        {
            self.local_failure(err);
        }
    }

    /// Creates a local offer, munges it and emits it to the remote peer.
    ///
    /// If an offer initiation arrives while the creation is outstanding,
    /// every peer-connection primitive is reissued once more and only the
    /// final SDP is emitted, still under the same sequence number.
    async fn create_and_send_offer(&self, kind: OfferKind) -> Result<()> {
        let munged = loop {
            self.transition(match kind {
                OfferKind::Initiated => NegotiationState::CreatingLocalOffer,
                OfferKind::Requested => NegotiationState::HandlingOfferRequest,
            });
            let offer = self
                .peer
                .create_offer()
                .await
                .map_err(RoapError::CreateOfferFailed)
                .map_err(tracerr::wrap!())?;
            if self.is_terminated() {
                // Session was closed while the primitive was outstanding.
                return Ok(());
            }

            if kind == OfferKind::Initiated {
                self.transition(NegotiationState::SettingLocalOffer);
            }
            self.peer
                .set_local_description(SdpType::Offer(offer))
                .await
                .map_err(RoapError::SetLocalDescriptionFailed)
                .map_err(tracerr::wrap!())?;

            let munged = self.munge_local_sdp().await?;
            if self.is_terminated() {
                return Ok(());
            }
            if self.restart_offer.take() {
                continue;
            }
            break munged;
        };

        let seq = self.seq.get();
        let message = match kind {
            OfferKind::Initiated => RoapMessage::offer(seq, munged),
            OfferKind::Requested => RoapMessage::offer_response(seq, munged),
        };
        *self.last_offer.borrow_mut() = Some(SentOffer {
            message_type: message.message_type,
            sdp: message.sdp.clone().unwrap_or_default(),
            tie_breaker: message.tie_breaker,
        });
        self.emit(message);
        self.transition(NegotiationState::WaitingForAnswer);
        Ok(())
    }

    /// Applies a remote offer and emits the local answer for it.
    async fn handle_remote_offer(&self, msg: RoapMessage) -> Result<()> {
        self.seq.set(msg.seq);
        self.transition(NegotiationState::SettingRemoteOffer);
        self.peer
            .set_remote_description(SdpType::Offer(
                msg.sdp.unwrap_or_default(),
            ))
            .await
            .map_err(RoapError::SetRemoteDescriptionFailed)
            .map_err(tracerr::wrap!())?;
        if self.is_terminated() {
            return Ok(());
        }

        self.transition(NegotiationState::CreatingLocalAnswer);
        let answer = self
            .peer
            .create_answer()
            .await
            .map_err(RoapError::CreateAnswerFailed)
            .map_err(tracerr::wrap!())?;
        self.peer
            .set_local_description(SdpType::Answer(answer))
            .await
            .map_err(RoapError::SetLocalDescriptionFailed)
            .map_err(tracerr::wrap!())?;

        let munged = self.munge_local_sdp().await?;
        if self.is_terminated() {
            return Ok(());
        }
        self.emit(RoapMessage::answer(self.seq.get(), munged));
        self.transition(NegotiationState::WaitingForOk);
        Ok(())
    }

    /// Applies a remote answer to the offer in flight and acknowledges it.
    async fn handle_remote_answer(&self, msg: RoapMessage) -> Result<()> {
        self.transition(NegotiationState::SettingRemoteAnswer);
        self.peer
            .set_remote_description(SdpType::Answer(
                msg.sdp.unwrap_or_default(),
            ))
            .await
            .map_err(RoapError::SetRemoteDescriptionFailed)
            .map_err(tracerr::wrap!())?;
        if self.is_terminated() {
            return Ok(());
        }

        self.emit(RoapMessage::ok(self.seq.get()));
        self.complete_exchange().await;
        Ok(())
    }

    /// Applies the retry policy to an inbound [`RoapMessageType::Error`].
    fn handle_remote_error(&self, msg: &RoapMessage) {
        let error_type = match msg.error_type {
            Some(error_type) => error_type,
            // Unreachable: validation requires `errorType` on ERRORs.
            None => return,
        };

        match self.state.get() {
            NegotiationState::WaitingForAnswer if error_type.is_retryable() => {
                let attempts = self.retry_count.get() + 1;
                if attempts > MAX_OFFER_RETRIES {
                    self.fail(
                        NegotiationState::RemoteError,
                        tracerr::new!(RoapError::RetryAttemptsExhausted),
                    );
                    return;
                }
                self.retry_count.set(attempts);
                self.retry_last_offer();
            }
            NegotiationState::WaitingForAnswer
            | NegotiationState::WaitingForOk
            | NegotiationState::SettingRemoteAnswer => {
                self.fail(
                    NegotiationState::RemoteError,
                    tracerr::new!(RoapError::RemoteFailure(
                        error_type, msg.seq,
                    )),
                );
            }
            state => {
                log::warn!(
                    "ignoring ROAP {} error in state {:?}",
                    error_type,
                    state,
                );
            }
        }
    }

    /// Re-emits the last offer verbatim under the next sequence number,
    /// without touching the peer-connection primitives.
    fn retry_last_offer(&self) {
        let last = match self.last_offer.borrow().clone() {
            Some(last) => last,
            // Unreachable: `WaitingForAnswer` is entered only after an
            // offer has been stored and emitted.
            None => return,
        };

        let seq = self.seq.get() + 1;
        self.seq.set(seq);
        self.emit(RoapMessage {
            message_type: last.message_type,
            seq,
            sdp: Some(last.sdp),
            tie_breaker: last.tie_breaker,
            error_type: None,
            offerer_session_id: None,
            answerer_session_id: None,
        });
    }

    /// Completes the exchange in flight and starts the queued one, if any.
    async fn complete_exchange(&self) {
        if self.is_terminated() {
            return;
        }
        self.retry_count.set(0);
        self.transition(NegotiationState::Idle);
        if self.pending_local_offer.take() {
            self.begin_local_offer().await;
        }
    }

    /// Reads the local description back and passes it through the injected
    /// [`SdpMunger`].
    async fn munge_local_sdp(&self) -> Result<String> {
        let local_sdp = self
            .peer
            .local_description_sdp()
            .ok_or(RoapError::LocalDescriptionMissing)
            .map_err(tracerr::wrap!())?;

        self.sdp_munger
            .process_local_sdp(local_sdp)
            .await
            .map_err(RoapError::MungeLocalSdpFailed)
            .map_err(tracerr::wrap!())
    }

    /// Captures session identifiers of an inbound message, to be carried
    /// through unchanged on every outbound message.
    fn remember_session_ids(&self, msg: &RoapMessage) {
        if let Some(id) = &msg.offerer_session_id {
            self.offerer_session_id.borrow_mut().replace(id.clone());
        }
        if let Some(id) = &msg.answerer_session_id {
            self.answerer_session_id.borrow_mut().replace(id.clone());
        }
    }

    /// Indicates whether this session reached an absorbing state while an
    /// asynchronous step was outstanding.
    fn is_terminated(&self) -> bool {
        self.state.get().is_terminal()
    }

    /// Reports a local platform failure: notifies the remote peer with a
    /// `FAILED` error for the exchange in flight and terminates in
    /// [`NegotiationState::BrowserError`].
    fn local_failure(&self, error: Traced<RoapError>) {
        if self.is_terminated() {
            // The session terminated while the failing primitive was
            // outstanding.
            log::warn!(
                "ignoring failure in state {:?}: {}",
                self.state.get(),
                SignalingError::from(error),
            );
            return;
        }
        self.emit(RoapMessage::error(RoapErrorType::Failed, self.seq.get()));
        self.fail(NegotiationState::BrowserError, error);
    }

    /// Terminates this session in the provided terminal state, emitting a
    /// single [`RoapEvent::RoapFailure`].
    fn fail(&self, terminal: NegotiationState, error: Traced<RoapError>) {
        if self.is_terminated() {
            return;
        }
        let error = SignalingError::from(error);
        error.print();
        self.transition(terminal);
        self.send_event(RoapEvent::RoapFailure { error });
    }

    /// Emits an outbound [`RoapMessage`] with the carried-through session
    /// identifiers attached.
    fn emit(&self, mut roap_message: RoapMessage) {
        if roap_message.offerer_session_id.is_none() {
            roap_message.offerer_session_id =
                self.offerer_session_id.borrow().clone();
        }
        if roap_message.answerer_session_id.is_none() {
            roap_message.answerer_session_id =
                self.answerer_session_id.borrow().clone();
        }
        log::debug!(
            "ROAP out: {} (seq: {})",
            roap_message.message_type,
            roap_message.seq,
        );
        self.send_event(RoapEvent::RoapMessageToSend { roap_message });
    }

    /// Sends a [`RoapEvent`] to all alive subscribers.
    fn send_event(&self, event: RoapEvent) {
        self.subs
            .borrow_mut()
            .retain(|sub| sub.unbounded_send(event.clone()).is_ok());
    }

    /// Moves the state machine into the provided [`NegotiationState`].
    ///
    /// Terminal states are never left: a transition out of one is refused.
    fn transition(&self, to: NegotiationState) {
        let from = self.state.get();
        if from == to {
            return;
        }
        if from.is_terminal() {
            log::warn!(
                "refusing ROAP state transition {:?} -> {:?}",
                from,
                to,
            );
            return;
        }
        log::debug!("ROAP negotiation state: {:?} -> {:?}", from, to);
        self.state.set(to);
    }
}

//! High-level media connection binding an injected peer connection to its
//! [ROAP] negotiation session.
//!
//! [ROAP]: https://tools.ietf.org/html/draft-jennings-rtcweb-signaling-01

use std::rc::Rc;

use futures::stream::LocalBoxStream;
use tracerr::Traced;

use crate::{
    platform::{RtcPeerConnection, SdpMunger},
    roap::{NegotiationState, RoapError, RoapEvent, RoapMessage, RoapSession},
};

/// High-level wrapper binding one peer connection to one [`RoapSession`].
///
/// Hosts drive negotiation through this facade and transmit the emitted
/// [`RoapEvent::RoapMessageToSend`] messages to the remote peer. Track and
/// transceiver management of the underlying peer connection stays with the
/// host, with one contract: while an exchange is in flight (the session is
/// not [`NegotiationState::Idle`]), the underlying peer connection must not
/// be mutated outside of this facade.
pub struct MediaConnection {
    /// Underlying peer connection.
    peer: Rc<dyn RtcPeerConnection>,

    /// Negotiation session of [`MediaConnection::peer`].
    roap: Rc<RoapSession>,
}

impl MediaConnection {
    /// Creates a new [`MediaConnection`] with an idle negotiation session.
    ///
    /// The provided `sdp_munger` is invoked on every locally produced SDP
    /// before it is emitted to the remote peer.
    #[must_use]
    pub fn new(
        peer: Rc<dyn RtcPeerConnection>,
        sdp_munger: Rc<dyn SdpMunger>,
    ) -> Self {
        let roap = Rc::new(RoapSession::new(Rc::clone(&peer), sdp_munger));

        Self { peer, roap }
    }

    /// Returns the underlying peer connection.
    ///
    /// Intended for idle-time track and transceiver management; see the
    /// type-level contract.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> Rc<dyn RtcPeerConnection> {
        Rc::clone(&self.peer)
    }

    /// Requests a new offer/answer exchange with the remote peer.
    ///
    /// See [`RoapSession::initiate_offer()`].
    ///
    /// # Errors
    ///
    /// With [`RoapError::SessionClosed`] if this connection has been
    /// [`close()`]d.
    ///
    /// [`close()`]: MediaConnection::close
    #[inline]
    pub async fn initiate_offer(&self) -> Result<(), Traced<RoapError>> {
        self.roap.initiate_offer().await
    }

    /// Delivers a signaling message received from the remote peer.
    ///
    /// See [`RoapSession::roap_message_received()`].
    ///
    /// # Errors
    ///
    /// With [`RoapError::SessionClosed`] if this connection has been
    /// [`close()`]d.
    ///
    /// [`close()`]: MediaConnection::close
    #[inline]
    pub async fn roap_message_received(
        &self,
        msg: RoapMessage,
    ) -> Result<(), Traced<RoapError>> {
        self.roap.roap_message_received(msg).await
    }

    /// Returns [`LocalBoxStream`] of all [`RoapEvent`]s of this connection.
    #[inline]
    pub fn subscribe(&self) -> LocalBoxStream<'static, RoapEvent> {
        self.roap.subscribe()
    }

    /// Returns [`LocalBoxStream`] of [`NegotiationState`] updates of this
    /// connection.
    #[inline]
    pub fn on_state_change(
        &self,
    ) -> LocalBoxStream<'static, NegotiationState> {
        self.roap.on_state_change()
    }

    /// Returns current [`NegotiationState`] of this connection.
    #[inline]
    #[must_use]
    pub fn negotiation_state(&self) -> NegotiationState {
        self.roap.state()
    }

    /// Closes this connection's negotiation session.
    ///
    /// Idempotent. See [`RoapSession::close()`].
    #[inline]
    pub fn close(&self) {
        self.roap.close();
    }
}

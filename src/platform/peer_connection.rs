//! Contract of the injected [RTCPeerConnection][1] primitives.
//!
//! [1]: https://w3.org/TR/webrtc/#rtcpeerconnection-interface

use async_trait::async_trait;
#[cfg(feature = "mockable")]
use mockall::automock;

use super::Error;

/// Representation of [RTCSdpType].
///
/// [RTCSdpType]: https://w3.org/TR/webrtc/#dom-rtcsdptype
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SdpType {
    /// [`offer` type][1] of SDP.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcsdptype-offer
    Offer(String),

    /// [`answer` type][1] of SDP.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcsdptype-answer
    Answer(String),
}

/// Asynchronous primitives of a peer connection required by the negotiation
/// engine.
///
/// Mirrors the subset of [RTCPeerConnection][1] the engine touches:
/// [createOffer()][2], [createAnswer()][3], [setLocalDescription()][4],
/// [setRemoteDescription()][5] and the read-only `localDescription.sdp`.
///
/// All completions are cooperative: implementations are awaited on the one
/// logical execution context the engine lives on, so no `Send` bound is
/// imposed.
///
/// [1]: https://w3.org/TR/webrtc/#rtcpeerconnection-interface
/// [2]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection-createoffer
/// [3]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection-createanswer
/// [4]: https://w3.org/TR/webrtc/#dom-peerconnection-setlocaldescription
/// [5]: https://w3.org/TR/webrtc/#dom-peerconnection-setremotedescription
#[cfg_attr(feature = "mockable", automock)]
#[async_trait(?Send)]
pub trait RtcPeerConnection {
    /// Obtains an [SDP offer][`SdpType::Offer`] from the underlying peer
    /// connection.
    async fn create_offer(&self) -> Result<String, Error>;

    /// Obtains an [SDP answer][`SdpType::Answer`] from the underlying peer
    /// connection.
    async fn create_answer(&self) -> Result<String, Error>;

    /// Updates the local description of the underlying peer connection.
    async fn set_local_description(&self, sdp: SdpType) -> Result<(), Error>;

    /// Updates the remote description of the underlying peer connection.
    async fn set_remote_description(&self, sdp: SdpType) -> Result<(), Error>;

    /// Returns `localDescription.sdp` of the underlying peer connection, if
    /// a local description is currently set.
    fn local_description_sdp(&self) -> Option<String>;
}

/// Host-supplied rewriter of locally produced SDP.
///
/// Invoked after every successful
/// [`RtcPeerConnection::set_local_description()`], before the resulting
/// message is emitted to the remote peer. The returned SDP replaces the raw
/// local SDP in the outbound message, so the unprocessed
/// `localDescription.sdp` is never exposed to the remote side.
#[cfg_attr(feature = "mockable", automock)]
#[async_trait(?Send)]
pub trait SdpMunger {
    /// Rewrites the provided locally produced SDP.
    async fn process_local_sdp(&self, sdp: String) -> Result<String, Error>;
}

/// [`SdpMunger`] passing SDP through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSdpMunger;

#[async_trait(?Send)]
impl SdpMunger for NoopSdpMunger {
    async fn process_local_sdp(&self, sdp: String) -> Result<String, Error> {
        Ok(sdp)
    }
}

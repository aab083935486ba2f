//! Abstraction of the platform-provided collaborators driven by the
//! negotiation engine: the peer-connection primitives and the local SDP
//! munger.
//!
//! The engine never talks to a concrete [RTCPeerConnection][1] directly.
//! Hosts inject an object implementing [`RtcPeerConnection`], so the engine
//! runs unchanged against a browser binding, a native WebRTC stack, or a
//! scripted test double.
//!
//! [1]: https://w3.org/TR/webrtc/#rtcpeerconnection-interface

mod peer_connection;

use derive_more::{Display, From};

#[cfg(feature = "mockable")]
#[doc(inline)]
pub use self::peer_connection::{MockRtcPeerConnection, MockSdpMunger};
#[doc(inline)]
pub use self::peer_connection::{
    NoopSdpMunger, RtcPeerConnection, SdpMunger, SdpType,
};

/// Opaque error thrown by an injected platform collaborator.
///
/// The engine never inspects it, only attaches it as the cause of its own
/// errors and carries it to the host through failure events.
#[derive(Clone, Debug, Display, Eq, From, PartialEq)]
#[from(forward)]
pub struct Error(String);

impl Error {
    /// Returns message of this [`Error`].
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

//! Client-side signaling coordinator driving [ROAP] SDP negotiation
//! between WebRTC peers.
//!
//! The crate wraps an injected peer-connection abstraction
//! ([`platform::RtcPeerConnection`]) with a higher-level media-connection
//! facade ([`MediaConnection`]); the negotiation itself is driven by the
//! [`RoapSession`] engine: a sequenced, glare-resolving state machine
//! serializing local offer initiation and remote-driven negotiations in the
//! presence of asynchronous peer-connection calls, out-of-order signaling,
//! retryable errors and renegotiation requests arriving at arbitrary times.
//!
//! [ROAP]: https://tools.ietf.org/html/draft-jennings-rtcweb-signaling-01

#![allow(clippy::module_name_repetitions)]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg_attr(not(feature = "mockable"), warn(missing_docs))]
#![cfg_attr(feature = "mockable", allow(missing_docs))]

pub mod peer;
pub mod platform;
pub mod roap;
pub mod utils;

#[doc(inline)]
pub use self::{
    peer::MediaConnection,
    platform::{NoopSdpMunger, RtcPeerConnection, SdpMunger, SdpType},
    roap::{
        NegotiationState, RoapError, RoapErrorType, RoapEvent, RoapMessage,
        RoapMessageType, RoapSession, LOCAL_TIE_BREAKER,
    },
    utils::SignalingError,
};

//! Helpers for application errors.

use std::{fmt::Display, rc::Rc};

use derive_more::{Display, From};
use tracerr::{Trace, Traced};

use crate::platform;

/// Representation of an error which can be caused by an error thrown by one
/// of the injected platform collaborators.
pub trait Caused {
    /// Returns name of error.
    fn name(&self) -> &'static str;

    /// Returns the causing [`platform::Error`] if there is one.
    fn cause(self) -> Option<platform::Error>;
}

/// Abstract application error carried by failure events.
#[derive(Clone, Debug, Display)]
#[display(fmt = "{}: {}\n{}", name, message, trace)]
pub struct SignalingError {
    name: &'static str,
    message: String,
    trace: Trace,
    source: Option<platform::Error>,
}

impl SignalingError {
    /// Returns name of error.
    #[inline]
    #[must_use]
    pub fn name(&self) -> String {
        String::from(self.name)
    }

    /// Returns message of error.
    #[inline]
    #[must_use]
    pub fn message(&self) -> String {
        self.message.clone()
    }

    /// Returns trace information of error.
    #[inline]
    #[must_use]
    pub fn trace(&self) -> String {
        self.trace.to_string()
    }

    /// Returns the causing [`platform::Error`] if there is one.
    #[inline]
    #[must_use]
    pub fn source(&self) -> Option<platform::Error> {
        Clone::clone(&self.source)
    }

    /// Prints error information to default logger with `ERROR` level.
    #[inline]
    pub fn print(&self) {
        log::error!("{}", self);
    }
}

impl<E: Caused + Display> From<(E, Trace)> for SignalingError {
    fn from((err, trace): (E, Trace)) -> Self {
        Self {
            name: err.name(),
            message: err.to_string(),
            trace,
            source: err.cause(),
        }
    }
}

impl<E: Caused + Display> From<Traced<E>> for SignalingError {
    fn from(traced: Traced<E>) -> Self {
        Self::from(traced.into_parts())
    }
}

/// Wrapper for [`serde_json::error::Error`] that provides [`Clone`],
/// [`Debug`], [`Display`] implementations.
#[derive(Clone, Debug, Display, From)]
#[from(forward)]
pub struct JsonParseError(Rc<serde_json::error::Error>);

impl PartialEq for JsonParseError {
    fn eq(&self, other: &Self) -> bool {
        self.0.line() == other.0.line()
            && self.0.column() == other.0.column()
            && self.0.classify() == other.0.classify()
    }
}

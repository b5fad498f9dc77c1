//! Terminal outcomes of a request, as seen by the caller.

use std::fmt;

use courier_core::{from_bytes, DecodeError, DecodeResult};
use courier_shared::{ConnectionFailure, Credential, FrameKind, MissingCredentials, Request};

/// How a request ended. Every request gets exactly one.
pub enum RequestOutcome<R: Request> {
    /// The responder answered.
    Answered(R::Answer),
    /// The responder failed the request with a typed reason.
    Failed(R::Failure),
    /// We lacked these credentials. The handler never ran.
    MissingCredentials(Vec<Credential>),
    /// Nobody on the other end handles this request type.
    Unhandled,
    /// The connection went away, or the reply could not be decoded.
    ConnectionFailed(ConnectionFailure),
}

impl<R: Request> RequestOutcome<R> {
    /// False only for [`RequestOutcome::Answered`].
    #[inline]
    #[must_use]
    pub fn failed(&self) -> bool {
        !matches!(self, Self::Answered(_))
    }

    /// The answer, if there was one.
    #[must_use]
    pub fn answer(self) -> Option<R::Answer> {
        match self {
            Self::Answered(answer) => Some(answer),
            _ => None,
        }
    }

    /// Converts a raw resolution, decoding the payload.
    ///
    /// A payload that does not decode as the expected type resolves as
    /// `ConnectionFailed(UnexpectedPacket)`.
    pub(crate) fn from_resolution(resolution: Resolution<'_>) -> Self {
        match resolution {
            Resolution::ConnectionFailed(reason) => Self::ConnectionFailed(reason),
            Resolution::Frame { kind, payload } => {
                Self::decode(kind, payload).unwrap_or_else(|err| {
                    tracing::warn!("undecodable {} for {}: {}", kind, R::NAME, err);
                    Self::ConnectionFailed(ConnectionFailure::UnexpectedPacket)
                })
            }
        }
    }

    fn decode(kind: FrameKind, payload: &[u8]) -> DecodeResult<Self> {
        match kind {
            FrameKind::Answer => from_bytes::<R::Answer>(payload).map(Self::Answered),
            FrameKind::Failure => from_bytes::<R::Failure>(payload).map(Self::Failed),
            FrameKind::MissingCredentials => {
                from_bytes::<MissingCredentials>(payload).map(|missing| Self::MissingCredentials(missing.0))
            }
            FrameKind::Unhandled => Ok(Self::Unhandled),
            FrameKind::Message | FrameKind::Request => Err(DecodeError::InvalidTag {
                tag: u32::from(kind as u8),
                what: "terminal frame",
            }),
        }
    }
}

impl<R: Request> fmt::Debug for RequestOutcome<R>
where
    R::Answer: fmt::Debug,
    R::Failure: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Answered(answer) => f.debug_tuple("Answered").field(answer).finish(),
            Self::Failed(failure) => f.debug_tuple("Failed").field(failure).finish(),
            Self::MissingCredentials(missing) => {
                f.debug_tuple("MissingCredentials").field(missing).finish()
            }
            Self::Unhandled => f.write_str("Unhandled"),
            Self::ConnectionFailed(reason) => {
                f.debug_tuple("ConnectionFailed").field(reason).finish()
            }
        }
    }
}

/// A terminal event before it is decoded into a typed outcome.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Resolution<'a> {
    /// A terminal frame arrived.
    Frame {
        /// Answer, failure, missing credentials or unhandled.
        kind: FrameKind,
        /// Bytes after the terminal header.
        payload: &'a [u8],
    },
    /// The request will never be answered.
    ConnectionFailed(ConnectionFailure),
}

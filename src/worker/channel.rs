//! Length-prefixed MessagePack framing over a pair of byte streams.
//!
//! Frames carry a 4-byte big-endian length followed by a MessagePack document.
//! The channel has no notion of request ids: exactly one request is in flight
//! at a time, and `&mut self` on [`FramedChannel::call`] enforces it.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use super::error::TransportError;
use super::protocol::{Request, Response};

/// Largest frame accepted in either direction (64 MiB).
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

const READ_BUFFER_CAPACITY: usize = 8 * 1024;

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Framed duplex link to the worker.
///
/// `W` is the stream the worker reads (its stdin), `R` the stream it writes
/// (its stdout). The mock worker uses the same type with the roles swapped.
#[derive(Debug)]
pub struct FramedChannel<W, R> {
    writer: FramedWrite<W, LengthDelimitedCodec>,
    reader: FramedRead<R, LengthDelimitedCodec>,
}

impl<W, R> FramedChannel<W, R>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    /// Wrap `input` and `output` with framing and read buffering.
    pub fn open(input: W, output: R) -> Self {
        Self {
            writer: FramedWrite::new(input, codec()),
            reader: FramedRead::with_capacity(output, codec(), READ_BUFFER_CAPACITY),
        }
    }

    /// Encode `message` and write it as one frame.
    pub async fn send<T>(&mut self, message: &T) -> Result<(), TransportError>
    where
        T: Serialize + ?Sized,
    {
        let frame = rmp_serde::to_vec_named(message)?;
        self.writer
            .send(Bytes::from(frame))
            .await
            .map_err(TransportError::Write)
    }

    /// Read and decode the next frame.
    pub async fn receive<T>(&mut self) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        let frame = self
            .reader
            .next()
            .await
            .ok_or(TransportError::Closed)?
            .map_err(TransportError::Read)?;
        Ok(rmp_serde::from_slice(&frame)?)
    }

    /// Send `request` and wait for its response frame.
    ///
    /// `Ok` means a well-formed response arrived, which may itself carry a
    /// worker-reported error.
    pub async fn call(&mut self, request: &Request) -> Result<Response, TransportError> {
        self.send(request).await?;
        self.receive().await
    }

    /// Consume the channel and return the underlying streams.
    pub fn into_inner(self) -> (W, R) {
        (self.writer.into_inner(), self.reader.into_inner())
    }
}

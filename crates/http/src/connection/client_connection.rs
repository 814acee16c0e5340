//! Client-side connection loop.

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info};

use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::config::HttpOptions;
use crate::connection::timing::{ReceiveActivity, TrackedReader};
use crate::protocol::body::{source_for, BodySource};
use crate::protocol::{BodyKind, HttpError, Message, ParseError, PayloadItem, RequestHeader, ResponseHeader};

/// A client-side HTTP connection: sends one request at a time and decodes
/// the matching response, reporting whether the connection may be reused.
pub struct ClientConnection<R, W> {
    framed_read: FramedRead<TrackedReader<R>, ResponseDecoder>,
    framed_write: FramedWrite<W, RequestEncoder>,
    activity: ReceiveActivity,
    receive_timeout: Option<Duration>,
}

/// A decoded response: head, streaming body and the persistence flag.
pub struct ClientResponse {
    pub head: ResponseHeader,
    pub body: BodySource,
    pub persistent: bool,
}

impl<R, W> ClientConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, options: &HttpOptions) -> Self {
        let activity = ReceiveActivity::new();
        Self {
            framed_read: FramedRead::with_capacity(
                TrackedReader::new(reader, activity.clone()),
                ResponseDecoder::new(options),
                8 * 1024,
            ),
            framed_write: FramedWrite::new(writer, RequestEncoder::new()),
            activity,
            receive_timeout: options.receive_timeout,
        }
    }

    /// Sends a complete request. An empty body is framed as such, otherwise
    /// the body is sent with its exact length.
    pub async fn send_request(&mut self, header: RequestHeader, body: Bytes) -> Result<(), HttpError> {
        let body_kind = if body.is_empty() { BodyKind::Empty } else { BodyKind::Length(body.len() as u64) };

        self.framed_read.decoder_mut().set_request_method(header.method().clone());
        debug!(method = %header.method(), uri = %header.uri(), "sending request");

        self.framed_write.feed(Message::Header((header, body_kind))).await?;
        if !body.is_empty() {
            self.framed_write.feed(Message::Payload(PayloadItem::Chunk(body))).await?;
        }
        self.framed_write.send(Message::Payload(PayloadItem::Eof)).await?;
        Ok(())
    }

    /// Reads the response to the last sent request, draining the whole body
    /// into the returned source.
    pub async fn read_response(&mut self) -> Result<ClientResponse, HttpError> {
        let mut response = self.read_response_head().await?;
        let reusable = self.read_body(&response.body).await?;
        response.persistent = response.persistent && reusable;
        Ok(response)
    }

    /// Reads the response head only, exposing the body source before any
    /// body bytes arrive. A consumer holding a clone of the source may
    /// suspend it to backpressure the peer; [`read_body`] feeds the rest.
    ///
    /// [`read_body`]: Self::read_body
    pub async fn read_response_head(&mut self) -> Result<ClientResponse, HttpError> {
        let (head, body_kind, persistent) = match self.next_frame().await? {
            Some(Ok(Message::Header(parts))) => parts,
            Some(Ok(Message::Payload(_))) => {
                return Err(ParseError::invalid_body("expected response head, received body bytes").into());
            }
            Some(Err(e)) => return Err(e.into()),
            None => {
                let buffer = self.framed_read.read_buffer().clone();
                self.framed_read.decoder_mut().on_disconnect(&buffer)?;
                return Err(ParseError::malformed("connection closed before the response head", Bytes::new()).into());
            }
        };

        info!(status = %head.status(), ?body_kind, "received response head");
        Ok(ClientResponse { head, body: source_for(body_kind), persistent })
    }

    /// Feeds body frames into the source until the body completes. Returns
    /// whether the connection is still usable afterwards.
    ///
    /// Every body runs through this, an empty one still yields its EOF
    /// frame so the connection is positioned at the next message.
    pub async fn read_body(&mut self, source: &BodySource) -> Result<bool, HttpError> {
        loop {
            // a suspended source stalls transport reads until the consumer
            // resumes it
            if source.is_suspended() {
                let _ = source.on_resume().await;
                // the pause was consumer-driven, restart the receive clock
                self.activity.touch();
                continue;
            }
            match self.next_frame().await? {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    source.append(bytes).map_err(|e| ParseError::invalid_body(e.to_string()))?;
                }
                Some(Ok(Message::Payload(PayloadItem::Eof))) => {
                    source.set_complete();
                    return Ok(true);
                }
                Some(Ok(Message::Header(_))) => {
                    return Err(ParseError::invalid_body("expected body bytes, received a head").into());
                }
                Some(Err(e)) => {
                    source.destroy(e.to_string());
                    return Err(e.into());
                }
                None => {
                    let buffer = self.framed_read.read_buffer().clone();
                    self.framed_read.decoder_mut().on_disconnect(&buffer)?;
                    // an until-close body completes on disconnect
                    source.set_complete();
                    return Ok(false);
                }
            }
        }
    }

    /// Reads one frame, with the deadline measured from the last byte
    /// received rather than from the last decoded frame.
    async fn next_frame(
        &mut self,
    ) -> Result<Option<Result<Message<(ResponseHeader, BodyKind, bool)>, ParseError>>, HttpError> {
        let Some(limit) = self.receive_timeout else {
            return Ok(self.framed_read.next().await);
        };
        loop {
            let deadline = self.activity.deadline(limit);
            match tokio::time::timeout_at(deadline, self.framed_read.next()).await {
                Ok(item) => return Ok(item),
                Err(_) => {
                    // bytes may have arrived without completing a frame
                    if self.activity.deadline(limit) > deadline {
                        continue;
                    }
                    return Err(HttpError::timeout(limit));
                }
            }
        }
    }
}

//! Server-side connection loop.

use std::error::Error;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::{Request, Response, StatusCode, Version};
use http_body::Body;
use http_body_util::Empty;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::config::HttpOptions;
use crate::connection::timing::{ReceiveActivity, TrackedReader};
use crate::connection::{ConnCounters, ConnState};
use crate::handler::Handler;
use crate::protocol::body::{source_for, BodySource};
use crate::protocol::{
    BodyKind, HttpError, Message, ParseError, PayloadItem, RequestHeader, ResponseHeader, SendError,
};

/// A server-side HTTP connection.
///
/// Reads pipelined requests from the transport, hands each one to the
/// handler with a streaming [`BodySource`] and writes the response. The loop
/// runs until the peer closes, the request asks for close, a receive timeout
/// fires, or a protocol error occurs.
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<TrackedReader<R>, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    activity: ReceiveActivity,
    receive_timeout: Option<Duration>,
    state: ConnState,
    counters: ConnCounters,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, options: &HttpOptions) -> Self {
        let activity = ReceiveActivity::new();
        Self {
            framed_read: FramedRead::with_capacity(
                TrackedReader::new(reader, activity.clone()),
                RequestDecoder::new(options),
                8 * 1024,
            ),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            activity,
            receive_timeout: options.receive_timeout,
            state: ConnState::ReceivingHeader,
            counters: ConnCounters::default(),
        }
    }

    pub fn counters(&self) -> ConnCounters {
        self.counters
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Serves requests until the connection ends.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler<BodySource>,
        H::RespBody: Body<Data = Bytes> + Unpin + Send,
        <H::RespBody as Body>::Error: Display,
    {
        loop {
            self.state = ConnState::ReceivingHeader;
            match self.next_frame().await? {
                Some(Ok(Message::Header((header, body_kind)))) => {
                    self.counters.messages_received += 1;
                    let close_after = wants_close(&header);
                    self.do_process(header, body_kind, &handler).await?;
                    if close_after {
                        debug!("request asked for connection close");
                        return Ok(());
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("received body bytes while expecting a request head");
                    let error_response = build_error_response(StatusCode::BAD_REQUEST);
                    self.do_send_response(error_response).await?;
                    return Err(ParseError::invalid_body("need header while receiving body").into());
                }

                Some(Err(e)) => {
                    error!("failed to decode next request, cause {e}");
                    let error_response = build_error_response(StatusCode::BAD_REQUEST);
                    self.do_send_response(error_response).await?;
                    return Err(e.into());
                }

                None => {
                    // classify the disconnect against the decoder state
                    let buffer = self.framed_read.read_buffer().clone();
                    self.framed_read.decoder_mut().on_disconnect(&buffer)?;
                    info!(
                        received = self.counters.messages_received,
                        sent = self.counters.messages_sent,
                        "peer closed connection"
                    );
                    return Ok(());
                }
            }
        }
    }

    /// Reads one frame, bounded by the receive timeout when configured.
    async fn next_frame(
        &mut self,
    ) -> Result<Option<Result<Message<(RequestHeader, BodyKind)>, ParseError>>, HttpError> {
        next_message(&mut self.framed_read, &self.activity, self.receive_timeout).await
    }

    async fn do_process<H>(
        &mut self,
        header: RequestHeader,
        body_kind: BodyKind,
        handler: &Arc<H>,
    ) -> Result<(), HttpError>
    where
        H: Handler<BodySource>,
        H::RespBody: Body<Data = Bytes> + Unpin + Send,
        <H::RespBody as Body>::Error: Display,
    {
        // interim response for Expect: 100-continue before the body arrives
        if let Some(expect) = header.header().get_header("Expect") {
            if expect.len() >= 4 && expect[..4].eq_ignore_ascii_case("100-") {
                let writer = self.framed_write.get_mut();
                writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
                writer.flush().await.map_err(SendError::io)?;
                info!("sent 100 continue interim response");
            }
        }

        let source = source_for(body_kind);
        let request = build_request(&header, source.clone());

        self.state = ConnState::ReceivingBody;

        // run the handler and the body feed concurrently: the handler may
        // block on body data while the feed waits to push it
        let response_result = {
            tokio::pin! {
                let handle_future = handler.call(request);
            }

            let mut body_done = source.is_complete();
            loop {
                if body_done {
                    break handle_future.await;
                }
                select! {
                    biased;
                    response = &mut handle_future => break response,
                    fed = feed_one(&mut self.framed_read, &source, &self.activity, self.receive_timeout, &mut self.counters) => {
                        match fed {
                            Ok(done) => body_done = done,
                            Err(e) => {
                                source.destroy(e.to_string());
                                return Err(e);
                            }
                        }
                    }
                }
            }
        };

        // the handler is gone, suspension no longer applies to the drain
        source.resume();

        // drain whatever body the handler left unread
        while !source.is_complete() && !matches!(source.state(), crate::protocol::body::SourceState::Destroyed(_)) {
            match feed_one(&mut self.framed_read, &source, &self.activity, self.receive_timeout, &mut self.counters).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    source.destroy(e.to_string());
                    return Err(e);
                }
            }
        }

        self.send_response(response_result).await
    }

    async fn send_response<T, E>(&mut self, response_result: Result<Response<T>, E>) -> Result<(), HttpError>
    where
        T: Body<Data = Bytes> + Unpin,
        T::Error: Display,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        match response_result {
            Ok(response) => self.do_send_response(response).await,
            Err(e) => {
                error!("handler failed, cause: {}", e.into());
                let error_response = build_error_response(StatusCode::INTERNAL_SERVER_ERROR);
                self.do_send_response(error_response).await
            }
        }
    }

    async fn do_send_response<T>(&mut self, response: Response<T>) -> Result<(), HttpError>
    where
        T: Body<Data = Bytes> + Unpin,
        T::Error: Display,
    {
        use http_body_util::BodyExt;

        let (parts, mut body) = response.into_parts();

        let body_kind = {
            let size_hint = body.size_hint();
            match size_hint.exact() {
                Some(0) => BodyKind::Empty,
                Some(length) => BodyKind::Length(length),
                None => BodyKind::Chunked,
            }
        };

        let head = response_head_from_parts(parts)?;
        let header_item = Message::Header((head, body_kind));
        if body_kind.is_empty() {
            self.framed_write.send(header_item).await?;
        } else {
            self.framed_write.feed(header_item).await?;
        }

        loop {
            match body.frame().await {
                Some(Ok(frame)) => {
                    let payload_item = frame
                        .into_data()
                        .map(PayloadItem::Chunk)
                        .map_err(|_| SendError::invalid_body("response body yielded a non-data frame"))?;
                    self.framed_write.send(Message::Payload(payload_item)).await?;
                }
                Some(Err(e)) => {
                    return Err(SendError::invalid_body(format!("response body failed: {e}")).into());
                }
                None => {
                    self.framed_write.send(Message::Payload(PayloadItem::Eof)).await?;
                    self.counters.messages_sent += 1;
                    return Ok(());
                }
            }
        }
    }
}

/// Reads one frame, with the deadline measured from the last byte received
/// rather than from the last decoded frame.
async fn next_message<R: AsyncRead + Unpin>(
    framed_read: &mut FramedRead<TrackedReader<R>, RequestDecoder>,
    activity: &ReceiveActivity,
    receive_timeout: Option<Duration>,
) -> Result<Option<Result<Message<(RequestHeader, BodyKind)>, ParseError>>, HttpError> {
    let Some(limit) = receive_timeout else {
        return Ok(framed_read.next().await);
    };
    loop {
        let deadline = activity.deadline(limit);
        match tokio::time::timeout_at(deadline, framed_read.next()).await {
            Ok(item) => return Ok(item),
            Err(_) => {
                // bytes may have arrived without completing a frame
                if activity.deadline(limit) > deadline {
                    continue;
                }
                warn!(?limit, "no bytes received within the receive timeout");
                return Err(HttpError::timeout(limit));
            }
        }
    }
}

/// Feeds one decoded frame into the body source. Returns `true` at EOF.
async fn feed_one<R: AsyncRead + Unpin>(
    framed_read: &mut FramedRead<TrackedReader<R>, RequestDecoder>,
    source: &BodySource,
    activity: &ReceiveActivity,
    receive_timeout: Option<Duration>,
    counters: &mut ConnCounters,
) -> Result<bool, HttpError> {
    // a suspended source stalls transport reads until the consumer resumes
    // it, backpressuring the peer. The check runs after the handler's poll
    // in the biased select, so a suspend always lands before the next frame.
    if source.is_suspended() {
        let _ = source.on_resume().await;
        // the pause was consumer-driven, restart the receive clock
        activity.touch();
    }

    let item = next_message(framed_read, activity, receive_timeout).await?;

    match item {
        Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
            counters.body_bytes_received += bytes.len() as u64;
            source.append(bytes).map_err(|e| ParseError::invalid_body(e.to_string()))?;
            Ok(false)
        }
        Some(Ok(Message::Payload(PayloadItem::Eof))) => {
            source.set_complete();
            Ok(true)
        }
        Some(Ok(Message::Header(_))) => {
            Err(ParseError::invalid_body("received a header while expecting body bytes").into())
        }
        Some(Err(e)) => Err(e.into()),
        None => {
            let buffer = framed_read.read_buffer().clone();
            framed_read.decoder_mut().on_disconnect(&buffer)?;
            // an until-close body ends cleanly on disconnect
            source.set_complete();
            Ok(true)
        }
    }
}

/// Whether the request forbids reusing the connection afterwards.
fn wants_close(header: &RequestHeader) -> bool {
    let connection = header.header().get_header("Connection");
    match header.version() {
        Version::HTTP_11 => connection.is_some_and(|v| v.eq_ignore_ascii_case("close")),
        Version::HTTP_10 => !connection.is_some_and(|v| v.eq_ignore_ascii_case("keep-alive")),
        _ => true,
    }
}

fn build_request(header: &RequestHeader, source: BodySource) -> Request<BodySource> {
    let mut builder = Request::builder().method(header.method().clone()).uri(header.uri().clone()).version(header.version());
    if let Some(headers) = builder.headers_mut() {
        *headers = header.header().to_header_map();
    }
    // infallible: method, uri and version come from a parsed request
    builder.body(source).unwrap()
}

fn response_head_from_parts(parts: http::response::Parts) -> Result<ResponseHeader, SendError> {
    let mut head = ResponseHeader::new(parts.status);
    head.set_version(parts.version);
    for (name, value) in parts.headers.iter() {
        let value = value.to_str().map_err(|_| SendError::invalid_body(format!("non utf-8 value for {name}")))?;
        head.header_mut().add_header(name.as_str(), value).map_err(SendError::invalid_body)?;
    }
    Ok(head)
}

fn build_error_response(status_code: StatusCode) -> Response<Empty<Bytes>> {
    Response::builder().status(status_code).body(Empty::<Bytes>::new()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use indoc::indoc;
    use tracing::Level;
    use tracing_subscriber::FmtSubscriber;

    use crate::handler::make_handler;

    fn init_log() {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::TRACE)
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    async fn echo_handler(
        req: Request<BodySource>,
    ) -> Result<Response<Full<Bytes>>, Box<dyn Error + Send + Sync>> {
        let source = req.into_body();
        // wait until the whole body arrived
        let _ = source.on_end().await;
        let body = source.read_available().map_err(|e| e.to_string())?;
        Ok(Response::builder().status(StatusCode::OK).body(Full::new(body)).unwrap())
    }

    #[tokio::test]
    async fn serves_a_simple_get() {
        init_log();
        let input = "GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
        let reader = std::io::Cursor::new(input.as_bytes().to_vec());
        let mut output = Vec::new();

        let conn = HttpConnection::new(reader, &mut output, &HttpOptions::default());
        conn.process(Arc::new(make_handler(echo_handler))).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn echoes_a_fixed_length_body() {
        let input = indoc! {"
            POST /echo HTTP/1.1
            Host: x
            Content-Length: 5
            Connection: close

            hello"};
        let reader = std::io::Cursor::new(input.replace('\n', "\r\n").into_bytes());
        let mut output = Vec::new();

        let conn = HttpConnection::new(reader, &mut output, &HttpOptions::default());
        conn.process(Arc::new(make_handler(echo_handler))).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn serves_pipelined_requests() {
        let input = "GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
        let reader = std::io::Cursor::new(input.as_bytes().to_vec());
        let mut output = Vec::new();

        let conn = HttpConnection::new(reader, &mut output, &HttpOptions::default());
        conn.process(Arc::new(make_handler(echo_handler))).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches("HTTP/1.1 200 OK\r\n").count(), 2);
    }

    #[tokio::test]
    async fn suspended_source_stalls_body_reads() {
        init_log();

        async fn suspending_handler(
            req: Request<BodySource>,
        ) -> Result<Response<Full<Bytes>>, Box<dyn Error + Send + Sync>> {
            let source = req.into_body();
            source.suspend();
            tokio::time::sleep(Duration::from_millis(20)).await;
            // nothing was fed while suspended even though the bytes are
            // already buffered in the transport
            assert_eq!(source.available(), Some(0));
            source.resume();
            let _ = source.on_end().await;
            let body = source.read_available().map_err(|e| e.to_string())?;
            Ok(Response::builder().status(StatusCode::OK).body(Full::new(body)).unwrap())
        }

        let input = "POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello";
        let reader = std::io::Cursor::new(input.as_bytes().to_vec());
        let mut output = Vec::new();

        let conn = HttpConnection::new(reader, &mut output, &HttpOptions::default());
        conn.process(Arc::new(make_handler(suspending_handler))).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test(start_paused = true)]
    async fn receive_timeout_follows_bytes_not_frames() {
        use tokio::io::AsyncReadExt;

        let (mut peer, server) = tokio::io::duplex(1024);
        let (read_half, write_half) = tokio::io::split(server);

        let options = HttpOptions { receive_timeout: Some(Duration::from_secs(60)), ..HttpOptions::default() };

        // a single request head trickling in slower than one frame per
        // timeout window, but with bytes well inside it
        let peer_task = tokio::spawn(async move {
            for piece in ["GET /slow HT", "TP/1.1\r\nHost: x\r\n", "Connection: close\r\n\r\n"] {
                tokio::time::sleep(Duration::from_secs(45)).await;
                peer.write_all(piece.as_bytes()).await.unwrap();
            }
            let mut response = Vec::new();
            peer.read_to_end(&mut response).await.unwrap();
            response
        });

        let conn = HttpConnection::new(read_half, write_half, &options);
        conn.process(Arc::new(make_handler(echo_handler))).await.unwrap();

        let response = peer_task.await.unwrap();
        assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_times_out() {
        let (_peer, server) = tokio::io::duplex(1024);
        let (read_half, write_half) = tokio::io::split(server);

        let options = HttpOptions { receive_timeout: Some(Duration::from_secs(60)), ..HttpOptions::default() };
        let conn = HttpConnection::new(read_half, write_half, &options);

        let result = conn.process(Arc::new(make_handler(echo_handler))).await;
        assert!(matches!(result, Err(HttpError::Timeout { .. })));
    }

    #[test]
    fn http10_without_keepalive_closes() {
        let mut header = RequestHeader::new(http::Method::GET, "/".parse().unwrap());
        header.set_version(Version::HTTP_10);
        assert!(wants_close(&header));

        header.header_mut().set_header("Connection", "keep-alive").unwrap();
        assert!(!wants_close(&header));
    }

    #[test]
    fn http11_close_detected() {
        let mut header = RequestHeader::new(http::Method::GET, "/".parse().unwrap());
        assert!(!wants_close(&header));
        header.header_mut().set_header("Connection", "close").unwrap();
        assert!(wants_close(&header));
    }
}

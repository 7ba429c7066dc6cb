//! Line-delimited JSON-RPC transport over a pair of byte streams.
//!
//! A reader task decodes one request per input line and hands it to the
//! inbound channel; a writer task encodes each response from the outbound
//! channel as one output line. Both tasks observe a single one-shot
//! cancellation token, and a task tracker serves as the completion barrier.

use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, trace, warn};

use crate::mcp::rpc::{JsonRpcRequest, JsonRpcResponse};

/// tokio has no zero-capacity channel; one slot is the closest hand-off.
const CHANNEL_CAPACITY: usize = 1;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport already started")]
    AlreadyStarted,
    #[error("transport channels already taken")]
    ChannelsTaken,
    #[error("output stream failed: {0}")]
    WriteFailed(String),
}

struct PendingIo<R, W> {
    reader: R,
    writer: W,
    inbound: mpsc::Sender<JsonRpcRequest>,
    outbound: mpsc::Receiver<JsonRpcResponse>,
}

/// Adapts an input and an output byte stream into two typed channels.
///
/// The caller takes the inbound receiver with [`read_channel`](Self::read_channel)
/// and the outbound sender with [`write_channel`](Self::write_channel), calls
/// [`start`](Self::start), and finally [`close`](Self::close).
pub struct StdioTransport<R, W> {
    pending: Option<PendingIo<R, W>>,
    inbound: Option<mpsc::Receiver<JsonRpcRequest>>,
    outbound: Option<mpsc::Sender<JsonRpcResponse>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    write_failure: Arc<OnceLock<String>>,
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

        // Closed up front so `wait` can complete even if `start` never runs;
        // a closed tracker still accepts new tasks.
        let tasks = TaskTracker::new();
        tasks.close();

        Self {
            pending: Some(PendingIo {
                reader,
                writer,
                inbound: inbound_tx,
                outbound: outbound_rx,
            }),
            inbound: Some(inbound_rx),
            outbound: Some(outbound_tx),
            shutdown: CancellationToken::new(),
            tasks,
            write_failure: Arc::new(OnceLock::new()),
        }
    }

    /// Hands out the inbound request receiver. Returns `None` once taken.
    pub fn read_channel(&mut self) -> Option<mpsc::Receiver<JsonRpcRequest>> {
        self.inbound.take()
    }

    /// Hands out the outbound response sender. Returns `None` once taken.
    ///
    /// The writer exits normally when every clone of this sender is dropped.
    pub fn write_channel(&mut self) -> Option<mpsc::Sender<JsonRpcResponse>> {
        self.outbound.take()
    }

    /// Spawns the reader and writer tasks and returns immediately.
    pub fn start(&mut self) -> Result<(), TransportError> {
        let PendingIo {
            reader,
            writer,
            inbound,
            outbound,
        } = self.pending.take().ok_or(TransportError::AlreadyStarted)?;

        self.tasks
            .spawn(read_loop(reader, inbound, self.shutdown.clone()));
        self.tasks.spawn(write_loop(
            writer,
            outbound,
            self.shutdown.clone(),
            Arc::clone(&self.write_failure),
        ));

        debug!("stdio transport started");
        Ok(())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once shutdown has been signalled and both tasks have exited.
    pub async fn wait(&self) {
        self.shutdown.cancelled().await;
        self.tasks.wait().await;
    }

    /// Signals shutdown, waits for both tasks, then drops the outbound sender
    /// if it was never handed out. Safe to call more than once.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.shutdown.cancel();
        self.wait().await;
        self.outbound = None;
        self.pending = None;

        match self.write_failure.get() {
            Some(reason) => Err(TransportError::WriteFailed(reason.clone())),
            None => Ok(()),
        }
    }
}

impl<R, W> Drop for StdioTransport<R, W> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn read_loop<R>(
    reader: R,
    inbound: mpsc::Sender<JsonRpcRequest>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("reader stopping on shutdown");
                return;
            }
            read = reader.read_until(b'\n', &mut line) => read,
        };

        match read {
            Ok(0) => {
                info!("input stream closed");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "failed to read from input stream");
                break;
            }
        }

        let Some(request) = decode_request(&line) else {
            continue;
        };
        trace!(method = %request.method, id = ?request.id, "received request");

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("reader abandoned pending hand-off on shutdown");
                return;
            }
            sent = inbound.send(request) => {
                if sent.is_err() {
                    debug!("inbound receiver dropped");
                    break;
                }
            }
        }
    }

    // Exhausted input winds down the whole pipe.
    shutdown.cancel();
    drop(inbound);
}

fn decode_request(line: &[u8]) -> Option<JsonRpcRequest> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    match serde_json::from_slice::<JsonRpcRequest>(line) {
        Ok(request) => Some(request),
        Err(err) => {
            warn!(error = %err, len = line.len(), "dropping malformed request line");
            None
        }
    }
}

async fn write_loop<W>(
    writer: W,
    mut outbound: mpsc::Receiver<JsonRpcResponse>,
    shutdown: CancellationToken,
    write_failure: Arc<OnceLock<String>>,
) where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            response = outbound.recv() => match response {
                Some(response) => Some(response),
                None => {
                    debug!("outbound channel closed");
                    let _ = writer.flush().await;
                    return;
                }
            },
        };

        let Some(response) = next else {
            // Responses already queued are still written before exiting.
            while let Ok(response) = outbound.try_recv() {
                if let Err(err) = deliver(&mut writer, &response).await {
                    let _ = write_failure.set(err.to_string());
                    warn!(error = %err, "dropping queued responses after write failure");
                    return;
                }
            }
            let _ = writer.flush().await;
            debug!("writer stopping on shutdown");
            return;
        };

        if let Err(err) = deliver(&mut writer, &response).await {
            error!(error = %err, "output stream failed, shutting down transport");
            let _ = write_failure.set(err.to_string());
            shutdown.cancel();
            return;
        }
    }
}

/// Writes one response as a line and flushes. Encoding failures drop the
/// response and are not reported as errors.
async fn deliver<W>(writer: &mut BufWriter<W>, response: &JsonRpcResponse) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    // Unreachable for responses built from `serde_json::Value`, which always
    // encodes; kept so a future typed payload cannot stall the writer.
    let payload = match serde_json::to_vec(response) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, id = %response.id, "dropping response that failed to encode");
            return Ok(());
        }
    };

    trace!(len = payload.len(), "writing response");
    writer.write_all(&payload).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
        time::Duration,
    };

    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        transport: StdioTransport<DuplexStream, DuplexStream>,
        input: DuplexStream,
        output: BufReader<DuplexStream>,
        requests: mpsc::Receiver<JsonRpcRequest>,
        responses: mpsc::Sender<JsonRpcResponse>,
    }

    fn harness() -> Harness {
        let (input, transport_in) = tokio::io::duplex(64 * 1024);
        let (transport_out, output) = tokio::io::duplex(64 * 1024);
        let mut transport = StdioTransport::new(transport_in, transport_out);
        let requests = transport.read_channel().expect("read channel");
        let responses = transport.write_channel().expect("write channel");
        transport.start().expect("start");

        Harness {
            transport,
            input,
            output: BufReader::new(output),
            requests,
            responses,
        }
    }

    async fn next_request(requests: &mut mpsc::Receiver<JsonRpcRequest>) -> JsonRpcRequest {
        tokio::time::timeout(WAIT, requests.recv())
            .await
            .expect("request in time")
            .expect("channel open")
    }

    async fn next_line(output: &mut BufReader<DuplexStream>) -> String {
        let mut line = String::new();
        tokio::time::timeout(WAIT, output.read_line(&mut line))
            .await
            .expect("line in time")
            .expect("readable output");
        line
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn ping_round_trip_writes_exact_line() {
        let mut h = harness();
        h.input
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\",\"params\":{}}\n")
            .await
            .expect("write input");

        let request = next_request(&mut h.requests).await;
        assert_eq!(request.id, Some(json!(1)));
        assert_eq!(request.method, "ping");

        h.responses
            .send(JsonRpcResponse::result(request.response_id(), json!("pong")))
            .await
            .expect("writer alive");

        assert_eq!(
            next_line(&mut h.output).await,
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":\"pong\"}\n"
        );
    }

    #[tokio::test]
    async fn null_id_is_delivered_and_echoed() {
        let mut h = harness();
        h.input
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":null,\"method\":\"ping\"}\n")
            .await
            .expect("write input");

        let request = next_request(&mut h.requests).await;
        assert_eq!(request.id, Some(Value::Null));
        assert!(!request.is_notification());

        h.responses
            .send(JsonRpcResponse::result(request.response_id(), json!({})))
            .await
            .expect("writer alive");

        assert_eq!(
            next_line(&mut h.output).await,
            "{\"jsonrpc\":\"2.0\",\"id\":null,\"result\":{}}\n"
        );
    }

    #[tokio::test]
    async fn requests_arrive_in_input_order() {
        let mut h = harness();
        let mut input = String::new();
        for index in 0..25 {
            input.push_str(&format!(
                "{{\"jsonrpc\":\"2.0\",\"id\":{index},\"method\":\"method-{index}\",\"params\":{{}}}}\n"
            ));
        }
        h.input.write_all(input.as_bytes()).await.expect("write input");

        for index in 0..25 {
            let request = next_request(&mut h.requests).await;
            assert_eq!(request.id, Some(json!(index)));
            assert_eq!(request.method, format!("method-{index}"));
        }
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_without_stopping_reader() {
        let mut h = harness();
        h.input
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"a\",\"params\":{}}\n\
                  not json\n\
                  \n\
                  {\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"x\",\"params\":{}}\r\n",
            )
            .await
            .expect("write input");

        assert_eq!(next_request(&mut h.requests).await.id, Some(json!(1)));
        assert_eq!(next_request(&mut h.requests).await.id, Some(json!(2)));
        assert!(
            tokio::time::timeout(Duration::from_millis(50), h.requests.recv())
                .await
                .is_err(),
            "no request expected for malformed input"
        );

        h.input
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":\"three\",\"method\":\"y\"}\n")
            .await
            .expect("write input");
        assert_eq!(next_request(&mut h.requests).await.id, Some(json!("three")));
        assert!(!h.transport.is_shutting_down());
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_dropped() {
        let mut h = harness();
        h.input.write_all(b"\xff\xfe{oops\n").await.expect("write input");
        h.input
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":5,\"method\":\"z\"}\n")
            .await
            .expect("write input");

        assert_eq!(next_request(&mut h.requests).await.id, Some(json!(5)));
    }

    #[tokio::test]
    async fn back_to_back_responses_are_not_interleaved() {
        let mut h = harness();
        let first = JsonRpcResponse::result(json!(1), json!({"text": "a".repeat(2048)}));
        let second = JsonRpcResponse::error(json!(2), -32601, "Method not found");

        h.responses.send(first.clone()).await.expect("writer alive");
        h.responses.send(second.clone()).await.expect("writer alive");

        let expected_first = format!("{}\n", serde_json::to_string(&first).expect("encode"));
        let expected_second = format!("{}\n", serde_json::to_string(&second).expect("encode"));
        assert_eq!(next_line(&mut h.output).await, expected_first);
        assert_eq!(next_line(&mut h.output).await, expected_second);
    }

    #[tokio::test]
    async fn input_eof_closes_inbound_and_cancels() {
        let mut h = harness();
        drop(h.input);

        let closed = tokio::time::timeout(WAIT, h.requests.recv())
            .await
            .expect("channel closes in time");
        assert!(closed.is_none());
        assert!(h.transport.is_shutting_down());

        tokio::time::timeout(WAIT, h.transport.wait())
            .await
            .expect("wait returns after eof");
    }

    #[tokio::test]
    async fn close_stops_output_and_inbound() {
        let mut h = harness();
        h.transport.close().await.expect("clean close");

        let closed = tokio::time::timeout(WAIT, h.requests.recv())
            .await
            .expect("channel closes in time");
        assert!(closed.is_none());

        assert!(h
            .responses
            .send(JsonRpcResponse::result(json!(1), json!({})))
            .await
            .is_err());

        let mut rest = String::new();
        let read = h.output.read_line(&mut rest).await.expect("readable output");
        assert_eq!(read, 0, "no bytes after close");
    }

    #[tokio::test]
    async fn queued_response_is_written_before_close() {
        let mut h = harness();
        let response = JsonRpcResponse::result(json!(9), json!("late"));
        h.responses.send(response).await.expect("writer alive");
        h.transport.close().await.expect("clean close");

        assert_eq!(
            next_line(&mut h.output).await,
            "{\"jsonrpc\":\"2.0\",\"id\":9,\"result\":\"late\"}\n"
        );
    }

    #[tokio::test]
    async fn wait_after_shutdown_returns_immediately() {
        let mut h = harness();
        h.transport.close().await.expect("clean close");

        tokio::time::timeout(Duration::from_millis(100), h.transport.wait())
            .await
            .expect("wait does not block after shutdown");
        h.transport.close().await.expect("second close is harmless");
    }

    #[tokio::test]
    async fn wait_requires_cancellation_even_when_outbound_closes() {
        let h = harness();
        let Harness {
            transport,
            input,
            responses,
            ..
        } = h;
        drop(responses);

        assert!(
            tokio::time::timeout(Duration::from_millis(50), transport.wait())
                .await
                .is_err(),
            "reader is still running"
        );

        drop(input);
        tokio::time::timeout(WAIT, transport.wait())
            .await
            .expect("wait returns once input ends");
    }

    #[tokio::test]
    async fn write_failure_cancels_transport() {
        let (_input, transport_in) = tokio::io::duplex(1024);
        let mut transport = StdioTransport::new(transport_in, BrokenPipe);
        let responses = transport.write_channel().expect("write channel");
        transport.start().expect("start");

        responses
            .send(JsonRpcResponse::result(json!(1), json!({})))
            .await
            .expect("writer alive");

        tokio::time::timeout(WAIT, transport.wait())
            .await
            .expect("write failure ends the session");
        assert!(transport.is_shutting_down());

        let err = transport.close().await.expect_err("write failure reported");
        assert!(matches!(err, TransportError::WriteFailed(_)));
    }

    #[tokio::test]
    async fn close_before_start_returns() {
        let (_input, transport_in) = tokio::io::duplex(64);
        let (transport_out, _output) = tokio::io::duplex(64);
        let mut transport = StdioTransport::new(transport_in, transport_out);

        tokio::time::timeout(WAIT, transport.close())
            .await
            .expect("close in time")
            .expect("clean close");
        assert!(matches!(
            transport.start(),
            Err(TransportError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn channels_are_handed_out_once() {
        let mut h = harness();
        assert!(h.transport.read_channel().is_none());
        assert!(h.transport.write_channel().is_none());
        assert!(matches!(
            h.transport.start(),
            Err(TransportError::AlreadyStarted)
        ));
        h.transport.close().await.expect("clean close");
    }
}

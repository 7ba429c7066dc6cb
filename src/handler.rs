//! Request handling seam and the processing loop that drives a transport.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::mcp::rpc::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::{StdioTransport, TransportError};

/// Turns one request into at most one response. Returning `None` sends nothing,
/// which is how notifications are acknowledged.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse>;
}

/// Starts the transport, feeds every inbound request to `handler` in arrival
/// order and submits the responses. Closes the transport once input ends.
pub async fn serve<R, W, H>(
    mut transport: StdioTransport<R, W>,
    handler: &H,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    H: RequestHandler + ?Sized,
{
    let (Some(mut requests), Some(responses)) =
        (transport.read_channel(), transport.write_channel())
    else {
        return Err(TransportError::ChannelsTaken);
    };
    transport.start()?;
    info!("serving JSON-RPC on stdio");

    while let Some(request) = requests.recv().await {
        let method = request.method.clone();
        let Some(response) = handler.handle(request).await else {
            debug!(method = %method, "no response for request");
            continue;
        };

        if responses.send(response).await.is_err() {
            warn!(method = %method, "writer stopped, dropping response");
            break;
        }
    }

    drop(responses);
    let outcome = transport.close().await;
    info!("stdio transport closed");
    outcome
}

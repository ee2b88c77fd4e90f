use std::io;

use rmcp::service::{RoleClient, RoleServer, RxJsonRpcMessage, ServiceRole, TxJsonRpcMessage};
use rmcp::transport::Transport as RmcpTransport;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Channel-backed rmcp transport.
///
/// SSE and websocket pumps run as background tasks; this adapter is the
/// seam the rmcp service layer drives. Outbound frames go to whatever task
/// consumes the sender half; inbound frames arrive on the receiver half.
pub(crate) struct ChannelTransport<R: ServiceRole> {
    outbound: UnboundedSender<TxJsonRpcMessage<R>>,
    inbound: UnboundedReceiver<RxJsonRpcMessage<R>>,
}

impl<R: ServiceRole> ChannelTransport<R> {
    pub(crate) fn new(
        outbound: UnboundedSender<TxJsonRpcMessage<R>>,
        inbound: UnboundedReceiver<RxJsonRpcMessage<R>>,
    ) -> Self {
        Self { outbound, inbound }
    }
}

impl<R: ServiceRole> RmcpTransport<R> for ChannelTransport<R> {
    type Error = io::Error;

    fn send(
        &mut self,
        item: TxJsonRpcMessage<R>,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send + 'static {
        let tx = self.outbound.clone();
        async move {
            tx.send(item).map_err(|_| {
                io::Error::new(io::ErrorKind::BrokenPipe, "transport channel closed")
            })
        }
    }

    async fn receive(&mut self) -> Option<RxJsonRpcMessage<R>> {
        self.inbound.recv().await
    }

    fn close(&mut self) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send {
        self.inbound.close();
        std::future::ready(Ok(()))
    }
}

/// Crossed channel pair for serving a client and a server in one process.
pub(crate) fn duplex_pair() -> (ChannelTransport<RoleClient>, ChannelTransport<RoleServer>) {
    let (client_tx, client_rx) = unbounded_channel();
    let (server_tx, server_rx) = unbounded_channel();
    (
        ChannelTransport::new(client_tx, server_rx),
        ChannelTransport::new(server_tx, client_rx),
    )
}

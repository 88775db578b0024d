use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::context::ServerContext;
use crate::http::handler::Handler;
use crate::server::driver::serve_connection;

pub async fn run(context: ServerContext, handler: Arc<dyn Handler>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&context.options().listen_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    serve(listener, context, handler).await
}

/// Accepts connections forever, one task per connection.
pub async fn serve(
    listener: TcpListener,
    context: ServerContext,
    handler: Arc<dyn Handler>,
) -> anyhow::Result<()> {
    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                continue;
            }
        };
        debug!("Accepted connection from {}", addr);

        let peer = socket.peer_addr().ok();
        let handler = Arc::clone(&handler);
        let context = context.clone();

        tokio::spawn(async move {
            if let Err(e) = serve_connection(socket, peer, handler, context).await {
                tracing::error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

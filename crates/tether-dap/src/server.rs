use std::io;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::backend::Backend;
use crate::client::Client;
use crate::error::SessionError;
use crate::session::Session;

/// Runs a single session over the process's stdin and stdout.
pub async fn serve_stdio<B, F>(init: F) -> Result<(), SessionError>
where
    B: Backend,
    F: FnOnce(Client) -> B,
{
    info!("Serving a session on stdio");
    Session::new(tokio::io::stdin(), tokio::io::stdout(), init).run().await
}

/// Accepts connections forever, running one independent session per peer.
pub async fn serve_tcp<B, F>(listener: TcpListener, make_backend: F) -> io::Result<()>
where
    B: Backend,
    F: Fn(Client) -> B + Clone + Send + 'static,
{
    info!(address = %listener.local_addr()?, "Listening for debug clients");

    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "Accepted connection");

        let (reader, writer) = stream.into_split();
        let make_backend = make_backend.clone();

        tokio::spawn(async move {
            match Session::new(reader, writer, make_backend).run().await {
                Ok(()) => info!(%peer, "Connection closed"),
                Err(e) => error!(%peer, error = %e, "Session ended with an error"),
            }
        });
    }
}

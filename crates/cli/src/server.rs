// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! A plain HTTP/1.1 and HTTP/2 server loop, with graceful shutdown

use std::{
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

use hyper::{Request, Response};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Connection,
    service::TowerToHyperService,
};
use pin_project_lite::pin_project;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tower::Service;
use tower_http::add_extension::AddExtension;
use tracing::Instrument;

pin_project! {
    /// A wrapper around a connection which starts a graceful shutdown of the
    /// connection once the cancellation token is cancelled.
    struct AbortableConnection<C> {
        #[pin]
        connection: C,
        #[pin]
        cancellation_future: WaitForCancellationFutureOwned,
        did_start_shutdown: bool,
    }
}

impl<C> AbortableConnection<C> {
    fn new(connection: C, cancellation_token: CancellationToken) -> Self {
        Self {
            connection,
            cancellation_future: cancellation_token.cancelled_owned(),
            did_start_shutdown: false,
        }
    }
}

impl<T, S, B> Future
    for AbortableConnection<Connection<'static, T, TowerToHyperService<S>, TokioExecutor>>
where
    Connection<'static, T, TowerToHyperService<S>, TokioExecutor>: Future,
    S: Service<Request<hyper::body::Incoming>, Response = Response<B>> + Send + Clone + 'static,
    S::Future: Send + 'static,
    S::Error: std::error::Error + Send + Sync,
    T: hyper::rt::Read + hyper::rt::Write + Unpin,
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    type Output = <Connection<'static, T, TowerToHyperService<S>, TokioExecutor> as Future>::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        if let Poll::Ready(()) = this.cancellation_future.poll(cx) {
            if !*this.did_start_shutdown {
                *this.did_start_shutdown = true;
                this.connection.as_mut().graceful_shutdown();
            }
        }

        this.connection.poll(cx)
    }
}

/// Serve connections accepted on the listener with the given service.
///
/// The address of the peer is added to the request extensions as a
/// [`SocketAddr`]. On soft shutdown, the listener stops accepting and every
/// connection is asked to finish its in-flight requests. On hard shutdown,
/// the remaining connections are dropped.
pub async fn run<S, B>(
    listener: TcpListener,
    service: S,
    soft_shutdown_token: CancellationToken,
    hard_shutdown_token: CancellationToken,
) where
    S: Service<Request<hyper::body::Incoming>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    // If this task crashes, the rest of the process should shut down
    let _guard = soft_shutdown_token.clone().drop_guard();

    let mut connection_tasks = tokio::task::JoinSet::new();

    loop {
        tokio::select! {
            biased;

            () = soft_shutdown_token.cancelled() => {
                tracing::debug!("Shutting down listener");
                break;
            },

            res = connection_tasks.join_next(), if !connection_tasks.is_empty() => {
                match res {
                    Some(Ok(())) => { /* Errors are logged in the connection task */ },
                    Some(Err(e)) => tracing::error!(error = &e as &dyn std::error::Error, "Join error"),
                    None => tracing::error!("Join set was polled even though it was empty"),
                }
            },

            res = listener.accept() => {
                let (stream, peer_addr) = match res {
                    Ok(res) => res,
                    Err(e) => {
                        tracing::warn!(error = &e as &dyn std::error::Error, "Failed to accept connection from the underlying socket");
                        continue;
                    }
                };

                let mut builder = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new());
                builder.http1().keep_alive(true);

                let service = TowerToHyperService::new(AddExtension::<_, SocketAddr>::new(service.clone(), peer_addr));
                let connection = builder
                    .serve_connection(TokioIo::new(stream), service)
                    .into_owned();

                let token = soft_shutdown_token.child_token();
                let span = tracing::info_span!(
                    "connection",
                    network.peer.address = %peer_addr.ip(),
                    network.peer.port = peer_addr.port(),
                );

                connection_tasks.spawn(async move {
                    tracing::debug!("Accepted connection");
                    if let Err(e) = AbortableConnection::new(connection, token).await {
                        tracing::warn!(error = &*e as &dyn std::error::Error, "Failed to serve connection");
                    }
                }.instrument(span));
            },
        }
    }

    if !connection_tasks.is_empty() {
        tracing::info!(
            "There are {active} active connections, performing a graceful shutdown. Send the shutdown signal again to force.",
            active = connection_tasks.len(),
        );

        while !connection_tasks.is_empty() {
            tokio::select! {
                biased;

                res = connection_tasks.join_next() => {
                    match res {
                        Some(Ok(())) => {},
                        Some(Err(e)) => tracing::error!(error = &e as &dyn std::error::Error, "Join error"),
                        None => tracing::error!("Join set was polled even though it was empty"),
                    }
                },

                () = hard_shutdown_token.cancelled() => {
                    tracing::warn!(
                        "Forcing shutdown ({active} active connections)",
                        active = connection_tasks.len(),
                    );
                    break;
                },
            }
        }
    }

    connection_tasks.shutdown().await;
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use bytes::Bytes;
    use http_body_util::{BodyExt, Empty, Full};
    use hyper_util::client::legacy::Client;
    use tower::service_fn;

    use super::*;

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local_addr = listener.local_addr().unwrap();

        let service = service_fn(|request: Request<hyper::body::Incoming>| async move {
            let peer = request
                .extensions()
                .get::<SocketAddr>()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_default();
            Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(peer))))
        });

        let soft = CancellationToken::new();
        let hard = CancellationToken::new();
        let server = tokio::spawn(run(listener, service, soft.clone(), hard.clone()));

        let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();
        let response = client
            .get(format!("http://{local_addr}/").parse().unwrap())
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "127.0.0.1");

        drop(client);
        soft.cancel();
        hard.cancel();
        server.await.unwrap();
    }
}

use super::socket::bind_tcp_socket;
use crate::{
  error::*,
  globals::Globals,
  hyper_ext::{body::BoxBody, rt::LocalExecutor},
  log::*,
  message_handler::HttpMessageHandler,
};
use derive_builder::Builder;
use http::{Request, Response};
use hyper::{body::Incoming, service::service_fn};
use hyper_util::{rt::TokioIo, server::conn::auto::Builder as ConnectionBuilder};
use std::{net::SocketAddr, sync::Arc};

/// Wrapper function to handle a request for HTTP/1.1 and HTTP/2
async fn serve_request(
  req: Request<Incoming>,
  handler: Arc<HttpMessageHandler>,
  client_addr: SocketAddr,
) -> PrevuResult<Response<BoxBody>> {
  handler.handle_request(req, client_addr).await
}

#[derive(Clone, Builder)]
/// Proxy main object responsible to serve requests received from clients at the given socket address.
pub(crate) struct Proxy {
  /// global context shared among async tasks
  pub globals: Arc<Globals>,
  /// listen socket address
  pub listening_on: SocketAddr,
  /// hyper connection builder serving http requests
  pub connection_builder: Arc<ConnectionBuilder<LocalExecutor>>,
  /// message handler serving incoming http requests
  pub message_handler: Arc<HttpMessageHandler>,
}

impl Proxy {
  /// Serves requests from clients
  fn serve_connection<I>(&self, stream: I, peer_addr: SocketAddr)
  where
    I: hyper::rt::Read + hyper::rt::Write + Send + Unpin + 'static,
  {
    let request_count = self.globals.request_count.clone();
    if request_count.increment() > self.globals.proxy_config.max_clients {
      request_count.decrement();
      return;
    }
    trace!("Request incoming: current # {}", request_count.current());

    let server_clone = self.connection_builder.clone();
    let message_handler_clone = self.message_handler.clone();
    self.globals.runtime_handle.clone().spawn(async move {
      server_clone
        .serve_connection_with_upgrades(
          stream,
          service_fn(move |req: Request<Incoming>| serve_request(req, message_handler_clone.clone(), peer_addr)),
        )
        .await
        .ok();

      request_count.decrement();
      trace!("Request processed: current # {}", request_count.current());
    });
  }

  /// Accept loop; terminates when the termination notify fires
  pub async fn start(&self) -> PrevuResult<()> {
    let listener_service = async {
      let tcp_socket = bind_tcp_socket(&self.listening_on)?;
      let tcp_listener = tcp_socket.listen(self.globals.proxy_config.tcp_listen_backlog)?;
      info!("Start TCP proxy serving with HTTP request for preview traffic");
      while let Ok((stream, client_addr)) = tcp_listener.accept().await {
        self.serve_connection(TokioIo::new(stream), client_addr);
      }
      Ok(()) as PrevuResult<()>
    };

    match self.globals.term_notify.as_ref() {
      Some(notify) => {
        tokio::select! {
          result = listener_service => {
            result?;
          }
          _ = notify.notified() => {
            info!("Terminate proxy service on {}", self.listening_on);
          }
        }
      }
      None => {
        listener_service.await?;
      }
    }
    Ok(())
  }
}

//! The server facade.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use contentsync_engine::{PeerEndpoint, PeerRequest, RequestMethod};
use contentsync_protocol::Envelope;
use serde_json::Value;
use std::sync::Arc;

/// The peer-facing synchronization server of one node.
///
/// Dispatches requests by path, enforces credential and connection
/// checks, and wraps every outcome in the response envelope. In a real
/// deployment an HTTP layer builds a `PeerRequest` per route and calls
/// `handle`; the loopback client does the same in-process.
pub struct SyncServer {
    context: Arc<HandlerContext>,
    handler: RequestHandler,
}

impl SyncServer {
    /// Creates a server over a handler context.
    pub fn new(context: HandlerContext) -> Self {
        let context = Arc::new(context);
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { context, handler }
    }

    /// Returns the handler context (credential store, ledger, config).
    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    /// Returns this server's configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Handles one peer request, always producing an envelope.
    pub fn handle(&self, request: PeerRequest) -> Envelope {
        match self.dispatch(&request) {
            Ok((message, payload)) => Envelope::success(message, payload),
            Err(error) => error.into_envelope(),
        }
    }

    fn dispatch(&self, request: &PeerRequest) -> ServerResult<(&'static str, Value)> {
        let path = request.path.trim_matches('/');
        let segments: Vec<&str> = path.split('/').collect();

        // Everything except site_name requires a valid credential.
        if path != "site_name" {
            self.context
                .credentials
                .verify(request.authorization.as_deref())?;
        }

        // Everything except the handshake endpoints requires an
        // established bidirectional connection.
        let handshake = matches!(path, "site_name" | "check_auth" | "add_connection");
        if !handshake {
            self.context.ledger.verify(request.origin.as_deref())?;
        }

        match (segments.as_slice(), request.method) {
            (["site_name"], RequestMethod::Get) => {
                Ok(("site name", self.handler.handle_site_name()?))
            }
            (["check_auth"], RequestMethod::Get) => {
                Ok(("authenticated", self.handler.handle_check_auth()?))
            }
            (["add_connection"], RequestMethod::Post) => Ok((
                "connection recorded",
                self.handler.handle_add_connection(&request.body)?,
            )),
            (["posts"], RequestMethod::Get) => {
                Ok(("posts listed", self.handler.handle_posts_list()?))
            }
            (["posts", "prepare"], RequestMethod::Post) => Ok((
                "post prepared",
                self.handler.handle_posts_prepare(&request.body)?,
            )),
            (["posts", id], RequestMethod::Get) => {
                Ok(("post found", self.handler.handle_posts_get(*id)?))
            }
            (["posts", gid, "connections"], RequestMethod::Get) => Ok((
                "connections listed",
                self.handler.handle_connections_get(*gid)?,
            )),
            (["posts", gid, "connections"], RequestMethod::Post) => Ok((
                "connection added",
                self.handler.handle_connections_add(*gid, &request.body)?,
            )),
            (["posts", gid, "connections"], RequestMethod::Delete) => Ok((
                "connection removed",
                self.handler.handle_connections_remove(*gid, &request.body)?,
            )),
            (["connected_posts"], RequestMethod::Get | RequestMethod::Post) => Ok((
                "connected posts",
                self.handler.handle_connected_posts(&request.body)?,
            )),
            (["distribution", "distribute-item"], RequestMethod::Post) => Ok((
                "item accepted",
                self.handler
                    .handle_distribute_item(&request.body, request.origin.as_deref())?,
            )),
            (["distribution", "update-item"], RequestMethod::Post) => Ok((
                "item updated",
                self.handler.handle_update_item(&request.body)?,
            )),
            _ => Err(ServerError::NotFound(format!(
                "{} {}",
                request.method.as_str(),
                request.path
            ))),
        }
    }
}

impl PeerEndpoint for SyncServer {
    fn handle(&self, request: PeerRequest) -> Envelope {
        SyncServer::handle(self, request)
    }
}

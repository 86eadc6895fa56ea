//! Length-framed duplex front door (C8): lets the gateway itself be
//! embedded as a subprocess by an agent client, speaking the same
//! bit-exact `Content-Length`-framed JSON-RPC the subprocess backend
//! driver speaks to its own children, over the gateway process's own
//! stdin/stdout.
//!
//! Requests and responses may interleave: each frame read off stdin is
//! dispatched on its own task so a slow tool call never blocks the next
//! request from being read, matching the "single in-flight conversation,
//! responses correlated by id" contract. Writes to stdout are serialized
//! behind a mutex since only one physical pipe exists.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::BufReader;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::rpc::{RpcHandler, RpcOutcome};
use crate::identity::Credentials;
use crate::transport::framing::{read_frame, write_frame};

/// Serve JSON-RPC requests framed over stdin/stdout until stdin reaches a
/// clean EOF or a framing violation is observed.
pub async fn serve(handler: Arc<RpcHandler>) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let writer = Arc::new(Mutex::new(tokio::io::stdout()));

    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("stdio front door closed (EOF)");
                break;
            }
            Err(e) => {
                error!(error = %e, "framing violation on stdio front door, closing connection");
                break;
            }
        };

        let value: Value = match serde_json::from_str(&frame) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "invalid JSON on stdio front door");
                continue;
            }
        };

        let handler = handler.clone();
        let writer = writer.clone();
        tokio::spawn(async move {
            // Stdio embedding carries no per-request headers; credentials
            // are anonymous unless a future revision threads a static
            // bearer token through from process configuration.
            let credentials = Credentials::default();
            match handler.dispatch(&credentials, &value).await {
                RpcOutcome::Response(response) => {
                    let Ok(payload) = serde_json::to_string(&response) else {
                        error!("failed to serialize JSON-RPC response");
                        return;
                    };
                    let mut out = writer.lock().await;
                    if let Err(e) = write_frame(&mut *out, &payload).await {
                        error!(error = %e, "failed writing to stdio front door");
                    }
                }
                RpcOutcome::Notification => {}
            }
        });
    }
}

//! Country data server.
//!
//! One data server owns one country's lifecycle: it checks the on-disk
//! cache, downloads and unpacks the country dump when needed, filters and
//! joins the records, hands the built index to the manager, and then stays
//! resident to honour trace and shutdown commands until told to stop.
//!
//! # Supervision
//!
//! [`spawn`] starts two tasks: the worker running the startup pipeline and a
//! supervisor that awaits the worker and reports its terminal reason (or
//! panic) on the fleet channel. A crash in one country's worker is therefore
//! just another event to the manager; it cannot take anything else down.

pub mod archive;
mod event;
mod exit;
mod pipeline;

pub use event::{ProgressEvent, ServerEvent, Substatus};
pub use exit::ServerExit;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Settings;
use crate::upstream::GeonamesClient;

/// Unique identity of one data-server incarnation.
///
/// A restarted country gets a fresh id, so stale events from a previous
/// incarnation can never be attributed to the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerId(u64);

impl ServerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Asynchronous commands a live data server accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCommand {
    /// Toggle verbose logging without interrupting work.
    Trace(bool),
    /// Orderly termination with reason `stopped`.
    Shutdown,
}

/// The manager's grip on a live data server.
#[derive(Debug)]
pub struct ServerHandle {
    id: ServerId,
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<ServerCommand>,
    abort: AbortHandle,
}

impl ServerHandle {
    /// Identity of this incarnation.
    pub fn id(&self) -> ServerId {
        self.id
    }

    /// Forward a trace toggle to the worker.
    pub fn send_trace(&self, enabled: bool) {
        let _ = self.commands.send(ServerCommand::Trace(enabled));
    }

    /// Request orderly shutdown. In-flight downloads are cancelled; the
    /// cache file survives.
    pub fn shutdown(&self) {
        let _ = self.commands.send(ServerCommand::Shutdown);
        self.cancel.cancel();
    }

    /// Forcibly kill the worker. Used by `reset` against lingering handles;
    /// no orderly cleanup runs.
    pub fn kill(&self) {
        self.cancel.cancel();
        self.abort.abort();
    }
}

/// Registered name of a country's data server.
pub fn server_name(country_code: &str) -> String {
    format!("country_server_{}", country_code.to_lowercase())
}

/// Spawn a data server for a country.
///
/// Returns the handle the manager stores in the country's status record.
/// The worker announces itself, runs the startup pipeline, and parks for
/// commands; the supervisor reports its exit on `events`.
pub fn spawn<C: GeonamesClient>(
    country_code: &str,
    settings: Arc<Settings>,
    client: Arc<C>,
    events: mpsc::UnboundedSender<ServerEvent>,
) -> ServerHandle {
    let id = ServerId::next();
    let name = server_name(country_code);
    let cancel = CancellationToken::new();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let context = pipeline::ServerContext::new(
        id,
        country_code,
        &name,
        settings,
        client,
        events.clone(),
        cancel.clone(),
        command_rx,
    );

    debug!(server = %name, id = %id, "spawning country data server");

    let worker = tokio::spawn(pipeline::run(context));
    let abort = worker.abort_handle();

    tokio::spawn(async move {
        let exit = match worker.await {
            Ok(exit) => exit,
            Err(e) if e.is_cancelled() => ServerExit::Error("worker killed".to_string()),
            Err(e) => ServerExit::Error(format!("worker panicked: {}", e)),
        };
        debug!(server = %name, id = %id, exit = %exit, "country data server exited");
        let _ = events.send(ServerEvent::Exited { id, exit });
    });

    ServerHandle {
        id,
        cancel,
        commands: command_tx,
        abort,
    }
}

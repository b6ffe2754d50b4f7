//! Manager command contract.
//!
//! Every fleet mutation and every fleet read is a command on the manager's
//! channel; each command carries a oneshot reply sender. [`ManagerHandle`]
//! is the cloneable client side handed to the HTTP surface and the CLI.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::sort::{SortColumn, SortDirection};
use super::status::CountryStatusView;
use crate::index::CountryIndex;

/// Operator-visible command failures. No state changes when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// `start` on a country that is not stopped.
    #[error("already_started")]
    AlreadyStarted,
    /// Country code not in the catalog.
    #[error("country_server_not_found")]
    CountryServerNotFound,
    /// `reset` on a country that is not crashed.
    #[error("server_not_crashed")]
    ServerNotCrashed,
    /// Per-country trace toggle for a country without a live server.
    #[error("no_such_country_server")]
    NoSuchCountryServer,
}

/// Full fleet snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    /// Manager-wide trace flag.
    pub trace: bool,
    /// Every country, in current presentation order.
    pub servers: Vec<CountryStatusView>,
}

/// Outcome of a command addressing a single country.
pub type CountryReply = Result<CountryStatusView, CommandError>;

/// A command to the country manager.
#[derive(Debug)]
pub enum ManagerCommand {
    Status {
        reply: oneshot::Sender<StatusSnapshot>,
    },
    StatusStarted {
        reply: oneshot::Sender<Vec<CountryStatusView>>,
    },
    Start {
        code: String,
        reply: oneshot::Sender<CountryReply>,
    },
    StartAll {
        reply: oneshot::Sender<Vec<CountryStatusView>>,
    },
    Shutdown {
        code: String,
        reply: oneshot::Sender<CountryReply>,
    },
    ShutdownAll {
        reply: oneshot::Sender<Vec<CountryStatusView>>,
    },
    Terminate {
        reply: oneshot::Sender<()>,
    },
    Reset {
        code: String,
        reply: oneshot::Sender<CountryReply>,
    },
    ResetAll {
        reply: oneshot::Sender<Vec<CountryStatusView>>,
    },
    SetTrace {
        enabled: bool,
        reply: oneshot::Sender<bool>,
    },
    SetCountryTrace {
        code: String,
        enabled: bool,
        reply: oneshot::Sender<CountryReply>,
    },
    Sort {
        direction: SortDirection,
        column: SortColumn,
        reply: oneshot::Sender<Vec<CountryStatusView>>,
    },
    LoadedIndexes {
        reply: oneshot::Sender<Vec<Arc<CountryIndex>>>,
    },
}

/// The manager is gone (terminated or crashed); no reply will come.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("country manager unavailable")]
pub struct ManagerUnavailable;

/// Cloneable client side of the manager's command channel.
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    commands: mpsc::UnboundedSender<ManagerCommand>,
}

impl ManagerHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<ManagerCommand>) -> Self {
        Self { commands }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ManagerCommand,
    ) -> Result<T, ManagerUnavailable> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| ManagerUnavailable)?;
        rx.await.map_err(|_| ManagerUnavailable)
    }

    /// Full fleet snapshot in presentation order.
    pub async fn status(&self) -> Result<StatusSnapshot, ManagerUnavailable> {
        self.request(|reply| ManagerCommand::Status { reply }).await
    }

    /// Only the countries currently serving searches.
    pub async fn status_started(&self) -> Result<Vec<CountryStatusView>, ManagerUnavailable> {
        self.request(|reply| ManagerCommand::StatusStarted { reply })
            .await
    }

    /// Start one country's data server.
    pub async fn start(&self, code: &str) -> Result<CountryReply, ManagerUnavailable> {
        let code = code.to_uppercase();
        self.request(|reply| ManagerCommand::Start { code, reply })
            .await
    }

    /// Start every stopped country.
    pub async fn start_all(&self) -> Result<Vec<CountryStatusView>, ManagerUnavailable> {
        self.request(|reply| ManagerCommand::StartAll { reply })
            .await
    }

    /// Shut one country's data server down.
    pub async fn shutdown(&self, code: &str) -> Result<CountryReply, ManagerUnavailable> {
        let code = code.to_uppercase();
        self.request(|reply| ManagerCommand::Shutdown { code, reply })
            .await
    }

    /// Shut every live data server down; the manager stays up.
    pub async fn shutdown_all(&self) -> Result<Vec<CountryStatusView>, ManagerUnavailable> {
        self.request(|reply| ManagerCommand::ShutdownAll { reply })
            .await
    }

    /// Shut everything down and exit the manager once the fleet is quiet.
    pub async fn terminate(&self) -> Result<(), ManagerUnavailable> {
        self.request(|reply| ManagerCommand::Terminate { reply })
            .await
    }

    /// Return a crashed country to its initial stopped state.
    pub async fn reset(&self, code: &str) -> Result<CountryReply, ManagerUnavailable> {
        let code = code.to_uppercase();
        self.request(|reply| ManagerCommand::Reset { code, reply })
            .await
    }

    /// Reset every crashed country.
    pub async fn reset_all(&self) -> Result<Vec<CountryStatusView>, ManagerUnavailable> {
        self.request(|reply| ManagerCommand::ResetAll { reply })
            .await
    }

    /// Toggle the manager-wide trace flag.
    pub async fn set_trace(&self, enabled: bool) -> Result<bool, ManagerUnavailable> {
        self.request(|reply| ManagerCommand::SetTrace { enabled, reply })
            .await
    }

    /// Toggle one data server's trace flag.
    pub async fn set_country_trace(
        &self,
        code: &str,
        enabled: bool,
    ) -> Result<CountryReply, ManagerUnavailable> {
        let code = code.to_uppercase();
        self.request(|reply| ManagerCommand::SetCountryTrace {
            code,
            enabled,
            reply,
        })
        .await
    }

    /// Reorder the presentation view.
    pub async fn sort(
        &self,
        direction: SortDirection,
        column: SortColumn,
    ) -> Result<Vec<CountryStatusView>, ManagerUnavailable> {
        self.request(|reply| ManagerCommand::Sort {
            direction,
            column,
            reply,
        })
        .await
    }

    /// The loaded index of every started country, for search handlers.
    pub async fn loaded_indexes(&self) -> Result<Vec<Arc<CountryIndex>>, ManagerUnavailable> {
        self.request(|reply| ManagerCommand::LoadedIndexes { reply })
            .await
    }
}

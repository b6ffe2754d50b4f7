//! The country manager daemon.
//!
//! The manager is the single authoritative holder of the per-country status
//! table and its only writer. It runs as one long-lived task and selects
//! across two channels: operator commands (each carrying a reply sender)
//! and the shared fleet channel the data servers narrate their lives on.
//! Everything that wants fleet state sends a message and awaits the reply,
//! which removes all locking.
//!
//! # Shutdown
//!
//! `terminate` shuts the fleet down, sets the pending-shutdown flag, and
//! the loop exits once no live handle remains. `shutdown_all` does the same
//! fleet sweep but clears the flag, so the manager stays up. Force-killed
//! and optimistically-stopped server ids are remembered in a reap set; their
//! trailing exit events are dropped instead of corrupting a rebuilt record.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::command::{CommandError, CountryReply, ManagerCommand, ManagerHandle, StatusSnapshot};
use super::sort::{compare_directed, SortColumn, SortDirection};
use super::status::{CountryStatus, CountryStatusView, ServerStatus};
use crate::catalog::Country;
use crate::config::Settings;
use crate::index::CountryIndex;
use crate::server::{
    self, ProgressEvent, ServerEvent, ServerExit, ServerHandle, ServerId, Substatus,
};
use crate::store::DocumentStore;
use crate::upstream::GeonamesClient;

/// The country manager.
///
/// # Type Parameters
///
/// * `C` - Upstream geonames client handed to spawned data servers
/// * `S` - Document store receiving per-country startup metadata
pub struct CountryManager<C, S> {
    /// The status table, keyed by country code.
    table: HashMap<String, CountryStatus>,

    /// Presentation order of the table, recomputed on sort commands.
    order: Vec<String>,

    /// Manager-wide trace flag.
    trace: bool,

    /// Set by `terminate`, cleared by `shutdown_all`.
    pending_shutdown: bool,

    /// Server ids whose exit events must be dropped silently.
    reaped: HashSet<ServerId>,

    settings: Arc<Settings>,
    client: Arc<C>,
    store: Arc<S>,

    commands: mpsc::UnboundedReceiver<ManagerCommand>,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    /// Kept so the events channel never closes, and cloned into every
    /// spawned data server.
    events_tx: mpsc::UnboundedSender<ServerEvent>,
}

impl<C, S> CountryManager<C, S>
where
    C: GeonamesClient,
    S: DocumentStore,
{
    /// Build the status table from the catalog and start the manager task.
    ///
    /// Every entry starts `stopped`. The default presentation order is
    /// continent descending, then country name.
    pub fn spawn(
        catalog: Vec<Country>,
        settings: Arc<Settings>,
        client: Arc<C>,
        store: Arc<S>,
    ) -> (ManagerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut table = HashMap::with_capacity(catalog.len());
        let mut order = Vec::with_capacity(catalog.len());
        for country in &catalog {
            if table.contains_key(&country.code) {
                warn!(code = %country.code, "duplicate catalog entry ignored");
                continue;
            }
            order.push(country.code.clone());
            table.insert(country.code.clone(), CountryStatus::initial(country));
        }

        let table_ref = &table;
        order.sort_by(|a, b| match (table_ref.get(a), table_ref.get(b)) {
            (Some(a), Some(b)) => b
                .continent
                .cmp(&a.continent)
                .then_with(|| a.country_name.cmp(&b.country_name)),
            _ => std::cmp::Ordering::Equal,
        });

        let manager = Self {
            table,
            order,
            trace: false,
            pending_shutdown: false,
            reaped: HashSet::new(),
            settings,
            client,
            store,
            commands: command_rx,
            events: events_rx,
            events_tx,
        };

        let join = tokio::spawn(manager.run());
        (ManagerHandle::new(command_tx), join)
    }

    /// Main loop: commands first, fleet events second, until told to quit.
    async fn run(mut self) {
        info!(countries = self.table.len(), "country manager starting");

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("all manager handles dropped");
                        break;
                    }
                },

                Some(event) = self.events.recv() => self.handle_event(event),
            }

            if self.pending_shutdown && self.live_count() == 0 {
                break;
            }
        }

        self.drain();
        info!("country manager stopped");
    }

    /// Apply queued fleet events before exiting so the final state is
    /// consistent and every supervisor notification is accounted for.
    fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    fn live_count(&self) -> usize {
        self.table.values().filter(|s| s.handle.is_some()).count()
    }

    fn log_command(&self, name: &str) {
        if self.trace {
            info!(command = name, "manager command");
        } else {
            debug!(command = name, "manager command");
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Status { reply } => {
                self.log_command("status");
                let _ = reply.send(StatusSnapshot {
                    trace: self.trace,
                    servers: self.ordered_views(),
                });
            }
            ManagerCommand::StatusStarted { reply } => {
                self.log_command("status_started");
                let _ = reply.send(self.started_views());
            }
            ManagerCommand::Start { code, reply } => {
                self.log_command("start");
                let _ = reply.send(self.start_country(&code));
            }
            ManagerCommand::StartAll { reply } => {
                self.log_command("start_all");
                for code in self.order.clone() {
                    // Non-stopped entries report already_started; that is not
                    // an error for the bulk form.
                    let _ = self.start_country(&code);
                }
                let _ = reply.send(self.ordered_views());
            }
            ManagerCommand::Shutdown { code, reply } => {
                self.log_command("shutdown");
                let _ = reply.send(self.shutdown_country(&code));
            }
            ManagerCommand::ShutdownAll { reply } => {
                self.log_command("shutdown_all");
                self.shutdown_fleet();
                self.pending_shutdown = false;
                let _ = reply.send(self.ordered_views());
            }
            ManagerCommand::Terminate { reply } => {
                self.log_command("terminate");
                info!("terminate requested, shutting the fleet down");
                self.shutdown_fleet();
                self.pending_shutdown = true;
                let _ = reply.send(());
            }
            ManagerCommand::Reset { code, reply } => {
                self.log_command("reset");
                let _ = reply.send(self.reset_country(&code));
            }
            ManagerCommand::ResetAll { reply } => {
                self.log_command("reset_all");
                let crashed: Vec<String> = self
                    .table
                    .values()
                    .filter(|s| s.status == ServerStatus::Crashed)
                    .map(|s| s.country_code.clone())
                    .collect();
                for code in crashed {
                    let _ = self.reset_country(&code);
                }
                let _ = reply.send(self.ordered_views());
            }
            ManagerCommand::SetTrace { enabled, reply } => {
                self.trace = enabled;
                info!(trace = enabled, "manager trace toggled");
                let _ = reply.send(enabled);
            }
            ManagerCommand::SetCountryTrace {
                code,
                enabled,
                reply,
            } => {
                self.log_command("trace");
                let _ = reply.send(self.set_country_trace(&code, enabled));
            }
            ManagerCommand::Sort {
                direction,
                column,
                reply,
            } => {
                self.log_command("sort");
                self.sort_view(direction, column);
                let _ = reply.send(self.ordered_views());
            }
            ManagerCommand::LoadedIndexes { reply } => {
                self.log_command("loaded_indexes");
                let indexes: Vec<Arc<CountryIndex>> = self
                    .order
                    .iter()
                    .filter_map(|code| self.table.get(code))
                    .filter_map(|s| s.index.clone())
                    .collect();
                let _ = reply.send(indexes);
            }
        }
    }

    fn start_country(&mut self, code: &str) -> CountryReply {
        let Some(status) = self.table.get_mut(code) else {
            return Err(CommandError::CountryServerNotFound);
        };
        if status.status != ServerStatus::Stopped {
            return Err(CommandError::AlreadyStarted);
        }

        let handle = server::spawn(
            code,
            Arc::clone(&self.settings),
            Arc::clone(&self.client),
            self.events_tx.clone(),
        );
        info!(server = %status.server_name, id = %handle.id(), "starting country data server");

        status.status = ServerStatus::Starting;
        status.substatus = None;
        status.progress = 0;
        status.handle = Some(handle);
        Ok(status.view())
    }

    /// Shutdown is optimistic: the record is stopped immediately and the
    /// worker's eventual exit event is dropped via the reap set.
    fn shutdown_country(&mut self, code: &str) -> CountryReply {
        let Some(status) = self.table.get_mut(code) else {
            return Err(CommandError::CountryServerNotFound);
        };
        if let Some(handle) = status.handle.take() {
            info!(server = %status.server_name, "shutting country data server down");
            handle.shutdown();
            self.reaped.insert(handle.id());
            status.apply_stop(None);
        }
        Ok(status.view())
    }

    fn shutdown_fleet(&mut self) {
        for status in self.table.values_mut() {
            if let Some(handle) = status.handle.take() {
                debug!(server = %status.server_name, "shutting country data server down");
                handle.shutdown();
                self.reaped.insert(handle.id());
                status.apply_stop(None);
            }
        }
    }

    /// Reset is unconditional once the record is crashed: any lingering
    /// handle is killed outright and the record rebuilt from catalog data.
    fn reset_country(&mut self, code: &str) -> CountryReply {
        let Some(status) = self.table.get_mut(code) else {
            return Err(CommandError::CountryServerNotFound);
        };
        if status.status != ServerStatus::Crashed {
            return Err(CommandError::ServerNotCrashed);
        }

        if let Some(handle) = status.handle.take() {
            warn!(server = %status.server_name, "killing lingering handle during reset");
            handle.kill();
            self.reaped.insert(handle.id());
        }

        info!(server = %status.server_name, "resetting crashed country server");
        let country = Country::new(&status.country_code, &status.country_name, &status.continent);
        *status = CountryStatus::initial(&country);
        Ok(status.view())
    }

    fn set_country_trace(&mut self, code: &str, enabled: bool) -> CountryReply {
        let Some(status) = self.table.get_mut(code) else {
            return Err(CommandError::NoSuchCountryServer);
        };
        match &status.handle {
            Some(handle) => handle.send_trace(enabled),
            None => return Err(CommandError::NoSuchCountryServer),
        }
        if status.trace != enabled {
            status.trace = enabled;
        }
        Ok(status.view())
    }

    fn sort_view(&mut self, direction: SortDirection, column: SortColumn) {
        let table = &self.table;
        self.order.sort_by(|a, b| match (table.get(a), table.get(b)) {
            (Some(a), Some(b)) => compare_directed(column, direction, a, b),
            _ => std::cmp::Ordering::Equal,
        });
    }

    fn ordered_views(&self) -> Vec<CountryStatusView> {
        self.order
            .iter()
            .filter_map(|code| self.table.get(code))
            .map(CountryStatus::view)
            .collect()
    }

    fn started_views(&self) -> Vec<CountryStatusView> {
        self.order
            .iter()
            .filter_map(|code| self.table.get(code))
            .filter(|s| s.status == ServerStatus::Started)
            .map(CountryStatus::view)
            .collect()
    }

    // =========================================================================
    // Fleet events
    // =========================================================================

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Progress(progress) => self.handle_progress(progress),
            ServerEvent::Exited { id, exit } => self.handle_exit(id, exit),
        }
    }

    fn handle_progress(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::CheckingForUpdate { code } => {
                if let Some(status) = self.table.get_mut(&code) {
                    status.substatus = Some(Substatus::CheckingForUpdate);
                }
            }
            ProgressEvent::Downloading { code } => {
                if let Some(status) = self.table.get_mut(&code) {
                    status.substatus = Some(Substatus::CountryFileDownload);
                }
            }
            ProgressEvent::Init { id, at } => {
                if let Some(status) = self.status_by_id_mut(id) {
                    status.progress = 0;
                    status.started_at = Some(at);
                    status.substatus = Some(Substatus::Init);
                }
            }
            ProgressEvent::Delta {
                id,
                substatus,
                delta,
            } => {
                if let Some(status) = self.status_by_id_mut(id) {
                    status.progress = status.progress.saturating_add(delta).min(100);
                    status.substatus = Some(substatus);
                }
            }
            ProgressEvent::Child {
                id,
                substatus,
                child,
            } => {
                if let Some(status) = self.status_by_id_mut(id) {
                    status.children.push(child);
                    status.substatus = Some(substatus);
                }
            }
            ProgressEvent::PhaseComplete { id, substatus } => {
                if let Some(status) = self.status_by_id_mut(id) {
                    status.progress = 100;
                    status.substatus = Some(substatus);
                }
            }
            ProgressEvent::Running { id, index, at } => self.apply_started(id, index, at),
        }
    }

    fn apply_started(&mut self, id: ServerId, index: Arc<CountryIndex>, at: DateTime<Utc>) {
        if self.reaped.contains(&id) {
            // The country was shut down while its completion was in flight.
            debug!(id = %id, "dropping completion from reaped server");
            return;
        }
        let Some(status) = self.status_by_id_mut(id) else {
            error!(id = %id, "started notification from unknown country server");
            return;
        };

        status.status = ServerStatus::Started;
        status.substatus = Some(Substatus::Running);
        status.progress = 100;
        status.city_count = Some(index.len());
        status.startup_time = status
            .started_at
            .and_then(|started| (at - started).to_std().ok());
        status.mem_usage = Some(index.mem_usage());
        status.index = Some(index);

        info!(
            server = %status.server_name,
            cities = status.city_count,
            startup_ms = status.startup_time.map(|d| d.as_millis() as u64),
            "country started"
        );

        let code = status.country_code.clone();
        let doc = serde_json::json!({
            "country_code": code,
            "city_count": status.city_count,
            "startup_time_ms": status.startup_time.map(|d| d.as_millis() as u64),
            "completed_at": at.to_rfc3339(),
        });
        if let Err(e) = self.store.put_document(&code, &doc) {
            warn!(code = %code, error = %e, "could not record startup document");
        }
    }

    fn handle_exit(&mut self, id: ServerId, exit: ServerExit) {
        if self.reaped.remove(&id) {
            debug!(id = %id, "dropping exit event from reaped server");
            return;
        }

        match exit {
            ServerExit::Stopped { name } => self.apply_stop_by_name(&name, None),
            ServerExit::NoCities { name } => {
                self.apply_stop_by_name(&name, Some(Substatus::NoCities))
            }
            exit => {
                let substatus = match &exit {
                    ServerExit::CountryFileError { .. } => Substatus::CountryFileError,
                    ServerExit::FcpCountryFileError { .. } => Substatus::FcpCountryFileError,
                    ServerExit::CountryZipFileError { .. } => Substatus::CountryZipFileError,
                    ServerExit::RetryLimitExceeded { .. } => Substatus::RetryLimitExceeded,
                    ServerExit::Error(reason) => Substatus::Other(reason.clone()),
                    ServerExit::Stopped { .. } | ServerExit::NoCities { .. } => {
                        Substatus::Other(exit.to_string())
                    }
                };
                match self.status_by_id_mut(id) {
                    Some(status) => {
                        warn!(
                            server = %status.server_name,
                            reason = %exit,
                            "country data server crashed"
                        );
                        status.apply_crash(substatus);
                    }
                    None => {
                        error!(id = %id, reason = %exit, "crash from unknown country server");
                    }
                }
            }
        }
    }

    fn apply_stop_by_name(&mut self, name: &str, substatus: Option<Substatus>) {
        match self.table.values_mut().find(|s| s.server_name == name) {
            Some(status) => {
                debug!(server = %name, "country data server stopped");
                status.apply_stop(substatus);
            }
            None => {
                error!(server = %name, "stop notification for unknown country server");
            }
        }
    }

    fn status_by_id_mut(&mut self, id: ServerId) -> Option<&mut CountryStatus> {
        self.table
            .values_mut()
            .find(|s| s.handle.as_ref().map(ServerHandle::id) == Some(id))
    }
}

//! Country manager.
//!
//! The singleton coordinator owning the fleet of country data servers. See
//! [`daemon::CountryManager`] for the main loop, [`command::ManagerHandle`]
//! for the client side, and [`status::CountryStatus`] for the per-country
//! record.

mod command;
mod daemon;
mod sort;
mod status;

pub use command::{
    CommandError, CountryReply, ManagerCommand, ManagerHandle, ManagerUnavailable, StatusSnapshot,
};
pub use daemon::CountryManager;
pub use sort::{SortColumn, SortDirection};
pub use status::{CountryStatus, CountryStatusView, ServerStatus};

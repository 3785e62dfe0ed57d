// External collaborator seams
//
// The orchestrator touches the network and the FL backend only through
// these traits. Mock implementations live alongside and are the defaults
// for tests and standalone runs.

pub mod flserver;
pub mod network;

pub use flserver::{FlServer, FlServerError, MockFlServer};
pub use network::{MockNetworkSimulator, NetworkError, NetworkSimulator};

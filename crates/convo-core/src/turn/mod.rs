pub mod coordinator;

pub use coordinator::{TurnCoordinator, TurnStream, TurnStreamEvent};

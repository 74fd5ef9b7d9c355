pub mod cleanup;
pub mod poll;
pub mod state_machine;
pub mod supervisor;

pub use poll::{poll_until, DeadlineExceeded};
pub use state_machine::{HelperState, HelperStateMachine, LifecycleEvent};
pub use supervisor::LifecycleSupervisor;

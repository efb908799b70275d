mod clock;
mod faults;
mod mock;

pub use clock::VirtualClock;
pub use faults::{FaultPlan, FaultySocket, process_with_faults};
pub use mock::{MockHandle, MockSocket};

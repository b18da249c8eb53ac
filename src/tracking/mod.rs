pub mod state;
pub mod store;

pub use state::{TrackingState, TrackingStatus, TrialWindow};
pub use store::TrialSampleStore;

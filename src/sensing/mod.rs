pub mod clock;
pub mod controller;
pub mod frontend;
pub mod loop_worker;
pub mod simulated;
pub mod snapshot;
pub mod source;

pub use clock::StudyClock;
pub use controller::SamplerController;
pub use frontend::{fuse_gaze, AcquisitionFrontend};
pub use simulated::{SceneSphere, SensorCall, SimulatedSensor, StaticScene};
pub use snapshot::SnapshotCell;
pub use source::{
    PerEye, RawEyeGaze, RawEyelid, RawPupil, RayCaster, SensorError, SensorSource,
};

// geoalarm-core: Proximity-gated alarm lifecycle between the platform
// capabilities and the consumers (CLI, apps).

pub mod capability;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod geo;
pub mod model;
pub mod scheduler;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use capability::{
    AlertSink, Callback, Capabilities, Clock, JsonFileStore, NotificationChannel, PermissionState,
    PersistentStore, PositionSource, Subscribers, SystemClock,
};
pub use command::{Command, CommandResult};
pub use config::ControllerConfig;
pub use controller::{Controller, Permissions};
pub use error::{Capability, CapabilityError, CoreError};
pub use geo::{GeoEvaluator, ProximityState, ProximityVerdict};
pub use scheduler::{NotificationScheduler, ScheduleReport};
pub use store::AlarmRepository;
pub use stream::AlarmStream;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Alarm, AlarmDraft, AlarmId, AlarmState, Coordinate, LifecycleEvent, PendingWake, TimeOfDay,
    WakePayload, WakeRegistration,
};

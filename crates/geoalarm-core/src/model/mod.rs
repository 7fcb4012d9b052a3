// ── Domain model ──
//
// Canonical alarm types shared by the repository, the scheduler and the
// lifecycle controller. Consumers only ever receive clones or `Arc`
// snapshots of these.

pub mod alarm;
pub mod state;
pub mod wake;

pub use alarm::{Alarm, AlarmDraft, AlarmId, Coordinate, TimeOfDay};
pub use state::{AlarmState, LifecycleEvent};
pub use wake::{PendingWake, WakePayload, WakeRegistration};

// ── Reactive alarm store ──
//
// Concurrent alarm storage with push-based change notification.

mod collection;
mod repository;

pub use repository::AlarmRepository;

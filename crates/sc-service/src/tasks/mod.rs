//! Background tasks.

pub mod attendance;

pub use attendance::{AttendanceDispatcher, AttendanceDispatcherConfig};

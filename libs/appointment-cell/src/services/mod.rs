pub mod booking;
pub mod lifecycle;
pub mod notifications;
pub mod reminder;
pub mod store;

pub use booking::AppointmentBookingService;
pub use lifecycle::{AppointmentLifecycleService, TransitionActor};
pub use reminder::{ReminderScanner, ReminderScheduler};
pub use store::{AppointmentStore, InMemoryAppointmentStore, SupabaseAppointmentStore};

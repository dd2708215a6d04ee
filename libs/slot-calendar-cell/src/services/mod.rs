pub mod adjustment;
pub mod builder;
pub mod cache;
pub mod conflict;
pub mod gateway;
pub mod memory;
pub mod projector;
pub mod scheduler;
pub mod selection;
pub mod wire;

pub use adjustment::AdjustmentLedger;
pub use builder::SlotDefinitionBuilder;
pub use cache::{MonthProjection, ProjectionCache, ProjectionKey};
pub use conflict::ConflictChecker;
pub use gateway::{CalendarGateway, HttpCalendarGateway};
pub use memory::InMemoryCalendarGateway;
pub use projector::{AvailabilityProjector, DayPlan};
pub use scheduler::SlotSchedulingService;
pub use selection::{CalendarSnapshot, CalendarView, Selection, SelectionTicket, SelectionTracker};

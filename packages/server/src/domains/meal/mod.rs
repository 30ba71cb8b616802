//! Meal-request domain: lifecycle engine, models, and the summary listing.

pub mod engine;
pub mod listing;
pub mod models;

pub use engine::{CreatedRequest, MealRequestEngine};
pub use listing::{list_summaries, MealRequestSummary, RequestFilters};
pub use models::line::{MealRequestLine, NewLine};
pub use models::line_attendance::MealRequestLineAttendance;
pub use models::request::MealRequest;
pub use models::status::{seed_statuses, MealRequestStatus, MealType, RequestStatus};

// Business domains. Each domain owns its models and services; shared
// infrastructure lives in kernel/ and common/.

pub mod attendance;
pub mod audit;
pub mod auth;
pub mod hris;
pub mod identity;
pub mod meal;

pub mod consumption;
pub mod enums;
pub mod filters;
pub mod medication;
pub mod patient;
pub mod schedule;
pub mod user;

pub use consumption::*;
pub use filters::*;
pub use medication::*;
pub use patient::*;
pub use schedule::*;
pub use user::*;

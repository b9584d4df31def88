// Public API - what other modules can use
pub use broadcast::Broadcaster;
pub use registry::{DepartedMember, JoinOutcome, MemberInfo, RoomRegistry};

// Internal modules
mod broadcast;
mod registry;

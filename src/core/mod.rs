// Decision engine exports
pub mod age;
pub mod clock;
pub mod distance;
pub mod eligibility;
pub mod error;
pub mod events;
pub mod filters;
pub mod gate;
pub mod photos;
pub mod resolver;
pub mod safety;

pub use clock::{Clock, ManualClock, SystemClock};
pub use distance::{calculate_bounding_box, haversine_distance, is_within_bounding_box};
pub use eligibility::{Candidate, DiscoveryPolicy, DiscoveryResult, EligibilityFilter};
pub use error::{CoreError, CoreResult};
pub use events::PairEvent;
pub use gate::{FirstMoverPolicy, GatePolicy, MatchState, MessagingGate};
pub use photos::PhotoService;
pub use resolver::{DecisionResult, MatchResolver};
pub use safety::{BlockResult, ReportResult, SafetyPolicy, SafetyService};

// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    Block, BoundingBox, CandidateQuery, Coordinates, Decision, DecisionKind, Entitlement, Gender,
    Match, Message, PairKey, Photo, Preferences, Report, ReportReason, User, MAX_AGE, MIN_AGE,
};
pub use requests::{
    AddPhotoRequest, BlockRequest, CreateProfileRequest, DecisionRequest, DiscoverQuery, LocationRequest, MessagesQuery, NearbyQuery,
    PreferencesRequest, ReportRequest, SendMessageRequest,
};
pub use responses::{
    BlocksResponse, CandidateView, DecisionResponse, DiscoverResponse, ErrorResponse,
    HealthResponse, MatchStateResponse, MatchSummary, MatchesResponse, MessagesResponse,
    PhotosResponse, UnreadResponse,
};

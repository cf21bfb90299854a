pub mod model;
pub mod ordered_map;
pub mod store;

// Re-export commonly used types
pub use model::{
    AUTHMATRIX_MARKER, Auth, Endpoint, Expectation, GUEST_ROLE, Role, SpecModel, StatusRule,
    normalize_path,
};
pub use ordered_map::OrderedMap;
pub use store::{EndpointRow, SpecEvent, SpecStore};

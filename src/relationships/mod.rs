//! Relationship navigation

pub mod errors;
pub mod related_instance_finder;

pub use errors::RelationshipError;
pub use related_instance_finder::{
    DirectionFilter, InstanceKey, RelatedDirection, RelatedInstance, RelatedInstanceFinder, RelatedQuery,
};

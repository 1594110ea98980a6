mod ad;
mod entity;
mod relation;

pub use ad::{Ad, CountryRestriction, Priority};
pub use entity::{
    ConnectionRequest, CreateEntityRequest, Entity, EntityKind, EntityWithMeta, MetaKey,
    ModelError,
};
pub use relation::Relation;

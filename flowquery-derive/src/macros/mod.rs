mod entity;

pub use entity::derive_entity;

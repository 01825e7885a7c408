//! `SeaORM` entities.

pub mod location_types;
pub mod locations;

pub mod prelude {
    //! Entity aliases.

    pub use super::location_types::Entity as LocationTypes;
    pub use super::locations::Entity as Locations;
}

//! Personalized path enrollment and consumption

pub mod engine;
pub mod entity;
pub(crate) mod repository;

pub use engine::EnrollmentEngine;
pub use entity::{
    ConsumptionUpdate, EnrollmentRequest, PathOrigin, PathPreview, PathStatus, PersonalizedPath,
    UnitInstance, UnitStatus,
};

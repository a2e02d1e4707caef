mod cohort;
mod engine;
mod engine_api;
mod role;

pub use cohort::Cohort;
pub use cohort::InvalidCohort;
pub use cohort::MemberId;
pub use engine_api::ClientCallError;

pub(crate) use engine::ConsensusEngine;
pub(crate) use engine_api::Effect;
pub(crate) use engine_api::EventResult;

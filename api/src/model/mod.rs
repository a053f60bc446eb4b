mod case_id;
pub mod dates;
mod day0_case;

pub use case_id::{CaseId, CaseIdError};
pub use day0_case::{
    AgeRange, CaseReference, CaseStatus, Curator, Curators, Day0Case, Demographics, EditMetadata,
    Events, Gender, Geometry, Location, Outcome, RevisionMetadata, YesNo,
};

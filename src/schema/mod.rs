//! Field contracts and record validation.

pub mod fields;
pub mod validator;

pub use fields::*;
pub use validator::*;

use crate::domain::RawRecord;

impl Schema {
    pub fn validate(&self, record: &RawRecord) -> Result<ValidatedRecord, ValidationReport> {
        validator::validate(self, record)
    }
}

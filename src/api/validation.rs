use thiserror::Error;

use super::models::RepairSubmission;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmissionValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("source_path and parity_path must differ")]
    SamePaths,
}

pub fn validate_submission(submission: &RepairSubmission) -> Result<(), SubmissionValidationError> {
    for (field, value) in [
        ("codec_id", &submission.codec_id),
        ("source_path", &submission.source_path),
        ("parity_path", &submission.parity_path),
    ] {
        if value.trim().is_empty() {
            return Err(SubmissionValidationError::EmptyField(field));
        }
    }

    if submission.source_path == submission.parity_path {
        return Err(SubmissionValidationError::SamePaths);
    }

    Ok(())
}

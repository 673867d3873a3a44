use crate::error::SubmissionError;
use crate::submission::VideoFile;

/// Reject a file that is not declared as video media
pub fn validate_media_type(file: &VideoFile) -> Result<(), SubmissionError> {
    let media_type = file.media_type.trim().to_ascii_lowercase();
    if !media_type.starts_with("video/") {
        return Err(SubmissionError::Validation(format!(
            "Invalid file type '{}': please upload a video file (MP4, AVI, MOV)",
            file.media_type
        )));
    }
    Ok(())
}

/// Validate declared file size is non-zero and within `max_size` (inclusive)
pub fn validate_file_size(file: &VideoFile, max_size: u64) -> Result<u64, SubmissionError> {
    if file.size == 0 {
        return Err(SubmissionError::Validation(format!(
            "File is empty: {}",
            file.file_name
        )));
    }

    if file.size > max_size {
        return Err(SubmissionError::Validation(format!(
            "File size ({} bytes) exceeds maximum allowed size ({} bytes): {}",
            file.size, max_size, file.file_name
        )));
    }

    Ok(file.size)
}

/// Pre-flight checks run before any network call
pub fn validate_video_file(file: &VideoFile, max_size: u64) -> Result<(), SubmissionError> {
    validate_media_type(file)?;
    validate_file_size(file, max_size)?;
    Ok(())
}

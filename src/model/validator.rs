use validator::ValidationError;

/// Longest tag name the tag namespace accepts.
pub const MAX_TAG_LENGTH: usize = 100;

/// Validate that every tag name is non-blank and at most `MAX_TAG_LENGTH` characters
pub fn validate_tag_names(tags: &[String]) -> Result<(), ValidationError> {
    for tag in tags {
        let len = tag.trim().chars().count();
        if len == 0 || len > MAX_TAG_LENGTH {
            let mut error = ValidationError::new("invalid_tag");
            error.message = Some(
                format!("tag names must be between 1 and {} characters", MAX_TAG_LENGTH).into(),
            );
            return Err(error);
        }
    }
    Ok(())
}

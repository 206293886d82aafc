use email_address::EmailAddress;
use tracing::warn;

use super::app_error::AppError;
use crate::structs::status::REPORT_REASONS;

pub const MAX_TITLE_LENGTH: usize = 255;
pub const MAX_POST_CONTENT_BYTES: usize = 65_535;
pub const MAX_COMMENT_BYTES: usize = 4096;

pub fn check_username(username: &str) -> Result<(), AppError> {
    if username.len() < 3 || username.len() > 20 {
        warn!("Wrong username size : {username}");
        return Err(AppError::validation(
            "username must contain between 3 and 20 characters",
        ));
    }

    for (i, c) in username.char_indices() {
        if i == 0 {
            if !c.is_alphabetic() {
                warn!("Username has to begin with a letter : {username}");
                return Err(AppError::validation("username must begin with a letter"));
            }
            continue;
        }
        if !c.is_alphanumeric() && c != '_' {
            warn!("Username has to contain only letters, digits and underscores : {username}");
            return Err(AppError::validation(
                "username may only contain letters, digits and underscores",
            ));
        }
    }

    Ok(())
}

pub fn check_email_address(email: &str) -> Result<(), AppError> {
    if !EmailAddress::is_valid(email) {
        warn!("Invalid email `{email}`");
        return Err(AppError::validation("email address is not valid"));
    }
    Ok(())
}

pub fn check_password(password: &str) -> Result<(), AppError> {
    if password.len() < 6 {
        return Err(AppError::validation(
            "password must contain at least 6 characters",
        ));
    }
    Ok(())
}

pub fn check_new_post_data(author_id: i64, title: &str, content: &str) -> Result<(), AppError> {
    if title.is_empty() || title.len() > MAX_TITLE_LENGTH {
        warn!(
            "User {author_id} tried to create a post with a title of {} bytes",
            title.len()
        );
        return Err(AppError::validation(format!(
            "post title must contain between 1 and {MAX_TITLE_LENGTH} characters"
        )));
    }

    if content.is_empty() || content.len() > MAX_POST_CONTENT_BYTES {
        warn!(
            "User {author_id} tried to create a post with a content of {} bytes",
            content.len()
        );
        return Err(AppError::validation(format!(
            "post content must contain between 1 and {MAX_POST_CONTENT_BYTES} bytes"
        )));
    }

    Ok(())
}

pub fn check_comment_content(content: &str) -> Result<(), AppError> {
    if content.is_empty() || content.len() > MAX_COMMENT_BYTES {
        return Err(AppError::validation(format!(
            "comment must contain between 1 and {MAX_COMMENT_BYTES} bytes"
        )));
    }
    Ok(())
}

pub fn check_report_reason(reason: &str) -> Result<(), AppError> {
    if !REPORT_REASONS.contains(&reason) {
        return Err(AppError::validation("unknown report reason"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(check_username("li_ming").is_ok());
        assert!(check_username("ab").is_err());
        assert!(check_username("1leading_digit").is_err());
        assert!(check_username("has space").is_err());
        assert!(check_username("way_too_long_username_x").is_err());
    }

    #[test]
    fn email_rules() {
        assert!(check_email_address("user@example.com").is_ok());
        assert!(check_email_address("not-an-email").is_err());
    }

    #[test]
    fn post_data_rules() {
        assert!(check_new_post_data(1, "hello", "some content").is_ok());
        assert!(check_new_post_data(1, "", "some content").is_err());
        assert!(check_new_post_data(1, "hello", "").is_err());
        assert!(check_new_post_data(1, &"t".repeat(256), "content").is_err());
    }

    #[test]
    fn report_reasons() {
        assert!(check_report_reason("spam").is_ok());
        assert!(check_report_reason("because").is_err());
    }
}

//! Credential validation

use crate::error::{ServiceError, ServiceResult};

/// Minimum accepted login length.
const MIN_LOGIN_LEN: usize = 3;

/// Validate a registration login. Logins are case-sensitive and must be
/// at least three characters long.
pub fn validate_login(login: &str) -> ServiceResult<()> {
    if login.is_empty() {
        return Err(ServiceError::Validation("login is required".to_string()));
    }

    if login.chars().count() < MIN_LOGIN_LEN {
        return Err(ServiceError::Validation("login too short".to_string()));
    }

    Ok(())
}

/// Validate a registration password.
pub fn validate_password(password: &str) -> ServiceResult<()> {
    if password.is_empty() {
        return Err(ServiceError::Validation("password is required".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_length() {
        assert!(validate_login("abc").is_ok());
        assert!(validate_login("user-1").is_ok());
        assert!(validate_login("ab").is_err());
        assert!(validate_login("").is_err());
    }

    #[test]
    fn test_password_required() {
        assert!(validate_password("p").is_ok());
        assert!(validate_password("").is_err());
    }
}

use crate::error::Error;

/// Validates configuration values before anything is started
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), Error> {
        if url.is_empty() {
            return Err(Error::Validation("Redis URL cannot be empty".to_string()));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(Error::Validation(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates the sorted-set key used for the queue
    pub fn validate_queue_key(key: &str) -> Result<(), Error> {
        if key.trim().is_empty() {
            return Err(Error::Validation("Queue key cannot be empty".to_string()));
        }

        if key.chars().any(char::is_whitespace) {
            return Err(Error::Validation(
                "Queue key cannot contain whitespace".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_positive(name: &str, value: u64) -> Result<(), Error> {
        if value == 0 {
            return Err(Error::Validation(format!("{} must be greater than 0", name)));
        }
        Ok(())
    }

    /// Validates a client identifier taken from a request path
    pub fn validate_client_id(client_id: &str) -> Result<(), Error> {
        if client_id.trim().is_empty() {
            return Err(Error::Validation("Client ID cannot be empty".to_string()));
        }

        if client_id.len() > 128 {
            return Err(Error::Validation(
                "Client ID cannot be longer than 128 characters".to_string(),
            ));
        }

        if !client_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::Validation(
                "Client ID can only contain alphanumeric characters, hyphens, and underscores"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("redis://localhost:6379").is_ok());
        assert!(ConfigValidator::validate_redis_url("rediss://localhost:6379").is_ok());
    }

    #[test]
    fn test_invalid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("").is_err());
        assert!(ConfigValidator::validate_redis_url("http://localhost:6379").is_err());
    }

    #[test]
    fn test_queue_key() {
        assert!(ConfigValidator::validate_queue_key("domain").is_ok());
        assert!(ConfigValidator::validate_queue_key("  ").is_err());
        assert!(ConfigValidator::validate_queue_key("two words").is_err());
    }

    #[test]
    fn test_positive_values() {
        assert!(ConfigValidator::validate_positive("poll interval", 5000).is_ok());
        assert!(ConfigValidator::validate_positive("poll interval", 0).is_err());
    }

    #[test]
    fn test_client_id() {
        assert!(ConfigValidator::validate_client_id("3f2b8c1e-9d4a-4f6e-8a7b-1c2d3e4f5a6b").is_ok());
        assert!(ConfigValidator::validate_client_id("").is_err());
        assert!(ConfigValidator::validate_client_id("../etc").is_err());
        assert!(ConfigValidator::validate_client_id(&"a".repeat(129)).is_err());
    }
}

/// Validate that an Azure endpoint, when present, is an http(s) URL
///
/// # Arguments
/// * `name` - Field name used in error messages
/// * `endpoint` - The endpoint value to validate
pub fn validate_endpoint(
    name: &str,
    endpoint: &Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(url) = endpoint
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        return Err(format!("{name} must be an http(s) URL, got '{url}'").into());
    }
    Ok(())
}

/// Validate that an authentication method is configured when auth is required
pub fn validate_auth_required(
    auth_required: bool,
    api_secret: &Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if auth_required && api_secret.is_none() {
        return Err(
            "AUTH_REQUIRED is enabled but AUTH_API_SECRET is not configured".into(),
        );
    }
    Ok(())
}

/// Validate that the instance limit is usable
pub fn validate_max_instances(max_instances: usize) -> Result<(), Box<dyn std::error::Error>> {
    if max_instances == 0 {
        return Err("max_instances must be at least 1".into());
    }
    Ok(())
}

//! Endpoint URL handling.
//!
//! The API URL may be configured either as the full chat completions
//! endpoint or as a base URL such as `https://host/v1`.

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

/// Remove trailing slashes so endpoints can be appended safely.
///
/// ```
/// use perplexity_cli::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1///"), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash.
///
/// ```
/// use perplexity_cli::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Turn a configured URL into the chat completions endpoint. Returns `None`
/// for anything that is not an absolute http(s) URL.
pub fn normalize_endpoint(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let lower = trimmed.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))?;
    if rest.trim_matches('/').is_empty() {
        return None;
    }

    let base = normalize_base_url(trimmed);
    if base.ends_with(CHAT_COMPLETIONS_PATH) {
        Some(base)
    } else {
        Some(construct_api_url(&base, CHAT_COMPLETIONS_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://api.example.com/v1"),
            "https://api.example.com/v1"
        );
        assert_eq!(
            normalize_base_url("https://api.example.com/v1/"),
            "https://api.example.com/v1"
        );
        assert_eq!(
            normalize_base_url("https://api.example.com/"),
            "https://api.example.com"
        );
        assert_eq!(normalize_base_url(""), "");
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn test_construct_api_url() {
        assert_eq!(
            construct_api_url("https://api.example.com/v1", "chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            construct_api_url("https://api.example.com/v1///", "///chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn full_endpoints_are_kept() {
        assert_eq!(
            normalize_endpoint("https://api.perplexity.ai/chat/completions").as_deref(),
            Some("https://api.perplexity.ai/chat/completions")
        );
        assert_eq!(
            normalize_endpoint(" https://api.perplexity.ai/chat/completions/ ").as_deref(),
            Some("https://api.perplexity.ai/chat/completions")
        );
    }

    #[test]
    fn base_urls_get_the_endpoint_appended() {
        assert_eq!(
            normalize_endpoint("http://localhost:8080/v1/").as_deref(),
            Some("http://localhost:8080/v1/chat/completions")
        );
        assert_eq!(
            normalize_endpoint("https://api.perplexity.ai").as_deref(),
            Some("https://api.perplexity.ai/chat/completions")
        );
    }

    #[test]
    fn non_http_urls_are_rejected() {
        assert_eq!(normalize_endpoint(""), None);
        assert_eq!(normalize_endpoint("api.perplexity.ai"), None);
        assert_eq!(normalize_endpoint("ftp://example.com"), None);
        assert_eq!(normalize_endpoint("https://"), None);
    }
}

//! URL input validation.

use log::warn;

use crate::config::MAX_URL_LENGTH;

/// Validates one input URL.
///
/// Riot endpoints are always absolute, so unlike a browser address bar no
/// scheme is guessed: the URL must parse, use http or https, and have a host.
/// Logs a warning and returns `None` otherwise.
pub fn validate_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.len() > MAX_URL_LENGTH {
        warn!(
            "Skipping URL exceeding maximum length ({} > {}): {}...",
            url.len(),
            MAX_URL_LENGTH,
            url.chars().take(50).collect::<String>()
        );
        return None;
    }

    match url::Url::parse(url) {
        Ok(parsed) => match (parsed.scheme(), parsed.host_str()) {
            ("http" | "https", Some(_)) => Some(url.to_string()),
            (_, None) => {
                warn!("Skipping URL without host: {url}");
                None
            }
            _ => {
                warn!("Skipping unsupported scheme for URL: {url}");
                None
            }
        },
        Err(e) => {
            warn!("Skipping invalid URL ({e}): {url}");
            None
        }
    }
}

/// Whether an input line carries a URL (not blank, not a `#` comment).
pub fn is_url_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_riot_endpoint() {
        let url = "https://na1.api.riotgames.com/lol/league/v4/challengerleagues/by-queue/RANKED_SOLO_5x5";
        assert_eq!(validate_url(url), Some(url.to_string()));
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(
            validate_url("  http://127.0.0.1:8080/x \n"),
            Some("http://127.0.0.1:8080/x".to_string())
        );
    }

    #[test]
    fn test_rejects_relative_and_garbage() {
        assert_eq!(validate_url("na1.api.riotgames.com/lol"), None);
        assert_eq!(validate_url("not a url at all!!!"), None);
        assert_eq!(validate_url(""), None);
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        assert_eq!(validate_url("ftp://example.com/file"), None);
        assert_eq!(validate_url("file:///etc/passwd"), None);
    }

    #[test]
    fn test_rejects_overlong_url() {
        let url = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert_eq!(validate_url(&url), None);
    }

    #[test]
    fn test_is_url_line() {
        assert!(is_url_line("https://example.com"));
        assert!(!is_url_line("   "));
        assert!(!is_url_line("# comment"));
        assert!(!is_url_line("  # indented comment"));
    }
}

use reqwest::Url;

use crate::error::CoreError;

pub(super) fn resolve_auth(
    user: Option<&str>,
    pass: Option<&str>,
) -> Result<Option<(String, String)>, CoreError> {
    match (user, pass) {
        (Some(u), Some(p)) => Ok(Some((u.to_owned(), p.to_owned()))),
        (Some(_), None) | (None, Some(_)) => Err(CoreError::Config(
            "both endpoint user and endpoint pass must be set together".to_owned(),
        )),
        (None, None) => Ok(None),
    }
}

/// Validate an endpoint URL and strip any trailing slash so paths can be
/// appended directly.
pub(super) fn parse_connection(connection: &str) -> Result<String, CoreError> {
    let parsed = Url::parse(connection).map_err(|e| {
        CoreError::Config(format!(
            "invalid endpoint `{connection}`: expected HTTP(S) URL ({e})"
        ))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(connection.trim_end_matches('/').to_owned()),
        other => Err(CoreError::Config(format!(
            "unsupported endpoint scheme `{other}`; expected http or https"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_connection_strips_trailing_slash() {
        let parsed = parse_connection("https://blockstream.info/api/").expect("should parse");
        assert_eq!(parsed, "https://blockstream.info/api");
    }

    #[test]
    fn parse_connection_invalid_scheme() {
        let err = parse_connection("ws://example.com").expect_err("must reject ws");
        assert!(err.to_string().contains("unsupported endpoint scheme"));
    }

    #[test]
    fn parse_connection_garbage() {
        let err = parse_connection("not a url").expect_err("must reject");
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn resolve_auth_rejects_partial_credentials() {
        let err = resolve_auth(None, Some("secret")).expect_err("must reject partial auth");
        assert!(err.to_string().contains("must be set together"));
    }

    #[test]
    fn resolve_auth_accepts_user_and_pass() {
        let auth = resolve_auth(Some("alice"), Some("secret")).expect("auth must parse");
        assert_eq!(auth, Some(("alice".to_owned(), "secret".to_owned())));
        assert_eq!(resolve_auth(None, None).expect("no auth"), None);
    }
}

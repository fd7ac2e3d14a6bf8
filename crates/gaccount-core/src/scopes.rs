//! OAuth scope shorthands.
//!
//! Users name scopes with short tokens (`gmail`, `calendar.events`, ...)
//! that expand to Google's scope URLs. Unknown tokens pass through
//! unchanged so the authorization server can reject them itself.
//!
//! The identity scopes are always requested: the account email recorded in
//! the registry comes from the userinfo endpoint, which needs them.

/// Prefix shared by most Google API scopes.
const GOOGLE_SCOPE_PREFIX: &str = "https://www.googleapis.com/auth/";

/// Scope granting read access to the user's email address.
pub const USERINFO_EMAIL: &str = "https://www.googleapis.com/auth/userinfo.email";

/// Scope granting read access to the user's basic profile.
pub const USERINFO_PROFILE: &str = "https://www.googleapis.com/auth/userinfo.profile";

/// OpenID Connect scope.
pub const OPENID: &str = "openid";

/// Scopes appended to every authorization request.
pub const IDENTITY_SCOPES: &[&str] = &[USERINFO_EMAIL, OPENID];

/// Known shorthands and the scope suffix (or full scope) they expand to.
const SHORTHANDS: &[(&str, &str)] = &[
    ("gmail", "gmail.readonly"),
    ("gmail.readonly", "gmail.readonly"),
    ("gmail.modify", "gmail.modify"),
    ("gmail.send", "gmail.send"),
    ("gmail.compose", "gmail.compose"),
    ("gmail.labels", "gmail.labels"),
    ("gmail.settings", "gmail.settings.basic"),
    ("gmail.full", "https://mail.google.com/"),
    ("calendar", "calendar"),
    ("calendar.readonly", "calendar.readonly"),
    ("calendar.events", "calendar.events"),
    ("contacts", "contacts"),
    ("contacts.readonly", "contacts.readonly"),
    ("tasks", "tasks"),
    ("tasks.readonly", "tasks.readonly"),
    ("drive", "drive.readonly"),
    ("drive.readonly", "drive.readonly"),
    ("drive.file", "drive.file"),
    ("drive.full", "drive"),
    ("email", USERINFO_EMAIL),
    ("profile", USERINFO_PROFILE),
    ("openid", OPENID),
];

/// Expands a single scope token.
///
/// Known shorthands map to their full scope. Tokens that already look like
/// URLs and unknown tokens are returned unchanged.
pub fn expand(token: &str) -> String {
    let token = token.trim();
    if token.contains("://") {
        return token.to_string();
    }

    match SHORTHANDS.iter().find(|(short, _)| *short == token) {
        Some((_, target)) if target.contains("://") || *target == OPENID => target.to_string(),
        Some((_, suffix)) => format!("{GOOGLE_SCOPE_PREFIX}{suffix}"),
        None => token.to_string(),
    }
}

/// Expands and deduplicates a requested scope list, preserving order, and
/// appends the identity scopes when missing.
pub fn normalize<I, S>(requested: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut scopes: Vec<String> = Vec::new();
    for token in requested {
        let token = token.as_ref().trim();
        if token.is_empty() {
            continue;
        }
        let scope = expand(token);
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }

    for identity in IDENTITY_SCOPES {
        if !scopes.iter().any(|s| s == identity) {
            scopes.push((*identity).to_string());
        }
    }

    scopes
}

/// Splits a comma or whitespace separated scope list (as typed on the
/// command line).
pub fn parse_list(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns the scopes in `required` that are absent from `granted`.
pub fn missing<'a>(granted: &[String], required: &'a [String]) -> Vec<&'a str> {
    required
        .iter()
        .filter(|scope| !granted.contains(scope))
        .map(String::as_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_known_shorthands() {
        assert_eq!(
            expand("gmail"),
            "https://www.googleapis.com/auth/gmail.readonly"
        );
        assert_eq!(
            expand("calendar.events"),
            "https://www.googleapis.com/auth/calendar.events"
        );
        assert_eq!(expand("drive.full"), "https://www.googleapis.com/auth/drive");
        assert_eq!(expand("gmail.full"), "https://mail.google.com/");
        assert_eq!(expand("email"), USERINFO_EMAIL);
        assert_eq!(expand("profile"), USERINFO_PROFILE);
        assert_eq!(expand("openid"), "openid");
    }

    #[test]
    fn expand_passes_urls_through() {
        let url = "https://www.googleapis.com/auth/spreadsheets";
        assert_eq!(expand(url), url);
    }

    #[test]
    fn expand_passes_unknown_tokens_through() {
        assert_eq!(expand("not-a-scope"), "not-a-scope");
    }

    #[test]
    fn normalize_dedupes_and_appends_identity() {
        let scopes = normalize(["gmail", "gmail.readonly", "calendar"]);
        insta::assert_snapshot!(scopes.join("\n"), @r"
        https://www.googleapis.com/auth/gmail.readonly
        https://www.googleapis.com/auth/calendar
        https://www.googleapis.com/auth/userinfo.email
        openid
        ");
    }

    #[test]
    fn normalize_keeps_identity_scopes_once() {
        let scopes = normalize(["openid", "email"]);
        assert_eq!(scopes, vec![OPENID.to_string(), USERINFO_EMAIL.to_string()]);
    }

    #[test]
    fn normalize_empty_request_yields_identity() {
        let scopes = normalize(Vec::<String>::new());
        assert_eq!(scopes, vec![USERINFO_EMAIL.to_string(), OPENID.to_string()]);
    }

    #[test]
    fn parse_list_accepts_commas_and_spaces() {
        assert_eq!(
            parse_list("gmail, calendar  tasks"),
            vec!["gmail", "calendar", "tasks"]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn missing_scopes() {
        let granted = vec!["a".to_string(), "b".to_string()];
        let required = vec!["b".to_string(), "c".to_string()];
        assert_eq!(missing(&granted, &required), vec!["c"]);
    }
}

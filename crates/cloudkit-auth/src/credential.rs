//! The credential-string provider pattern: instead of redirecting to an
//! external authorization server, the loopback server itself collects a
//! username/password pair and the provider turns them into the opaque
//! `code` the normal `Exchanging` transition already knows how to
//! consume.
//!
//! A provider using this pattern points `authorize_library_url` at its
//! own loopback `/login` page instead of a remote site, and the page's
//! form resubmits to the redirect URI itself as `code=<synthesized>`,
//! reusing the existing `on_code` dispatch rather than adding a second
//! route.

const SEPARATOR: char = '\u{1}';

/// Combines a username and password into the opaque code a
/// credential-string provider's `exchange_code` expects.
#[must_use]
pub fn synthesize_code(user: &str, password: &str) -> String {
    format!("{user}{SEPARATOR}{}", hash_password(password))
}

/// Splits a previously synthesized code back into `(user, password_hash)`.
#[must_use]
pub fn split_code(code: &str) -> Option<(&str, &str)> {
    code.split_once(SEPARATOR)
}

/// A non-cryptographic stand-in for the provider's password hash. Good
/// enough to exercise the credential-string round trip without pulling in
/// a hashing crate the rest of the ambient stack has no other use for.
fn hash_password(password: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    password.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// The `/login` page a credential-string provider hands back from
/// `login_page`: a form that resubmits `user`/`password` to the redirect
/// URI as `code=<synthesized>`, landing on the same `on_code` dispatch an
/// OAuth2 redirect would.
#[must_use]
pub fn login_page_html(redirect_uri: &str, state: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Sign in</title></head>
<body>
<h1>Sign in</h1>
<form onsubmit="event.preventDefault(); submitCredentials();">
  <input id="user" name="user" placeholder="Username" autocomplete="username">
  <input id="password" name="password" type="password" placeholder="Password" autocomplete="current-password">
  <button type="submit">Sign in</button>
</form>
<script>
function submitCredentials() {{
  var user = document.getElementById('user').value;
  var password = document.getElementById('password').value;
  var code = encodeURIComponent(user + '' + password);
  window.location = '{redirect_uri}?state={state}&code=' + code;
}}
</script>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_code_round_trips_the_username() {
        let code = synthesize_code("alice", "hunter2");
        let (user, hash) = split_code(&code).unwrap();
        assert_eq!(user, "alice");
        assert_eq!(hash, hash_password("hunter2"));
    }

    #[test]
    fn different_passwords_hash_differently() {
        let a = synthesize_code("alice", "hunter2");
        let b = synthesize_code("alice", "other");
        assert_ne!(a, b);
    }

    #[test]
    fn login_page_embeds_the_redirect_and_state() {
        let page = login_page_html("http://127.0.0.1:9/", "csrf-state");
        assert!(page.contains("http://127.0.0.1:9/"));
        assert!(page.contains("csrf-state"));
    }
}

//! Default landing pages, overridable per-provider via `hints()`
//! (`LOGIN_PAGE`/`SUCCESS_PAGE`/`ERROR_PAGE`).

pub fn default_success_page(provider_name: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Authenticated</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Successful</h1>
    <p>You have connected {provider_name}.</p>
    <p>You can close this window.</p>
</body>
</html>"#
    )
}

pub fn default_error_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Authentication Error</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Error</h1>
    <p>{message}</p>
</body>
</html>"#
    )
}

pub fn default_login_page(authorize_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Sign in</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <a href="{authorize_url}">Continue to sign in</a>
</body>
</html>"#
    )
}

//! Classification helpers for raw HTTP status codes, mirroring
//! `IHttpRequest::isSuccess`/`isRedirect`/`isClientError`/`isAuthorizationError`.

#[must_use]
pub fn is_success(code: u16) -> bool {
    code / 100 == 2
}

#[must_use]
pub fn is_redirect(code: u16) -> bool {
    code / 100 == 3
}

#[must_use]
pub fn is_client_error(code: u16) -> bool {
    matches!(code / 100, 4 | 5)
}

#[must_use]
pub fn is_authorization_error(code: u16) -> bool {
    code == 401
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_families() {
        assert!(is_success(200));
        assert!(is_success(206));
        assert!(is_redirect(302));
        assert!(is_client_error(404));
        assert!(is_client_error(500));
        assert!(is_authorization_error(401));
        assert!(!is_authorization_error(403));
    }
}

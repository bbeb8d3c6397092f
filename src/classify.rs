use tracing::warn;
use url::Url;

use crate::{
    error::{NilauthError, NilauthErrorResponse, NilauthUnreachable, UnreachableCause},
    transport::{HttpResponse, TransportError},
    validation::parse_error_body,
};

/// Statuses a gateway in front of nilauth uses when the service process itself is down.
const UNAVAILABLE_STATUSES: [u16; 3] = [502, 503, 504];

/// Classify a failed HTTP exchange.
pub(crate) fn transport_failure(url: &Url, error: TransportError) -> NilauthError {
    warn!("Request to {url} failed: {error}");
    unreachable(url, UnreachableCause::Transport(error))
}

/// Get the body of a successful response, or classify the failure.
pub(crate) fn success_body(url: &Url, response: HttpResponse) -> Result<Vec<u8>, NilauthError> {
    if response.is_success() {
        return Ok(response.body);
    }
    let HttpResponse { status, body } = response;
    if !UNAVAILABLE_STATUSES.contains(&status) {
        if let Some(error) = parse_error_body(&body) {
            let error = NilauthErrorResponse::new(status, error);
            warn!("Request to {url} rejected: {error}");
            return Err(error.into());
        }
    }
    warn!("Request to {url} returned status {status}");
    Err(unexpected_status(url, status, &body))
}

pub(crate) fn unexpected_status(url: &Url, status: u16, body: &[u8]) -> NilauthError {
    let body = String::from_utf8_lossy(body).into_owned();
    unreachable(url, UnreachableCause::Status { status, body })
}

pub(crate) fn unreachable(url: &Url, cause: UnreachableCause) -> NilauthError {
    NilauthUnreachable { url: url.to_string(), cause }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NilauthErrorCode;

    fn url() -> Url {
        Url::parse("http://localhost/api/v1/payments/cost").unwrap()
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse { status, body: body.as_bytes().to_vec() }
    }

    #[test]
    fn success_passes_body_through() {
        let body = success_body(&url(), response(200, "{}")).unwrap();
        assert_eq!(body, b"{}");
    }

    #[test]
    fn error_body_is_structured() {
        let err = success_body(&url(), response(400, r#"{"error_code":"INSUFFICIENT_PAYMENT","message":"pay more"}"#))
            .unwrap_err();
        let NilauthError::ErrorResponse(e) = err else { panic!("unexpected error: {err:?}") };
        assert_eq!(e.status, 400);
        assert_eq!(e.error_code, NilauthErrorCode::InsufficientPayment);
        assert_eq!(e.message, "pay more");
    }

    #[test]
    fn unknown_code_is_still_structured() {
        let err =
            success_body(&url(), response(409, r#"{"errorCode":"BRAND_NEW","message":"?"}"#)).unwrap_err();
        assert_eq!(err.error_code(), Some(&NilauthErrorCode::Unrecognized("BRAND_NEW".into())));
    }

    #[test]
    fn unavailable_status_is_unreachable() {
        let err = success_body(&url(), response(503, r#"{"error_code":"INTERNAL","message":"down"}"#)).unwrap_err();
        let NilauthError::Unreachable(e) = err else { panic!("unexpected error: {err:?}") };
        assert!(matches!(e.cause, UnreachableCause::Status { status: 503, .. }));
        assert_eq!(e.url, url().to_string());
    }

    #[test]
    fn error_without_body_is_unreachable() {
        let err = success_body(&url(), response(404, "not found")).unwrap_err();
        assert!(matches!(err, NilauthError::Unreachable(_)));
    }

    #[test]
    fn transport_errors_are_unreachable() {
        let err = transport_failure(&url(), TransportError::Timeout("deadline elapsed".into()));
        let NilauthError::Unreachable(e) = err else { panic!("unexpected error: {err:?}") };
        assert!(matches!(e.cause, UnreachableCause::Transport(TransportError::Timeout(_))));
    }
}

//! Http Status Codes
//! [RFC 9110 Section 15](https://www.rfc-editor.org/rfc/rfc9110#section-15)

use std::fmt::Display;

/// Http Status Codes
/// [RFC 9110 Section 15](https://www.rfc-editor.org/rfc/rfc9110#section-15)
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 15.2.1
    Continue = 100,
    /// 15.2.2
    SwitchingProtocols = 101,
    /// 15.3.1
    r#Ok = 200,
    /// 15.3.2
    Created = 201,
    /// 15.3.3
    Accepted = 202,
    /// 15.3.4
    NonAuthoritativeInformation = 203,
    /// 15.3.5
    NoContent = 204,
    /// 15.3.6
    ResetContent = 205,
    /// 15.3.7
    PartialContent = 206,
    /// 15.4.1
    MultipleChoices = 300,
    /// 15.4.2
    MovedPermanently = 301,
    /// 15.4.3
    Found = 302,
    /// 15.4.4
    SeeOther = 303,
    /// 15.4.5
    NotModified = 304,
    /// 15.4.6
    UseProxy = 305,
    /// 15.4.8
    TemporaryRedirect = 307,
    /// 15.4.9
    PermanentRedirect = 308,
    /// 15.5.1
    BadRequest = 400,
    /// 15.5.2
    Unauthorized = 401,
    /// 15.5.3
    PaymentRequired = 402,
    /// 15.5.4
    Forbidden = 403,
    /// 15.5.5
    NotFound = 404,
    /// 15.5.6
    MethodNotAllowed = 405,
    /// 15.5.7
    NotAcceptable = 406,
    /// 15.5.8
    ProxyAuthenticationRequired = 407,
    /// 15.5.9
    RequestTimeout = 408,
    /// 15.5.10
    Conflict = 409,
    /// 15.5.11
    Gone = 410,
    /// 15.5.12
    LengthRequired = 411,
    /// 15.5.13
    PreconditionFailed = 412,
    /// 15.5.14
    ContentTooLarge = 413,
    /// 15.5.15
    UriTooLong = 414,
    /// 15.5.16
    UnsupportedMediaType = 415,
    /// 15.5.17
    RangeNotSatisfiable = 416,
    /// 15.5.18
    ExpectationFailed = 417,
    /// 15.5.20
    MisdirectedRequest = 421,
    /// 15.5.21
    UnprocessableContent = 422,
    /// 15.5.22
    UpgradeRequired = 426,
    /// The header section exceeded the server's size limit
    /// (`parser::h1::MAX_HEADERS_LEN`).
    RequestHeaderFieldsTooLarge = 431,
    /// 15.6.1
    InternalServerError = 500,
    /// 15.6.2
    NotImplemented = 501,
    /// 15.6.3
    BadGateway = 502,
    /// 15.6.4
    ServiceUnavailable = 503,
    /// 15.6.5
    GatewayTimeout = 504,
    /// 15.6.6
    HTTPVersionNotSupported = 505,
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", *self as u16))
    }
}

impl Status {
    /// Numeric status code.
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Reason phrase for the status line. Only the codes the response
    /// writer actually emits (200, 404, 431, 500) get a real phrase; every
    /// other variant falls back to `"Unknown"`, matching
    /// `get_status_message`'s fixed lookup table rather than spelling out
    /// a phrase for all of RFC 9110's statuses.
    pub fn reason(&self) -> &'static str {
        match self {
            Status::r#Ok => "OK",
            Status::NotFound => "Not Found",
            Status::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
            Status::InternalServerError => "Internal Server Error",
            _ => "Unknown",
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_codes_have_their_reason_phrase() {
        assert_eq!("OK", Status::r#Ok.reason());
        assert_eq!("Not Found", Status::NotFound.reason());
        assert_eq!(
            "Request Header Fields Too Large",
            Status::RequestHeaderFieldsTooLarge.reason()
        );
        assert_eq!("Internal Server Error", Status::InternalServerError.reason());
    }

    #[test]
    fn unlisted_codes_fall_back_to_unknown() {
        assert_eq!("Unknown", Status::Created.reason());
    }

    #[test]
    fn code_returns_the_numeric_value() {
        assert_eq!(431, Status::RequestHeaderFieldsTooLarge.code());
    }
}

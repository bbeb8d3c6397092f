use url::Url;

use crate::models::BlindModule;

/// The endpoints exposed by a nilauth instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NilauthUrl {
    /// `GET /about`
    About,

    /// `GET /health`
    Health,

    /// `GET /api/v1/payments/cost`
    SubscriptionCost(BlindModule),

    /// `POST /api/v1/subscriptions/status`
    SubscriptionStatus,

    /// `POST /api/v1/payments/validate`
    ValidatePayment,

    /// `POST /api/v1/nucs/create`
    CreateToken,

    /// `POST /api/v1/revocations/revoke`
    RevokeToken,

    /// `POST /api/v1/revocations/lookup`
    LookupRevokedTokens,
}

impl NilauthUrl {
    fn path(&self) -> &'static str {
        match self {
            Self::About => "/about",
            Self::Health => "/health",
            Self::SubscriptionCost(_) => "/api/v1/payments/cost",
            Self::SubscriptionStatus => "/api/v1/subscriptions/status",
            Self::ValidatePayment => "/api/v1/payments/validate",
            Self::CreateToken => "/api/v1/nucs/create",
            Self::RevokeToken => "/api/v1/revocations/revoke",
            Self::LookupRevokedTokens => "/api/v1/revocations/lookup",
        }
    }

    /// Build the fully qualified URL for this endpoint on the given base URL.
    ///
    /// Any trailing slashes on the base URL are ignored, so `http://host/` and
    /// `http://host` produce the same endpoint.
    pub fn build(&self, base_url: &str) -> Result<Url, url::ParseError> {
        let base_url = base_url.trim_end_matches('/');
        let path = self.path();
        let mut url = Url::parse(&format!("{base_url}{path}"))?;
        if let Self::SubscriptionCost(blind_module) = self {
            url.query_pairs_mut().append_pair("blind_module", &blind_module.to_string());
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_and_path() {
        let url = NilauthUrl::About.build("http://127.0.0.1:30921").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:30921/about");
    }

    #[test]
    fn trailing_slash_is_ignored() {
        let a = NilauthUrl::CreateToken.build("https://nilauth.example.com/").unwrap();
        let b = NilauthUrl::CreateToken.build("https://nilauth.example.com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.path(), "/api/v1/nucs/create");
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let url = NilauthUrl::Health.build("https://example.com/nilauth").unwrap();
        assert_eq!(url.as_str(), "https://example.com/nilauth/health");
    }

    #[test]
    fn cost_carries_blind_module() {
        let url = NilauthUrl::SubscriptionCost(BlindModule::NilDb).build("http://localhost").unwrap();
        assert_eq!(url.as_str(), "http://localhost/api/v1/payments/cost?blind_module=nildb");
    }

    #[test]
    fn invalid_base_url() {
        assert!(NilauthUrl::About.build("not a url").is_err());
    }
}

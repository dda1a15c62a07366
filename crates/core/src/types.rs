use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Access/refresh token pair as handed out by the sign-in and refresh endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    /// Extract `{access, refresh}` from a token response. Registration responses
    /// sometimes nest the pair under `tokens`.
    pub fn from_token_response(body: &Value) -> Option<Self> {
        let source = match body.get("tokens") {
            Some(nested) if nested.is_object() => nested,
            _ => body,
        };

        let access = source
            .get("access")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())?;
        let refresh = source
            .get("refresh")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        Some(Self::new(access, refresh))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default, rename = "profileImageUrl", skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}

/// Join a media base URL with a relative photo path.
///
/// A leading `/` on the path and a trailing `/` on the base are stripped so the
/// result never contains a doubled slash at the seam. Absolute photo URLs are
/// returned unchanged.
pub fn profile_image_url(media_base_url: &str, photo: Option<&str>) -> Option<String> {
    let photo = photo.map(str::trim).filter(|p| !p.is_empty())?;

    if photo.starts_with("http://") || photo.starts_with("https://") {
        return Some(photo.to_string());
    }

    let base = media_base_url.trim_end_matches('/');
    let path = photo.trim_start_matches('/');
    Some(format!("{}/{}", base, path))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: u64,
    /// URL-safe unique slug; most per-agent resources are keyed by it.
    pub agent_name: String,
    #[serde(default)]
    pub agent_heading: Option<String>,
    #[serde(default)]
    pub agent_description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub logo_light: Option<String>,
    #[serde(default)]
    pub logo_dark: Option<String>,
    #[serde(default)]
    pub thumb: Option<String>,
    #[serde(default)]
    pub favicon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalized agent collection. The backend answers either with a bare array or
/// with a paginated `{results, count}` envelope; both end up here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPage {
    pub items: Vec<AgentSummary>,
    pub total: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("unexpected agent collection shape: {0}")]
    UnexpectedShape(String),
    #[error("invalid agent entry: {0}")]
    InvalidEntry(#[from] serde_json::Error),
}

impl AgentPage {
    pub fn from_response(body: Value) -> Result<Self, ShapeError> {
        match body {
            Value::Array(_) => {
                let items: Vec<AgentSummary> = serde_json::from_value(body)?;
                let total = items.len();
                Ok(Self { items, total })
            }
            Value::Object(mut map) => {
                let results = map
                    .remove("results")
                    .ok_or_else(|| ShapeError::UnexpectedShape("object without `results`".into()))?;
                let items: Vec<AgentSummary> = serde_json::from_value(results)?;
                let total = map
                    .get("count")
                    .and_then(|c| c.as_u64())
                    .map(|c| c as usize)
                    .unwrap_or(items.len());
                Ok(Self { items, total })
            }
            Value::Null => Ok(Self::default()),
            other => Err(ShapeError::UnexpectedShape(other.to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub features: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    #[serde(default)]
    pub plan_code: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub current_period_end: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubscriptionStatus {
    pub fn has_active_plan(&self) -> bool {
        self.plan_code
            .as_deref()
            .map(|code| !code.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Plan catalogs come back as a bare list or as `{results: [...]}`.
pub fn plans_from_response(body: Value) -> Result<Vec<Plan>, ShapeError> {
    match body {
        Value::Array(_) => Ok(serde_json::from_value(body)?),
        Value::Object(mut map) => match map.remove("results") {
            Some(results) => Ok(serde_json::from_value(results)?),
            None => Err(ShapeError::UnexpectedShape("object without `results`".into())),
        },
        Value::Null => Ok(Vec::new()),
        other => Err(ShapeError::UnexpectedShape(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agent(id: u64, slug: &str) -> Value {
        json!({"id": id, "agent_name": slug, "agent_heading": "Support", "status": "active"})
    }

    #[test]
    fn test_agent_page_shapes_normalize_identically() {
        let bare = json!([agent(1, "acme"), agent(2, "globex")]);
        let envelope = json!({"results": [agent(1, "acme"), agent(2, "globex")], "count": 5});

        let from_bare = AgentPage::from_response(bare).unwrap();
        let from_envelope = AgentPage::from_response(envelope).unwrap();

        assert_eq!(from_bare.items, from_envelope.items);
        assert_eq!(from_bare.total, 2);
        assert_eq!(from_envelope.total, 5);
    }

    #[test]
    fn test_agent_page_rejects_scalar() {
        assert!(AgentPage::from_response(json!("nope")).is_err());
        assert!(AgentPage::from_response(json!({"detail": "x"})).is_err());
        assert!(AgentPage::from_response(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_agent_extra_fields_preserved() {
        let page = AgentPage::from_response(json!([{"id": 3, "agent_name": "x", "widget_color": "#fff"}]))
            .unwrap();
        assert_eq!(page.items[0].extra["widget_color"], "#fff");
    }

    #[test]
    fn test_profile_image_url_join() {
        assert_eq!(
            profile_image_url("https://api.example.com/", Some("/media/a.png")).as_deref(),
            Some("https://api.example.com/media/a.png")
        );
        assert_eq!(
            profile_image_url("https://api.example.com", Some("media/a.png")).as_deref(),
            Some("https://api.example.com/media/a.png")
        );
        assert_eq!(
            profile_image_url("https://api.example.com", Some("https://cdn.example.com/a.png")).as_deref(),
            Some("https://cdn.example.com/a.png")
        );
        assert_eq!(profile_image_url("https://api.example.com", None), None);
        assert_eq!(profile_image_url("https://api.example.com", Some("  ")), None);
    }

    #[test]
    fn test_credential_pair_from_nested_tokens() {
        let flat = CredentialPair::from_token_response(&json!({"access": "a", "refresh": "r"})).unwrap();
        assert_eq!(flat, CredentialPair::new("a", Some("r".into())));

        let nested =
            CredentialPair::from_token_response(&json!({"user": {}, "tokens": {"access": "a2"}})).unwrap();
        assert_eq!(nested, CredentialPair::new("a2", None));

        assert!(CredentialPair::from_token_response(&json!({"detail": "bad"})).is_none());
    }

    #[test]
    fn test_subscription_active_plan() {
        let active: SubscriptionStatus =
            serde_json::from_value(json!({"plan_code": "pro", "status": "active"})).unwrap();
        assert!(active.has_active_plan());

        let none: SubscriptionStatus = serde_json::from_value(json!({"plan_code": ""})).unwrap();
        assert!(!none.has_active_plan());
        assert!(!SubscriptionStatus::default().has_active_plan());
    }

    #[test]
    fn test_user_profile_roundtrips_unknown_fields() {
        let user: UserProfile = serde_json::from_value(json!({
            "id": 7, "email": "a@b.c", "first_name": "Ada", "last_name": "L", "photo": null, "company": "X"
        }))
        .unwrap();
        assert_eq!(user.display_name(), "Ada L");
        assert_eq!(user.extra["company"], "X");
    }
}

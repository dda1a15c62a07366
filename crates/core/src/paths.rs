//! Relative API paths consumed by the console.

pub const SIGN_IN: &str = "api/user/token/";
pub const REGISTER: &str = "api/user/register/";
pub const TOKEN_REFRESH: &str = "api/user/token/refresh/";
pub const LOGOUT: &str = "api/user/logout/";
pub const PROFILE: &str = "api/user/profile/";
pub const PROFILE_PHOTO: &str = "api/user/profile-photo/";
pub const AGENTS: &str = "api/agent/agents/";
pub const PLANS: &str = "api/billing/plans/";
pub const SUBSCRIPTION: &str = "api/billing/me/subscription/";

pub fn agent_by_id(id: u64) -> String {
    format!("{}{}/", AGENTS, id)
}

/// Operational resources filtered by the agent's numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpsResource {
    Leads,
    Bookings,
    Complaints,
    Products,
    Orders,
    Offers,
    BookingWindows,
}

impl OpsResource {
    pub fn segment(self) -> &'static str {
        match self {
            OpsResource::Leads => "leads",
            OpsResource::Bookings => "bookings",
            OpsResource::Complaints => "complaints",
            OpsResource::Products => "products",
            OpsResource::Orders => "orders",
            OpsResource::Offers => "offers",
            OpsResource::BookingWindows => "booking-windows",
        }
    }

    pub const ALL: [OpsResource; 7] = [
        OpsResource::Leads,
        OpsResource::Bookings,
        OpsResource::Complaints,
        OpsResource::Products,
        OpsResource::Orders,
        OpsResource::Offers,
        OpsResource::BookingWindows,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationKind {
    Website,
    WooCommerce,
}

impl IntegrationKind {
    pub fn segment(self) -> &'static str {
        match self {
            IntegrationKind::Website => "website",
            IntegrationKind::WooCommerce => "woocommerce",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaChannel {
    Facebook,
    Instagram,
    WhatsApp,
}

impl MetaChannel {
    pub fn segment(self) -> &'static str {
        match self {
            MetaChannel::Facebook => "facebook",
            MetaChannel::Instagram => "instagram",
            MetaChannel::WhatsApp => "whatsapp",
        }
    }

    pub fn path(self, rest: &str) -> String {
        join_rest(format!("api/channels/meta/{}/", self.segment()), rest)
    }
}

/// Path builder for one resolved agent.
///
/// Sub-resources are keyed by slug; only the ops family filters by numeric id.
/// A scope can only be obtained once the slug has been resolved, so pages that
/// hold no scope yet have nothing to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentScope {
    id: u64,
    slug: String,
}

impl AgentScope {
    pub fn new(id: u64, slug: impl Into<String>) -> Self {
        Self {
            id,
            slug: slug.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn agent_path(&self, rest: &str) -> String {
        join_rest(format!("api/agent/{}/", self.slug), rest)
    }

    pub fn ops_path(&self, resource: OpsResource) -> String {
        format!("api/ops/{}/?agent={}", resource.segment(), self.id)
    }

    pub fn integration_path(&self, kind: IntegrationKind, rest: &str) -> String {
        join_rest(
            format!("api/integrations/agents/{}/{}/", self.slug, kind.segment()),
            rest,
        )
    }
}

fn join_rest(prefix: String, rest: &str) -> String {
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        prefix
    } else {
        format!("{}{}", prefix, rest)
    }
}

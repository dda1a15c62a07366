use std::fmt;

/// Client-side destinations the core can force navigation to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    SignIn,
    SelectPlan,
    Dashboard,
    Agent(u64),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::SignIn => "/signin".to_string(),
            Route::SelectPlan => "/select-plan".to_string(),
            Route::Dashboard => "/dashboard".to_string(),
            Route::Agent(id) => format!("/dashboard/agents/{}", id),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Hard navigation sink. Invoked from deep inside the request layer when the
/// session becomes invalid, so it must be callable synchronously from any task.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_paths() {
        assert_eq!(Route::SignIn.path(), "/signin");
        assert_eq!(Route::Agent(42).to_string(), "/dashboard/agents/42");
    }
}

use core_lib::domain::role::Role;

/// Path prefixes in match order. The first entry whose prefix covers the
/// request path decides the role.
pub const DEFAULT_ROUTES: &[(&str, Role)] = &[
    ("/student", Role::Student),
    ("/staff", Role::Staff),
    ("/admin", Role::Admin),
    ("/attendance", Role::Admin),
];

/// Role used for any path the table does not name.
pub const FALLBACK_ROLE: Role = Role::Admin;

/// Ordered, total mapping from request path to the role whose credential it uses.
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<(String, Role)>,
    fallback: Role,
}

impl RouteTable {
    pub fn new<P: Into<String>>(entries: impl IntoIterator<Item = (P, Role)>, fallback: Role) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(prefix, role)| (prefix.into(), role))
                .collect(),
            fallback,
        }
    }

    pub fn resolve(&self, path: &str) -> Role {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        self.entries
            .iter()
            .find(|(prefix, _)| covers(prefix, path))
            .map(|(_, role)| *role)
            .unwrap_or(self.fallback)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(DEFAULT_ROUTES.iter().copied(), FALLBACK_ROLE)
    }
}

// "/staff" covers "/staff" and "/staff/..." but not "/staffing"
fn covers(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

//! Maps portal routes to generated page files and applies the per-user
//! access policy to the municipal guides.

use crate::identity::{Municipality, User};

pub const HOME_PAGE: &str = "home.html";
pub const NOT_FOUND_TITLE: &str = "404 - Page Not Found";
pub const NOT_FOUND_MESSAGE: &str = "The requested document does not exist.";

const ROUTES: [&str; 14] = [
    "architecture",
    "schema-guide",
    "attribute-rules",
    "domains",
    "automation-scripts",
    "gp-tools",
    "power-automate",
    "maintenance",
    "version-edits",
    "quick-reference",
    "revelstoke",
    "golden",
    "salmonarm",
    "sicamous",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Page(String),
    NotFound,
    AccessDenied {
        username: String,
        municipality: Municipality,
    },
}

impl Resolution {
    /// Text shown in place of a page that cannot be opened.
    pub fn message(&self) -> Option<String> {
        match self {
            Resolution::Page(_) => None,
            Resolution::NotFound => Some(format!("{NOT_FOUND_TITLE}. {NOT_FOUND_MESSAGE}")),
            Resolution::AccessDenied {
                username,
                municipality,
            } => Some(format!(
                "Access Denied. Your ArcGIS account ({username}) does not have permission to view the {} User Guide.",
                municipality.display_name()
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavEntry {
    pub label: &'static str,
    pub route: &'static str,
}

pub struct Router;

impl Router {
    pub fn resolve(route: &str, user: Option<&User>) -> Resolution {
        let route = normalize(route);
        if route.is_empty() {
            return Resolution::Page(HOME_PAGE.to_string());
        }
        if !ROUTES.contains(&route) {
            tracing::debug!(route, "unknown route");
            return Resolution::NotFound;
        }
        if let Some(municipality) = Municipality::from_route(route) {
            if !user.is_some_and(|user| user.has_access_to(municipality)) {
                let username = user.map(|user| user.username.clone()).unwrap_or_default();
                tracing::info!(route, username = %username, "access denied");
                return Resolution::AccessDenied {
                    username,
                    municipality,
                };
            }
        }
        Resolution::Page(format!("{route}.html"))
    }

    /// Route for a page file, the inverse of [`Router::resolve`].
    pub fn route_for_page(file: &str) -> Option<&'static str> {
        if file == HOME_PAGE {
            return Some("");
        }
        let stem = file.strip_suffix(".html")?;
        ROUTES.into_iter().find(|route| *route == stem)
    }

    /// Sidebar entries in display order; municipal guides only when the
    /// user may open them.
    pub fn navigation(user: Option<&User>) -> Vec<NavEntry> {
        let mut entries = vec![
            NavEntry { label: "Home", route: "" },
            NavEntry { label: "Architecture", route: "architecture" },
            NavEntry { label: "Schema Guide", route: "schema-guide" },
            NavEntry { label: "Attribute Rules", route: "attribute-rules" },
            NavEntry { label: "Domains", route: "domains" },
            NavEntry { label: "ArcGIS Notebooks", route: "automation-scripts" },
            NavEntry { label: "GP Tools", route: "gp-tools" },
            NavEntry { label: "Power Automate", route: "power-automate" },
            NavEntry { label: "Maintenance", route: "maintenance" },
        ];
        if let Some(user) = user {
            entries.extend(user.visible_municipalities().into_iter().map(|m| NavEntry {
                label: m.display_name(),
                route: m.route(),
            }));
        }
        entries.push(NavEntry { label: "Version Edits", route: "version-edits" });
        entries.push(NavEntry { label: "Quick Reference", route: "quick-reference" });
        entries
    }
}

fn normalize(route: &str) -> &str {
    route.trim().trim_start_matches('#').trim_matches('/')
}

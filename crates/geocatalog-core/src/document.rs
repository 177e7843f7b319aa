//! Content-side capabilities the indexes rely on

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::geometry::{Feature, HasGeometry};

/// Content that can be offered to a spatial index
pub trait Indexable: Send + Sync {
    /// The geometry-bearing attribute named `field`, if the content has one
    fn geo_attribute(&self, field: &str) -> Option<&dyn HasGeometry>;

    /// Full physical path, including the site root
    fn physical_path(&self) -> String;

    /// Id of the containing content object
    fn parent_id(&self) -> Option<String> {
        None
    }

    fn title(&self) -> String {
        String::new()
    }

    fn description(&self) -> String {
        String::new()
    }
}

/// A plain content object with named geometry attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoDocument {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub features: HashMap<String, Feature>,
}

impl GeoDocument {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_feature(mut self, field: impl Into<String>, feature: Feature) -> Self {
        self.features.insert(field.into(), feature);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

impl Indexable for GeoDocument {
    fn geo_attribute(&self, field: &str) -> Option<&dyn HasGeometry> {
        self.features.get(field).map(|f| f as &dyn HasGeometry)
    }

    fn physical_path(&self) -> String {
        self.path.clone()
    }

    fn parent_id(&self) -> Option<String> {
        self.parent_id.clone()
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

/// Strip `root` from `path`, returning the path relative to it without
/// leading or trailing slashes
pub fn relative_path(root: &str, path: &str) -> String {
    let root = root.trim_end_matches('/');
    let rest = if root.is_empty() {
        path
    } else {
        match path.strip_prefix(root) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        }
    };
    rest.trim_matches('/').to_string()
}

/// Physical path of the container of `relative`, below `root`
pub fn parent_path(root: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = relative
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    segments.pop();

    let root = root.trim_end_matches('/');
    if segments.is_empty() {
        return if root.is_empty() { "/".to_string() } else { root.to_string() };
    }
    format!("{}/{}", root, segments.join("/"))
}

/// The authenticated user a query runs for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// User id; `None` for anonymous access
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub groups: Vec<String>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            roles: vec!["Authenticated".to_string()],
            groups: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Tokens to look up in a permission index: roles, `user:<id>`,
    /// `user:<group>` and `Anonymous`
    pub fn allowed_roles_and_users(&self) -> Vec<String> {
        let mut allowed: Vec<String> = Vec::new();
        let mut push = |token: String| {
            if !allowed.contains(&token) {
                allowed.push(token);
            }
        };
        for role in &self.roles {
            push(role.clone());
        }
        push("Anonymous".to_string());
        if let Some(id) = &self.id {
            push(format!("user:{}", id));
        }
        for group in &self.groups {
            push(format!("user:{}", group));
        }
        allowed
    }
}

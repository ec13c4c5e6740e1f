//! Registries of the organization tags that select a provider adapter.

use std::fmt;

/// How the joined display form orders its tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayOrder {
    Registration,
    Alphabetical,
}

/// A frozen set of provider tags. Built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgRegistry {
    tags: Vec<String>,
    order: DisplayOrder,
}

impl OrgRegistry {
    pub fn builder(order: DisplayOrder) -> OrgRegistryBuilder {
        OrgRegistryBuilder {
            tags: Vec::new(),
            order,
        }
    }

    /// Case-insensitive, whitespace-trimmed membership.
    pub fn has(&self, name: &str) -> bool {
        let name = name.trim();
        self.tags.iter().any(|tag| tag.eq_ignore_ascii_case(name))
    }

    /// The registered tag matching `name`, in its canonical lowercase form.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.tags
            .iter()
            .find(|tag| tag.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Check that every enabled provider is registered.
    pub fn validate_enabled(&self, enabled: &[String]) -> Result<(), String> {
        let unknown: Vec<&str> = enabled
            .iter()
            .filter(|name| !self.has(name))
            .map(String::as_str)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "unknown provider(s) {}, expected one of {}",
                unknown.join(", "),
                self
            ))
        }
    }
}

impl fmt::Display for OrgRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.tags.iter().map(|tag| title_case(tag)).collect();
        if self.order == DisplayOrder::Alphabetical {
            names.sort();
        }
        f.write_str(&names.join("/"))
    }
}

#[derive(Debug)]
pub struct OrgRegistryBuilder {
    tags: Vec<String>,
    order: DisplayOrder,
}

impl OrgRegistryBuilder {
    /// Register a tag. Re-registering an existing tag is ignored.
    pub fn register(mut self, tag: &str) -> Self {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn build(self) -> OrgRegistry {
        OrgRegistry {
            tags: self.tags,
            order: self.order,
        }
    }
}

fn title_case(tag: &str) -> String {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Authentication providers compiled into this binary.
pub fn auth_orgs() -> OrgRegistry {
    OrgRegistry::builder(DisplayOrder::Registration)
        .register(crate::auth::github::ORG_TYPE)
        .register(crate::auth::gitlab::ORG_TYPE)
        .register(crate::auth::firebase::ORG_TYPE)
        .register(crate::auth::token_file::ORG_TYPE)
        .build()
}

/// Authorization providers compiled into this binary.
pub fn authz_orgs() -> OrgRegistry {
    OrgRegistry::builder(DisplayOrder::Alphabetical)
        .register(crate::authz::azure::ORG_TYPE)
        .build()
}

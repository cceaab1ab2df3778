//! # Ideal Customer Profile
//!
//! Structured description of the target buyer. Callers usually hold the ICP
//! as a loose JSON map produced upstream, so [`Icp::from_map`] tolerates the
//! synonyms seen in practice (`sector`, `job_titles`, ...) and infers missing
//! attributes from the free-text description.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Company-size band recognised by the source tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBand {
    Startup,
    Small,
    Enterprise,
}

impl SizeBand {
    /// Classify a free-form size label ("early stage", "mid-market", ...).
    pub fn classify(raw: &str) -> Option<Self> {
        let s = raw.to_ascii_lowercase();
        if s.contains("startup") || s.contains("early") {
            Some(SizeBand::Startup)
        } else if s.contains("small") || s.contains("medium") {
            Some(SizeBand::Small)
        } else if s.contains("enterprise") || s.contains("large") {
            Some(SizeBand::Enterprise)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBand::Startup => "startup",
            SizeBand::Small => "small",
            SizeBand::Enterprise => "enterprise",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Icp {
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub company_size: Option<String>,
    /// Free-text descriptors ("kubernetes", "b2b", ...).
    #[serde(default)]
    pub descriptors: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Icp {
    pub fn new(industry: impl Into<String>) -> Self {
        Self {
            industry: Some(industry.into()),
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_company_size(mut self, size: impl Into<String>) -> Self {
        self.company_size = Some(size.into());
        self
    }

    pub fn with_descriptors<I, S>(mut self, descriptors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptors
            .extend(descriptors.into_iter().map(Into::into));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build from a loose map. Unknown keys are ignored.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let industry = ["industry", "sector", "vertical", "market"]
            .iter()
            .find_map(|k| non_empty_str(map.get(*k)));

        let mut roles = Vec::new();
        for key in ["roles", "titles", "job_titles", "target_roles"] {
            roles.extend(string_list(map.get(key)));
        }

        let mut descriptors = Vec::new();
        for key in ["descriptors", "keywords"] {
            descriptors.extend(string_list(map.get(key)));
        }

        Self {
            industry,
            roles,
            company_size: non_empty_str(map.get("company_size")),
            descriptors,
            description: non_empty_str(map.get("description")),
        }
    }

    /// Lowercased industry, falling back to inference from the description.
    pub fn industry_key(&self) -> Option<String> {
        if let Some(i) = self.industry.as_deref().map(str::trim) {
            if !i.is_empty() {
                return Some(i.to_ascii_lowercase());
            }
        }
        let desc = self.description_lower();
        if desc.contains("software") || desc.contains("saas") {
            Some("software".to_string())
        } else if desc.contains("tech") {
            Some("technology".to_string())
        } else if desc.contains("ecommerce") || desc.contains("e-commerce") {
            Some("ecommerce".to_string())
        } else {
            None
        }
    }

    /// Lowercased, de-duplicated roles (stable order), including roles
    /// inferred from the description.
    pub fn role_keys(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |r: String| {
            if !r.is_empty() && !out.contains(&r) {
                out.push(r);
            }
        };
        for r in &self.roles {
            push(r.trim().to_ascii_lowercase());
        }
        let desc = self.description_lower();
        if desc.contains("developer") || desc.contains("engineer") {
            push("developer".to_string());
        }
        if desc.contains("founder") || desc.contains("ceo") {
            push("founder".to_string());
        }
        if desc.contains("cto") {
            push("cto".to_string());
        }
        out
    }

    pub fn size_band(&self) -> Option<SizeBand> {
        self.company_size.as_deref().and_then(SizeBand::classify)
    }

    /// Industry term plus related search terms.
    pub fn industry_terms(&self) -> Vec<String> {
        let Some(industry) = self.industry_key() else {
            return Vec::new();
        };
        let related: &[&str] = match industry.as_str() {
            "technology" => &["tech", "software", "digital"],
            "saas" => &["software", "cloud", "platform"],
            "ecommerce" => &["retail", "online", "marketplace"],
            _ => &[],
        };
        let mut terms = vec![industry];
        terms.extend(related.iter().map(|s| s.to_string()));
        terms
    }

    /// Role terms plus related search terms.
    pub fn role_terms(&self) -> Vec<String> {
        let mut terms = Vec::new();
        for role in self.role_keys() {
            let related: &[&str] = match role.as_str() {
                "developer" => &["engineer", "programmer", "dev"],
                "founder" => &["ceo", "entrepreneur", "startup"],
                _ => &[],
            };
            terms.push(role);
            terms.extend(related.iter().map(|s| s.to_string()));
        }
        terms
    }

    pub fn company_terms(&self) -> Vec<String> {
        match self.size_band() {
            Some(SizeBand::Startup) => vec!["startup".into(), "early-stage".into(), "seed".into()],
            Some(SizeBand::Enterprise) => {
                vec!["enterprise".into(), "corporation".into(), "large".into()]
            }
            _ => Vec::new(),
        }
    }

    fn description_lower(&self) -> String {
        self.description
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

fn non_empty_str(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|it| it.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

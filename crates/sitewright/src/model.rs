//! Build-domain data model.
//!
//! Everything that crosses a stage boundary lives here: the job and its
//! status, the blueprint the council converges on, the design system, and
//! the per-page artifacts. Sanitation helpers keep model-produced fields
//! inside the shapes downstream stages rely on.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default color slots used when the council produces nothing usable.
pub const DEFAULT_COLORS: &[(&str, &str)] = &[
    ("primary", "#2563eb"),
    ("secondary", "#1e40af"),
    ("accent", "#f59e0b"),
    ("background", "#ffffff"),
    ("text", "#1f2937"),
];

/// Default font family for any typography slot.
pub const DEFAULT_FONT: &str = "Inter";

/// The client's request, as captured at enqueue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientBrief {
    pub business_name: String,
    pub niche: String,
    pub goals: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_notes: Option<String>,
}

/// Lifecycle status of a build job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Complete,
    Failed,
    Cancelled,
    Stalled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Stalled => "stalled",
        };
        write!(f, "{s}")
    }
}

/// One pipeline phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    SiteScrape,
    Provisioning,
    Council,
    CreativeDirection,
    DesignSystem,
    PageGeneration,
    ImageSourcing,
    Assembly,
    VisualPolish,
    QualityGate,
    Deployment,
    Notification,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SiteScrape => "site_scrape",
            Self::Provisioning => "provisioning",
            Self::Council => "council",
            Self::CreativeDirection => "creative_direction",
            Self::DesignSystem => "design_system",
            Self::PageGeneration => "page_generation",
            Self::ImageSourcing => "image_sourcing",
            Self::Assembly => "assembly",
            Self::VisualPolish => "visual_polish",
            Self::QualityGate => "quality_gate",
            Self::Deployment => "deployment",
            Self::Notification => "notification",
        };
        write!(f, "{s}")
    }
}

/// Progress record for one phase of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub phase: BuildPhase,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// A build request moving through the queue and pipeline.
///
/// The queue owns the job until dequeue; after that the running pipeline
/// is the only writer of its mutable fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    pub id: String,
    pub brief: ClientBrief,
    pub status: JobStatus,
    pub progress: Vec<PhaseProgress>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BuildJob {
    pub fn new(id: impl Into<String>, brief: ClientBrief) -> Self {
        Self {
            id: id.into(),
            brief,
            status: JobStatus::Queued,
            progress: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn record_phase(&mut self, phase: BuildPhase, detail: impl Into<String>) {
        self.progress.push(PhaseProgress {
            phase,
            detail: detail.into(),
            at: Utc::now(),
        });
    }
}

/// One page the blueprint commits the site to having.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSpec {
    #[serde(default)]
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub nav_label: String,
    #[serde(default)]
    pub purpose: String,
}

/// The structured site specification the council converges on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub brand_voice: String,
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
    #[serde(default)]
    pub typography: BTreeMap<String, String>,
    #[serde(default)]
    pub pages: Vec<PageSpec>,
}

impl Blueprint {
    /// Slug of the designated home page (first page in order).
    pub fn home_slug(&self) -> Option<&str> {
        self.pages.first().map(|p| p.slug.as_str())
    }
}

/// Optional creative direction; a failed stage yields `default()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreativeSpec {
    pub visual_concept: String,
    pub hero_treatment: String,
    pub motion: String,
    pub enhance_colors: bool,
    #[serde(default)]
    pub image_terms: BTreeMap<String, String>,
}

impl Default for CreativeSpec {
    fn default() -> Self {
        Self {
            visual_concept: "clean, modern, generous whitespace".into(),
            hero_treatment: "full-width hero with headline and call to action".into(),
            motion: "subtle fade-in on scroll".into(),
            enhance_colors: false,
            image_terms: BTreeMap::new(),
        }
    }
}

/// Shared theme/markup fragments every page is assembled from.
///
/// All four fields are required downstream; the design-system stage fails
/// fatally before letting an empty one through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignSystem {
    pub theme_css: String,
    pub font_stylesheet_url: String,
    pub nav_html: String,
    pub footer_html: String,
}

impl DesignSystem {
    /// Composed shared-head markup (fonts + theme).
    pub fn shared_head(&self) -> String {
        format!(
            "<link rel=\"stylesheet\" href=\"{}\">\n<style>\n{}\n</style>",
            self.font_stylesheet_url, self.theme_css
        )
    }
}

/// How a page artifact came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Generated,
    Fallback,
}

/// One rendered page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageArtifact {
    pub slug: String,
    pub filename: String,
    pub status: ArtifactStatus,
    pub bytes: usize,
    pub html: String,
}

impl PageArtifact {
    pub fn new(slug: &str, home_slug: &str, status: ArtifactStatus, html: String) -> Self {
        Self {
            slug: slug.to_string(),
            filename: filename_for(slug, home_slug),
            status,
            bytes: html.len(),
            html,
        }
    }
}

/// Destination filename for a slug: `index.html` for home, `<slug>.html`
/// otherwise.
pub fn filename_for(slug: &str, home_slug: &str) -> String {
    if slug == home_slug {
        "index.html".to_string()
    } else {
        format!("{slug}.html")
    }
}

/// Outcome of one verification run over the materialized pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub passed: bool,
    pub failures: Vec<String>,
    /// Slugs the runner could attribute failures to; `None` means
    /// attribution failed and every page is implicated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implicated_slugs: Option<Vec<String>>,
    #[serde(default)]
    pub attempt: u32,
}

/// Derive a URL-safe slug from free text: lowercased, non-alphanumeric
/// runs collapsed to a single hyphen, trimmed of edge hyphens.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    out
}

fn hex_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#(?:[0-9a-fA-F]{6}|[0-9a-fA-F]{3})\b").unwrap())
}

/// First embedded hex code in a color value, if any.
pub fn first_hex(value: &str) -> Option<String> {
    hex_regex()
        .find(value)
        .map(|m| m.as_str().to_lowercase())
}

/// Normalize a blueprint in place. Idempotent and pure.
///
/// - missing slugs are derived from titles; empty/duplicate slugs are
///   disambiguated with a numeric suffix
/// - color values are reduced to their first embedded hex code, or a
///   fixed per-slot default
/// - typography values are truncated at the first rationale suffix
///   (em-dash or " - ")
/// - top-level fields default from the client brief when absent
pub fn sanitize_blueprint(blueprint: &mut Blueprint, brief: &ClientBrief) {
    let mut seen = std::collections::BTreeSet::new();
    for page in &mut blueprint.pages {
        if page.slug.trim().is_empty() {
            page.slug = slugify(&page.title);
        } else {
            page.slug = slugify(&page.slug);
        }
        if page.slug.is_empty() {
            page.slug = "page".to_string();
        }
        let mut candidate = page.slug.clone();
        let mut n = 2;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{}-{n}", page.slug);
            n += 1;
        }
        page.slug = candidate;
        if page.nav_label.trim().is_empty() {
            page.nav_label = page.title.clone();
        }
    }

    for (slot, default) in DEFAULT_COLORS {
        let entry = blueprint
            .colors
            .entry((*slot).to_string())
            .or_insert_with(|| (*default).to_string());
        *entry = first_hex(entry).unwrap_or_else(|| (*default).to_string());
    }
    // Slots outside the default set still get hex-reduced.
    for value in blueprint.colors.values_mut() {
        if crate::contrast::parse_hex(value).is_none() {
            *value = first_hex(value).unwrap_or_else(|| "#1f2937".to_string());
        }
    }

    for slot in ["heading", "body"] {
        blueprint
            .typography
            .entry(slot.to_string())
            .or_insert_with(|| DEFAULT_FONT.to_string());
    }
    for value in blueprint.typography.values_mut() {
        let cut = value
            .find('—')
            .or_else(|| value.find(" - "))
            .unwrap_or(value.len());
        *value = value[..cut].trim().to_string();
        if value.is_empty() {
            *value = DEFAULT_FONT.to_string();
        }
    }

    if blueprint.site_name.trim().is_empty() {
        blueprint.site_name = brief.business_name.clone();
    }
    if blueprint.tagline.trim().is_empty() {
        blueprint.tagline = brief.goals.clone();
    }
    if blueprint.brand_voice.trim().is_empty() {
        blueprint.brand_voice = format!("professional, approachable, rooted in {}", brief.niche);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brief() -> ClientBrief {
        ClientBrief {
            business_name: "Sunrise Bakery".into(),
            niche: "artisan bread".into(),
            goals: "bring in more weekend customers".into(),
            contact_email: None,
            existing_site: None,
            brand_notes: None,
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("About Us"), "about-us");
        assert_eq!(slugify("  FAQ & Pricing!  "), "faq-pricing");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_sanitize_derives_missing_slugs() {
        let mut bp = Blueprint {
            site_name: String::new(),
            tagline: String::new(),
            brand_voice: String::new(),
            colors: Default::default(),
            typography: Default::default(),
            pages: vec![
                PageSpec {
                    slug: String::new(),
                    title: "Our Story".into(),
                    nav_label: String::new(),
                    purpose: String::new(),
                },
                PageSpec {
                    slug: "Contact Page".into(),
                    title: "Contact".into(),
                    nav_label: "Contact".into(),
                    purpose: String::new(),
                },
            ],
        };
        sanitize_blueprint(&mut bp, &brief());
        assert_eq!(bp.pages[0].slug, "our-story");
        assert_eq!(bp.pages[0].nav_label, "Our Story");
        assert_eq!(bp.pages[1].slug, "contact-page");
    }

    #[test]
    fn test_sanitize_disambiguates_duplicate_slugs() {
        let page = |title: &str| PageSpec {
            slug: String::new(),
            title: title.into(),
            nav_label: String::new(),
            purpose: String::new(),
        };
        let mut bp = Blueprint {
            site_name: "x".into(),
            tagline: "x".into(),
            brand_voice: "x".into(),
            colors: Default::default(),
            typography: Default::default(),
            pages: vec![page("Menu"), page("Menu!"), page("menu")],
        };
        sanitize_blueprint(&mut bp, &brief());
        let slugs: Vec<&str> = bp.pages.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["menu", "menu-2", "menu-3"]);
    }

    #[test]
    fn test_sanitize_reduces_colors_to_hex() {
        let mut bp = Blueprint {
            site_name: "x".into(),
            tagline: "x".into(),
            brand_voice: "x".into(),
            colors: [
                ("primary".to_string(), "a warm blue like #3B82F6 maybe".to_string()),
                ("accent".to_string(), "golden sunshine".to_string()),
            ]
            .into(),
            typography: Default::default(),
            pages: vec![PageSpec {
                slug: "home".into(),
                title: "Home".into(),
                nav_label: "Home".into(),
                purpose: String::new(),
            }],
        };
        sanitize_blueprint(&mut bp, &brief());
        assert_eq!(bp.colors["primary"], "#3b82f6");
        // No hex present: per-slot default wins.
        assert_eq!(bp.colors["accent"], "#f59e0b");
        // Missing slots are filled in.
        assert_eq!(bp.colors["background"], "#ffffff");
    }

    #[test]
    fn test_sanitize_truncates_typography_rationale() {
        let mut bp = Blueprint {
            site_name: "x".into(),
            tagline: "x".into(),
            brand_voice: "x".into(),
            colors: Default::default(),
            typography: [
                ("heading".to_string(), "Playfair Display — elegant serif for headlines".to_string()),
                ("body".to_string(), "Lato - friendly and readable".to_string()),
            ]
            .into(),
            pages: vec![PageSpec {
                slug: "home".into(),
                title: "Home".into(),
                nav_label: "Home".into(),
                purpose: String::new(),
            }],
        };
        sanitize_blueprint(&mut bp, &brief());
        assert_eq!(bp.typography["heading"], "Playfair Display");
        assert_eq!(bp.typography["body"], "Lato");
    }

    #[test]
    fn test_sanitize_defaults_top_level_from_brief() {
        let mut bp = Blueprint {
            site_name: String::new(),
            tagline: String::new(),
            brand_voice: String::new(),
            colors: Default::default(),
            typography: Default::default(),
            pages: vec![PageSpec {
                slug: "home".into(),
                title: "Home".into(),
                nav_label: "Home".into(),
                purpose: String::new(),
            }],
        };
        sanitize_blueprint(&mut bp, &brief());
        assert_eq!(bp.site_name, "Sunrise Bakery");
        assert!(!bp.tagline.is_empty());
        assert!(bp.brand_voice.contains("artisan bread"));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let mut bp = Blueprint {
            site_name: String::new(),
            tagline: String::new(),
            brand_voice: String::new(),
            colors: [("primary".to_string(), "deep navy #102a43".to_string())].into(),
            typography: Default::default(),
            pages: vec![PageSpec {
                slug: String::new(),
                title: "Home Page".into(),
                nav_label: String::new(),
                purpose: String::new(),
            }],
        };
        sanitize_blueprint(&mut bp, &brief());
        let once = bp.clone();
        sanitize_blueprint(&mut bp, &brief());
        assert_eq!(serde_json::to_value(&bp).unwrap(), serde_json::to_value(&once).unwrap());
    }

    #[test]
    fn test_filename_for_home_and_others() {
        assert_eq!(filename_for("home", "home"), "index.html");
        assert_eq!(filename_for("about", "home"), "about.html");
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Stalled.is_terminal());
    }
}

//! Creative direction, design system, and per-page generation.
//!
//! Failure policy per stage: creative direction degrades to the default
//! spec, a missing design-system field is fatal, a failed page falls back
//! to a deterministic static page for that slug only, and a failed polish
//! keeps the pre-polish page.

use serde_json::json;
use tracing::{info, warn};

use crate::contrast;
use crate::extract;
use crate::gateway::{AiGateway, ChatMessage};
use crate::model::{
    filename_for, ArtifactStatus, Blueprint, CreativeSpec, DesignSystem, PageArtifact, PageSpec,
};
use crate::observer::SharedObserver;
use crate::pipeline::StageError;
use crate::prompts;

/// Minimum body-text contrast ratio the design system ships with.
const MIN_TEXT_CONTRAST: f64 = 4.5;

/// Ask for creative direction. Any failure yields the fixed default.
pub async fn generate_creative(
    gateway: &AiGateway,
    blueprint: &Blueprint,
    observer: &SharedObserver,
) -> CreativeSpec {
    let prompt = format!(
        "Blueprint:\n{}\n\nGive the creative direction.",
        serde_json::to_string_pretty(blueprint).unwrap_or_default()
    );
    let parsed = match gateway
        .generate(
            &[
                ChatMessage::system(prompts::CREATIVE_PREAMBLE),
                ChatMessage::user(prompt),
            ],
            0.8,
            2048,
            None,
        )
        .await
    {
        Ok(raw) => extract::extract_json(&raw)
            .ok()
            .and_then(|v| serde_json::from_value::<CreativeSpec>(v).ok()),
        Err(e) => {
            warn!(error = %e, "creative direction call failed");
            None
        }
    };

    match parsed {
        Some(spec) => {
            observer.on_log("creative direction settled");
            spec
        }
        None => {
            observer.on_log("creative direction fell back to default");
            CreativeSpec::default()
        }
    }
}

/// Generate the design system. Missing required fields are fatal; colors
/// that fail contrast are auto-corrected in both the blueprint and the
/// emitted CSS.
pub async fn generate_design_system(
    gateway: &AiGateway,
    blueprint: &mut Blueprint,
    creative: &CreativeSpec,
) -> Result<DesignSystem, StageError> {
    let prompt = format!(
        "Blueprint:\n{}\n\nCreative direction:\n{}\n\nProduce the design system.",
        serde_json::to_string_pretty(blueprint).unwrap_or_default(),
        serde_json::to_string_pretty(creative).unwrap_or_default(),
    );
    let raw = gateway
        .generate(
            &[
                ChatMessage::system(prompts::DESIGN_SYSTEM_PREAMBLE),
                ChatMessage::user(prompt),
            ],
            0.5,
            8192,
            None,
        )
        .await
        .map_err(|e| StageError::fatal_design(format!("design-system call failed: {e}")))?;

    let value = extract::extract_json(&raw)
        .map_err(|e| StageError::fatal_design(format!("design-system output unusable: {e}")))?;
    let mut design: DesignSystem = serde_json::from_value(value)
        .map_err(|e| StageError::fatal_design(format!("design-system missing field: {e}")))?;

    for (field, value) in [
        ("theme_css", &design.theme_css),
        ("font_stylesheet_url", &design.font_stylesheet_url),
        ("nav_html", &design.nav_html),
        ("footer_html", &design.footer_html),
    ] {
        if value.trim().is_empty() {
            return Err(StageError::fatal_design(format!(
                "design-system field {field} is empty"
            )));
        }
    }

    correct_contrast(blueprint, &mut design);
    Ok(design)
}

/// Darken foreground slots that fail contrast against the background and
/// substitute the corrected hexes into the emitted CSS.
fn correct_contrast(blueprint: &mut Blueprint, design: &mut DesignSystem) {
    let background = blueprint
        .colors
        .get("background")
        .cloned()
        .unwrap_or_else(|| "#ffffff".to_string());

    for slot in ["text", "primary"] {
        let Some(current) = blueprint.colors.get(slot).cloned() else {
            continue;
        };
        if contrast::passes_contrast(&current, &background, MIN_TEXT_CONTRAST) {
            continue;
        }
        let corrected = contrast::darken_until_contrast(&current, &background, MIN_TEXT_CONTRAST);
        info!(slot, from = %current, to = %corrected, "auto-corrected contrast");
        design.theme_css = design.theme_css.replace(&current, &corrected);
        blueprint.colors.insert(slot.to_string(), corrected);
    }
}

/// Generate one page, falling back to a deterministic static page when the
/// model cannot produce a usable document.
pub async fn generate_page(
    gateway: &AiGateway,
    blueprint: &Blueprint,
    creative: &CreativeSpec,
    design: &DesignSystem,
    page: &PageSpec,
    observer: &SharedObserver,
) -> PageArtifact {
    let home_slug = blueprint.home_slug().unwrap_or_default().to_string();
    let prompt = format!(
        "Site: {} — {}\nBrand voice: {}\nPage: {} ({})\nPurpose: {}\n\
         Hero treatment: {}\nMotion: {}\n\nShared head:\n{}\n\nNav:\n{}\n\nFooter:\n{}",
        blueprint.site_name,
        blueprint.tagline,
        blueprint.brand_voice,
        page.title,
        page.slug,
        page.purpose,
        creative.hero_treatment,
        creative.motion,
        design.shared_head(),
        design.nav_html,
        design.footer_html,
    );

    let html = match gateway
        .generate(
            &[
                ChatMessage::system(prompts::PAGE_PREAMBLE),
                ChatMessage::user(prompt),
            ],
            0.7,
            8192,
            None,
        )
        .await
    {
        Ok(raw) => extract::extract_html(&raw).ok().filter(|html| {
            let lower = html.to_ascii_lowercase();
            lower.contains("<!doctype") || lower.contains("<html")
        }),
        Err(e) => {
            warn!(slug = %page.slug, error = %e, "page generation call failed");
            None
        }
    };

    match html {
        Some(html) => {
            observer.on_event(
                "page_generated",
                json!({ "slug": page.slug, "bytes": html.len() }),
            );
            PageArtifact::new(&page.slug, &home_slug, ArtifactStatus::Generated, html)
        }
        None => {
            warn!(slug = %page.slug, "using fallback page");
            observer.on_event("page_fallback", json!({ "slug": page.slug }));
            let html = fallback_page(blueprint, design, page, &home_slug);
            PageArtifact::new(&page.slug, &home_slug, ArtifactStatus::Fallback, html)
        }
    }
}

/// Deterministic static page used when generation fails for a slug.
pub fn fallback_page(
    blueprint: &Blueprint,
    design: &DesignSystem,
    page: &PageSpec,
    home_slug: &str,
) -> String {
    let purpose = if page.purpose.trim().is_empty() {
        blueprint.tagline.clone()
    } else {
        page.purpose.clone()
    };
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title} — {site}</title>\n{head}\n</head>\n<body>\n{nav}\n\
         <main>\n<section class=\"hero\">\n<h1>{title}</h1>\n<p>{purpose}</p>\n\
         <p><a class=\"button\" href=\"{home}\">Back to home</a></p>\n</section>\n</main>\n\
         {footer}\n</body>\n</html>\n",
        title = page.title,
        site = blueprint.site_name,
        head = design.shared_head(),
        nav = design.nav_html,
        footer = design.footer_html,
        home = filename_for(home_slug, home_slug),
    )
}

/// Visual polish pass. Invalid output keeps the pre-polish page.
pub async fn polish_page(gateway: &AiGateway, artifact: &mut PageArtifact) -> bool {
    let prompt = format!("Page ({}):\n{}", artifact.filename, artifact.html);
    let raw = match gateway
        .generate(
            &[
                ChatMessage::system(prompts::POLISH_PREAMBLE),
                ChatMessage::user(prompt),
            ],
            0.4,
            8192,
            None,
        )
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(slug = %artifact.slug, error = %e, "polish call failed, keeping page");
            return false;
        }
    };

    match extract::extract_html(&raw) {
        Ok(html)
            if html.to_ascii_lowercase().contains("<html")
                && html.len() >= artifact.html.len() / 2 =>
        {
            artifact.html = html;
            artifact.bytes = artifact.html.len();
            true
        }
        _ => {
            warn!(slug = %artifact.slug, "polish output invalid, keeping page");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClientBrief;

    fn blueprint() -> Blueprint {
        let mut bp = Blueprint {
            site_name: "Sunrise Bakery".into(),
            tagline: "Fresh bread daily".into(),
            brand_voice: "warm".into(),
            colors: Default::default(),
            typography: Default::default(),
            pages: vec![
                PageSpec {
                    slug: "home".into(),
                    title: "Home".into(),
                    nav_label: "Home".into(),
                    purpose: "welcome".into(),
                },
                PageSpec {
                    slug: "menu".into(),
                    title: "Menu".into(),
                    nav_label: "Menu".into(),
                    purpose: "show the goods".into(),
                },
            ],
        };
        let brief = ClientBrief {
            business_name: "Sunrise Bakery".into(),
            niche: "bakery".into(),
            goals: "more customers".into(),
            contact_email: None,
            existing_site: None,
            brand_notes: None,
        };
        crate::model::sanitize_blueprint(&mut bp, &brief);
        bp
    }

    fn design() -> DesignSystem {
        DesignSystem {
            theme_css: ":root { --text: #9ca3af; --bg: #ffffff; }".into(),
            font_stylesheet_url: "https://fonts.example/css".into(),
            nav_html: "<nav><a href=\"index.html\">Home</a></nav>".into(),
            footer_html: "<footer>© Sunrise Bakery</footer>".into(),
        }
    }

    #[test]
    fn test_correct_contrast_rewrites_css() {
        let mut bp = blueprint();
        bp.colors.insert("text".into(), "#9ca3af".into());
        bp.colors.insert("background".into(), "#ffffff".into());
        let mut ds = design();

        correct_contrast(&mut bp, &mut ds);

        let corrected = &bp.colors["text"];
        assert!(crate::contrast::passes_contrast(
            corrected,
            "#ffffff",
            MIN_TEXT_CONTRAST
        ));
        assert!(ds.theme_css.contains(corrected.as_str()));
        assert!(!ds.theme_css.contains("#9ca3af"));
    }

    #[test]
    fn test_correct_contrast_leaves_passing_colors() {
        let mut bp = blueprint();
        bp.colors.insert("text".into(), "#1f2937".into());
        let mut ds = design();
        let css_before = ds.theme_css.clone();
        correct_contrast(&mut bp, &mut ds);
        assert_eq!(ds.theme_css, css_before);
    }

    #[test]
    fn test_fallback_page_is_complete_document() {
        let bp = blueprint();
        let ds = design();
        let html = fallback_page(&bp, &ds, &bp.pages[1], "home");
        let lower = html.to_ascii_lowercase();
        assert!(lower.contains("<!doctype html>"));
        assert!(html.contains("<main>"));
        assert!(html.contains("Menu"));
        assert!(html.contains(&ds.nav_html));
        assert!(html.contains(&ds.footer_html));
        assert!(html.contains("href=\"index.html\""));
    }
}

//! Site assembly — nav stitching, script injection, sitemap, robots,
//! 404 page, hero image references, and internal-link validation.
//!
//! Everything here is deterministic string work over the generated
//! artifacts. Link-validation findings are reported, never fatal.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::model::{Blueprint, DesignSystem, PageArtifact};

/// Marker id on the injected scroll script so re-assembly stays idempotent.
const SCROLL_SCRIPT_ID: &str = "sw-scroll-reveal";

fn href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("href=\"([^\"]+)\"").unwrap())
}

/// Mark each page's own nav entry with `aria-current="page"`.
pub fn stitch_navigation(pages: &mut [PageArtifact]) {
    for page in pages.iter_mut() {
        let own = format!("href=\"{}\"", page.filename);
        if page.html.contains("aria-current=\"page\"") {
            continue;
        }
        let marked = format!("{own} aria-current=\"page\"");
        // Only the first occurrence: that is the nav link; body links to
        // self are unusual and harmless to leave alone.
        if let Some(idx) = page.html.find(&own) {
            page.html.replace_range(idx..idx + own.len(), &marked);
            page.bytes = page.html.len();
        }
    }
}

/// Append the scroll-reveal script before `</body>` unless present.
pub fn inject_scroll_script(page: &mut PageArtifact) {
    if page.html.contains(SCROLL_SCRIPT_ID) {
        return;
    }
    let script = format!(
        "<script id=\"{SCROLL_SCRIPT_ID}\">\n\
         document.addEventListener('DOMContentLoaded',function(){{\n\
         var obs=new IntersectionObserver(function(es){{es.forEach(function(e){{\n\
         if(e.isIntersecting)e.target.classList.add('visible');}});}},{{threshold:0.1}});\n\
         document.querySelectorAll('main section').forEach(function(s){{obs.observe(s);}});\n\
         }});\n</script>"
    );
    if let Some(idx) = page.html.rfind("</body>") {
        page.html.insert_str(idx, &script);
    } else {
        page.html.push_str(&script);
    }
    page.bytes = page.html.len();
}

/// Reference downloaded hero images from their pages.
///
/// Inserts an `<img>` after the first heading inside `<main>` for any slug
/// with a fetched hero that the page does not already reference.
pub fn apply_hero_images(pages: &mut [PageArtifact], heroes: &BTreeMap<String, String>) {
    for page in pages.iter_mut() {
        let Some(relative) = heroes.get(&page.slug) else {
            continue;
        };
        if page.html.contains(relative.as_str()) {
            continue;
        }
        let img = format!("\n<img class=\"hero-image\" src=\"{relative}\" alt=\"\">");
        let insert_at = page
            .html
            .find("</h1>")
            .map(|idx| idx + "</h1>".len())
            .or_else(|| page.html.find("<main").and_then(|m| {
                page.html[m..].find('>').map(|gt| m + gt + 1)
            }));
        if let Some(idx) = insert_at {
            page.html.insert_str(idx, &img);
            page.bytes = page.html.len();
        }
    }
}

/// Sitemap over every page, home URL first.
pub fn sitemap_xml(pages: &[PageArtifact], base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for page in pages {
        let loc = if page.filename == "index.html" {
            format!("{base}/")
        } else {
            format!("{base}/{}", page.filename)
        };
        out.push_str(&format!("  <url><loc>{loc}</loc></url>\n"));
    }
    out.push_str("</urlset>\n");
    out
}

pub fn robots_txt(base_url: &str) -> String {
    format!(
        "User-agent: *\nAllow: /\n\nSitemap: {}/sitemap.xml\n",
        base_url.trim_end_matches('/')
    )
}

/// Deterministic 404 page in the site's own chrome.
pub fn not_found_page(blueprint: &Blueprint, design: &DesignSystem) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Page not found — {site}</title>\n{head}\n</head>\n<body>\n{nav}\n\
         <main>\n<section>\n<h1>Page not found</h1>\n\
         <p>That page does not exist. <a href=\"index.html\">Head back home.</a></p>\n\
         </section>\n</main>\n{footer}\n</body>\n</html>\n",
        site = blueprint.site_name,
        head = design.shared_head(),
        nav = design.nav_html,
        footer = design.footer_html,
    )
}

/// Check that every internal link resolves to a generated file.
///
/// Returns human-readable issues; the caller logs them and moves on.
pub fn validate_internal_links(pages: &[PageArtifact]) -> Vec<String> {
    let mut known: Vec<&str> = pages.iter().map(|p| p.filename.as_str()).collect();
    known.extend(["404.html", "sitemap.xml", "robots.txt"]);

    let mut issues = Vec::new();
    for page in pages {
        for captures in href_regex().captures_iter(&page.html) {
            let target = &captures[1];
            if target.starts_with("http://")
                || target.starts_with("https://")
                || target.starts_with("mailto:")
                || target.starts_with('#')
                || target.starts_with("tel:")
            {
                continue;
            }
            let file = target.split(['#', '?']).next().unwrap_or(target);
            if file.is_empty() || !file.ends_with(".html") {
                continue;
            }
            if !known.contains(&file) {
                issues.push(format!("{}: broken internal link to {file}", page.filename));
            }
        }
    }
    issues
}

/// Materialize the full site layout into `site_dir`.
pub async fn write_site(
    site_dir: &Path,
    pages: &[PageArtifact],
    blueprint: &Blueprint,
    design: &DesignSystem,
    base_url: &str,
) -> Result<()> {
    for page in pages {
        tokio::fs::write(site_dir.join(&page.filename), &page.html)
            .await
            .with_context(|| format!("writing {}", page.filename))?;
    }
    tokio::fs::write(site_dir.join("sitemap.xml"), sitemap_xml(pages, base_url))
        .await
        .context("writing sitemap.xml")?;
    tokio::fs::write(site_dir.join("robots.txt"), robots_txt(base_url))
        .await
        .context("writing robots.txt")?;
    tokio::fs::write(site_dir.join("404.html"), not_found_page(blueprint, design))
        .await
        .context("writing 404.html")?;
    debug!(pages = pages.len(), dir = %site_dir.display(), "site written");
    Ok(())
}

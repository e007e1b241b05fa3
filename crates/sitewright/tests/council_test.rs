//! Council convergence behavior with a scripted provider.

mod common;

use std::sync::Arc;

use common::{ScriptedProvider, SharedProvider};
use sitewright::council::{run_council, CouncilConfig, CouncilError};
use sitewright::gateway::AiGateway;
use sitewright::model::ClientBrief;
use sitewright::observer;

fn brief() -> ClientBrief {
    ClientBrief {
        business_name: "Sunrise Bakery".into(),
        niche: "artisan bread".into(),
        goals: "more weekend customers".into(),
        contact_email: None,
        existing_site: None,
        brand_notes: None,
    }
}

fn config(max_rounds: u32) -> CouncilConfig {
    CouncilConfig {
        max_rounds,
        ..CouncilConfig::default()
    }
}

const BLUEPRINT_V1: &str = r##"{
  "site_name": "Sunrise Bakery",
  "tagline": "Fresh bread, every morning",
  "brand_voice": "warm and neighborly",
  "colors": {"primary": "#2563eb", "background": "#ffffff", "text": "#1f2937"},
  "typography": {"heading": "Playfair Display", "body": "Lato"},
  "pages": [
    {"slug": "home", "title": "Home", "nav_label": "Home", "purpose": "welcome"},
    {"title": "Our Story", "nav_label": "Story", "purpose": "history"}
  ]
}"##;

const BLUEPRINT_V2: &str = r#"{
  "site_name": "Sunrise Bakery Revised",
  "tagline": "Fresh bread, every morning",
  "brand_voice": "warm and neighborly",
  "pages": [
    {"slug": "home", "title": "Home", "nav_label": "Home", "purpose": "welcome"}
  ]
}"#;

const APPROVE: &str = r#"{"score": 8.5, "approved": true, "issues": []}"#;
const REJECT: &str = r#"{"score": 4.0, "approved": false, "issues": [
  {"severity": "blocking", "message": "no contact page"}
]}"#;

#[tokio::test]
async fn approval_on_round_one_stops_the_debate() {
    let provider = Arc::new(ScriptedProvider::new(vec![BLUEPRINT_V1, APPROVE]));
    let gateway = AiGateway::with_provider(Box::new(SharedProvider(provider.clone())), 0);

    let outcome = run_council(&gateway, &brief(), None, &config(3), &observer::noop())
        .await
        .unwrap();

    assert!(outcome.approved);
    assert_eq!(outcome.rounds, 1);
    // Exactly one strategist call and one critic call; no further proposals.
    assert_eq!(provider.call_count(), 2);
    assert_eq!(outcome.blueprint.site_name, "Sunrise Bakery");
    // Validation derived the missing slug.
    assert_eq!(outcome.blueprint.pages[1].slug, "our-story");
}

#[tokio::test]
async fn round_exhaustion_ships_the_last_proposal() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        BLUEPRINT_V1,
        REJECT,
        BLUEPRINT_V2,
        REJECT,
    ]));
    let gateway = AiGateway::with_provider(Box::new(SharedProvider(provider.clone())), 0);

    let outcome = run_council(&gateway, &brief(), None, &config(2), &observer::noop())
        .await
        .unwrap();

    // Unapproved but shipped anyway.
    assert!(!outcome.approved);
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.blueprint.site_name, "Sunrise Bakery Revised");
    assert_eq!(provider.call_count(), 4);
}

#[tokio::test]
async fn unparseable_strategist_round_keeps_prior_proposal() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        BLUEPRINT_V1,
        REJECT,
        "I am not able to produce a blueprint right now.",
        APPROVE,
    ]));
    let gateway = AiGateway::with_provider(Box::new(SharedProvider(provider.clone())), 0);

    let outcome = run_council(&gateway, &brief(), None, &config(2), &observer::noop())
        .await
        .unwrap();

    // Round 2's proposal was unusable; the critic approved round 1's.
    assert!(outcome.approved);
    assert_eq!(outcome.blueprint.site_name, "Sunrise Bakery");
}

#[tokio::test]
async fn strategist_outage_ships_the_held_blueprint() {
    // Round 1 materializes a blueprint; the round-2 strategist call errors
    // (exhausted script). The debate ends with what it has instead of
    // failing the build.
    let provider = Arc::new(ScriptedProvider::new(vec![BLUEPRINT_V1, REJECT]));
    let gateway = AiGateway::with_provider(Box::new(SharedProvider(provider.clone())), 0);

    let outcome = run_council(&gateway, &brief(), None, &config(2), &observer::noop())
        .await
        .unwrap();

    assert!(!outcome.approved);
    assert_eq!(outcome.blueprint.site_name, "Sunrise Bakery");
    // Strategist + critic in round 1, then the failed round-2 proposal call.
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn round_one_gateway_error_is_fatal() {
    // No blueprint ever materialized; nothing to ship best-effort.
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let gateway = AiGateway::with_provider(Box::new(SharedProvider(provider)), 0);

    let err = run_council(&gateway, &brief(), None, &config(2), &observer::noop())
        .await
        .unwrap_err();
    assert!(matches!(err, CouncilError::Gateway(_)));
}

#[tokio::test]
async fn no_pages_ever_is_invalid_blueprint() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        r#"{"site_name": "Empty", "pages": []}"#,
        r#"{"site_name": "Still Empty", "pages": []}"#,
    ]));
    let gateway = AiGateway::with_provider(Box::new(SharedProvider(provider)), 0);

    let err = run_council(&gateway, &brief(), None, &config(2), &observer::noop())
        .await
        .unwrap_err();
    assert!(matches!(err, CouncilError::InvalidBlueprint { rounds: 2, .. }));
}

#[tokio::test]
async fn sanitation_applies_to_the_shipped_blueprint() {
    let raw = r#"{
      "site_name": "",
      "colors": {"primary": "a calm blue, roughly #0ea5e9", "accent": "sunny"},
      "typography": {"heading": "Inter — modern and clean"},
      "pages": [{"title": "Home & Welcome"}]
    }"#;
    let provider = Arc::new(ScriptedProvider::new(vec![raw, APPROVE]));
    let gateway = AiGateway::with_provider(Box::new(SharedProvider(provider)), 0);

    let outcome = run_council(&gateway, &brief(), None, &config(1), &observer::noop())
        .await
        .unwrap();

    let bp = &outcome.blueprint;
    assert_eq!(bp.site_name, "Sunrise Bakery");
    assert_eq!(bp.pages[0].slug, "home-welcome");
    assert_eq!(bp.colors["primary"], "#0ea5e9");
    assert_eq!(bp.colors["accent"], "#f59e0b");
    assert_eq!(bp.typography["heading"], "Inter");
}

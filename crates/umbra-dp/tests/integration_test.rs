//! Integration tests for the replacement engine
//!
//! Exercises the public surface end to end: configuration loading, taxonomy
//! and embedding files, replacement under the spend policies, and the budget
//! reporting helpers.

use std::io::Write;
use tempfile::{NamedTempFile, TempDir};
use umbra_core::AppConfig;
use umbra_dp::{
    BudgetEventKind, ClusterIndex, CompositionKind, DpError, NoiseMechanism, QueryCost,
    ReplacementEngine, ReplacementMethod, SpendPolicy, Taxonomy,
};

fn engine_with_seed(seed: u64) -> ReplacementEngine {
    ReplacementEngine::builder()
        .index(ClusterIndex::new())
        .spend_policy(SpendPolicy::Manual)
        .seed(seed)
        .build()
        .expect("build engine")
}

#[test]
fn test_find_candidates_for_known_country() {
    let engine = engine_with_seed(1);
    let candidates = engine.find_candidates("canada").expect("candidates");

    assert_eq!(candidates.len(), 13);
    assert_eq!(candidates[0], "America");
    assert!(!candidates.iter().any(|c| c.eq_ignore_ascii_case("canada")));
}

#[test]
fn test_replacement_flow_with_context() {
    let mut engine = engine_with_seed(2);

    let replacement = engine
        .suggest("Doctor", Some("the patient saw a specialist at the hospital"))
        .expect("suggest");

    match replacement.method {
        ReplacementMethod::Exponential {
            probability,
            candidates,
        } => {
            assert!(probability > 0.0 && probability <= 1.0);
            assert_eq!(candidates, 11);
        }
        ReplacementMethod::Censored { .. } => panic!("professions have candidates"),
    }
    assert_ne!(replacement.text, "Doctor");
}

#[test]
fn test_budget_lifecycle() {
    let mut engine = engine_with_seed(3);

    engine.spend(0.4);
    engine.spend(0.4);
    assert!((engine.budget_status().epsilon - 0.2).abs() < 1e-12);

    engine.spend(5.0);
    assert!(engine.budget_status().is_exhausted());
    assert_eq!(engine.replace("Canada", None).expect("replace"), "******");

    engine.reset(1.5);
    assert!((engine.budget_status().epsilon - 1.5).abs() < f64::EPSILON);
    assert_ne!(engine.replace("Canada", None).expect("replace"), "******");

    let kinds: Vec<_> = engine.ledger().history().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            BudgetEventKind::Spent { amount: 0.4 },
            BudgetEventKind::Spent { amount: 0.4 },
            BudgetEventKind::Spent { amount: 5.0 },
            BudgetEventKind::Exhausted,
            BudgetEventKind::Reset { previous: 0.0 },
        ]
    );
}

#[test]
fn test_report_and_composition() {
    let engine = engine_with_seed(4);

    let report = engine.report();
    assert_eq!(report.mechanism, "Exponential Mechanism");
    assert_eq!(report.guarantee, "(1, 0.001)-differential privacy");
    assert!(!report.exhausted);

    let composed =
        engine.compose_basic(&[QueryCost::new(1.0, 0.01), QueryCost::new(2.0, 0.02)]);
    assert!((composed.epsilon - 3.0).abs() < 1e-12);
    assert!((composed.delta - 0.02).abs() < 1e-12);
    assert_eq!(composed.kind, CompositionKind::Basic);

    let advanced = engine
        .compose_advanced(&[QueryCost::new(0.1, 0.0); 10], 1e-5)
        .expect("valid delta prime");
    assert!((advanced.delta - (0.001 + 1e-5)).abs() < 1e-15);
    assert!(matches!(
        engine.compose_advanced(&[QueryCost::new(0.1, 0.0)], 1.0),
        Err(DpError::InvalidParameter { .. })
    ));
}

#[test]
fn test_numeric_perturbation() {
    let mut engine = engine_with_seed(5);

    let noisy = engine
        .perturb_numeric(42.0, 1.0, 1.0, None, NoiseMechanism::Laplace)
        .expect("laplace");
    assert!(noisy.is_finite());

    assert!(matches!(
        engine.perturb_numeric(42.0, 1.0, 1.0, Some(1.0), NoiseMechanism::Gaussian),
        Err(DpError::InvalidParameter { name: "delta", .. })
    ));

    // Noise never charges the budget
    assert!((engine.budget_status().epsilon - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_from_config_with_files() {
    let dir = TempDir::new().expect("create temp dir");

    let taxonomy_path = dir.path().join("taxonomy.toml");
    std::fs::write(
        &taxonomy_path,
        r#"
[[category]]
name = "planets"
members = ["Mercury", "Venus", "Earth", "Mars"]
"#,
    )
    .expect("write taxonomy");

    let mut embeddings = NamedTempFile::new().expect("create embeddings file");
    writeln!(embeddings, "2 2").expect("write header");
    writeln!(embeddings, "mars 1.0 0.0").expect("write vector");
    writeln!(embeddings, "venus 1.0 0.0").expect("write vector");

    let mut config = AppConfig::default();
    config.privacy.epsilon = 2.0;
    config.clustering.taxonomy_path = Some(taxonomy_path);
    config.clustering.embeddings_path = Some(embeddings.path().to_path_buf());
    config.replacement.seed = Some(9);
    config.replacement.mask_char = '#';

    let mut engine = ReplacementEngine::from_config(&config).expect("engine from config");
    assert!((engine.budget_status().epsilon - 2.0).abs() < f64::EPSILON);
    assert_eq!(
        engine.find_candidates("Mars").expect("candidates"),
        vec!["Mercury", "Venus", "Earth"]
    );

    let index = engine.index().expect("index attached");
    assert!((index.similarity("Mars", "Venus") - 1.0).abs() < 1e-12);

    // Unknown token with no lookalike is censored with the configured mask
    assert_eq!(engine.replace("Jupiter", None).expect("replace"), "#######");
}

#[test]
fn test_from_config_rejects_missing_taxonomy() {
    let mut config = AppConfig::default();
    config.clustering.taxonomy_path = Some("/nonexistent/taxonomy.toml".into());

    assert!(matches!(
        ReplacementEngine::from_config(&config),
        Err(DpError::Io(_))
    ));
}

#[test]
fn test_json_cluster_map() {
    let taxonomy = Taxonomy::from_json_str(r#"{"0": ["Oak", "Elm"], "1": ["Rose", "Lily"]}"#)
        .expect("parse json taxonomy");
    let index = ClusterIndex::from_taxonomy(taxonomy);

    assert_eq!(index.find_candidates("oak"), vec!["Elm"]);
    assert_eq!(index.category_of("Lily"), Some("1"));
}

#[test]
fn test_add_token_then_replace() {
    let mut engine = engine_with_seed(6);
    assert!(engine.add_token("Lavender", "colors").expect("index attached"));
    assert!(!engine.add_token("Lavender", "colors").expect("index attached"));
    assert!(!engine.add_token("Walnut", "trees").expect("index attached"));

    let stats = engine.cluster_stats().expect("stats");
    assert_eq!(stats["colors"], 15);
    assert!(engine
        .find_candidates("Red")
        .expect("candidates")
        .contains(&"Lavender".to_string()));
}

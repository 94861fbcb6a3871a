//! End-to-end calling scenarios (diploid, theta = 0.001, default priors).

use bayescall_lib::config::Config;
use bayescall_lib::site::{evaluate_site, SiteStatus, SkipReason};

use crate::helpers::{read_site, scenario_config, site_text};

fn evaluate(text: &str, config: &Config) -> SiteStatus {
    let site = read_site(text, config);
    evaluate_site(&site, config, false)
}

#[test]
fn test_pure_reference_site_emits_nothing() {
    let text = site_text("chr1", 100, "A", &[("s1", 'R', "A", 20, 30)]);
    let status = evaluate(&text, &scenario_config(0.0));
    assert!(matches!(status, SiteStatus::Skip(SkipReason::InsufficientAlternates)));
}

#[test]
fn test_clean_heterozygote() {
    let text =
        site_text("chr1", 100, "A", &[("s1", 'R', "A", 10, 30), ("s1", 'S', "T", 10, 30)]);
    let SiteStatus::Evaluated(eval) = evaluate(&text, &scenario_config(0.0)) else {
        panic!("expected evaluation");
    };
    assert!(eval.called);
    assert!(eval.p_var > 0.99, "pVar = {}", eval.p_var);
    assert!(eval.best_overall_combo_is_het);
    assert_eq!(eval.alternates[0].allele.base(), "T");
    assert_eq!(eval.sample_calls[0].genotype, "A/T");
}

#[test]
fn test_clean_homozygous_alternate() {
    let text = site_text("chr1", 100, "A", &[("s1", 'S', "G", 20, 30)]);
    let SiteStatus::Evaluated(eval) = evaluate(&text, &scenario_config(0.0)) else {
        panic!("expected evaluation");
    };
    assert!(eval.called);
    assert!(eval.p_var > 0.99, "pVar = {}", eval.p_var);
    assert_eq!(eval.alternates[0].allele.base(), "G");
    assert_eq!(eval.sample_calls[0].genotype, "G/G");
}

#[test]
fn test_low_frequency_variant_in_cohort() {
    let mut specs = Vec::new();
    for i in 0..9 {
        specs.push((format!("hom{i}"), 'R', "A", 20usize, 30u8));
    }
    specs.push(("het".to_string(), 'R', "A", 10, 30));
    specs.push(("het".to_string(), 'S', "C", 10, 30));
    let borrowed: Vec<(&str, char, &str, usize, u8)> =
        specs.iter().map(|(s, c, q, n, b)| (s.as_str(), *c, *q, *n, *b)).collect();
    let text = site_text("chr1", 100, "A", &borrowed);

    let SiteStatus::Evaluated(eval) = evaluate(&text, &scenario_config(0.0)) else {
        panic!("expected evaluation");
    };
    assert!(eval.called);

    // Best combo carries 19 reference alleles and one C
    assert_eq!(eval.alternates.len(), 1);
    assert_eq!(eval.alternates[0].allele.base(), "C");
    assert_eq!(eval.alternates[0].count, 1);

    // Only the het sample is called A/C
    for call in &eval.sample_calls {
        if call.name == "het" {
            assert_eq!(call.genotype, "A/C");
        } else {
            assert_eq!(call.genotype, "A/A");
        }
    }
}

#[test]
fn test_sub_threshold_site() {
    // One marginal alternate observation at quality 20
    let build = || {
        site_text("chr1", 100, "A", &[("s1", 'R', "A", 19, 20), ("s1", 'S', "G", 1, 20)])
    };

    let mut lax = scenario_config(0.0);
    lax.min_alt_count = 1;
    lax.min_alt_fraction = 0.0;

    let SiteStatus::Evaluated(eval) = evaluate(&build(), &lax) else {
        panic!("expected evaluation");
    };
    assert!(eval.called, "PVL = 0.0 calls every evaluated site");
    assert!(eval.p_var < 0.9, "pHom should dominate, pVar = {}", eval.p_var);

    let mut strict = lax.clone();
    strict.pvl = 0.9;
    let SiteStatus::Evaluated(eval) = evaluate(&build(), &strict) else {
        panic!("expected evaluation");
    };
    assert!(!eval.called, "no record at PVL = 0.9");
}

#[test]
fn test_em_consistency_on_two_sample_het() {
    let text = site_text(
        "chr1",
        100,
        "A",
        &[
            ("s1", 'R', "A", 10, 30),
            ("s1", 'S', "T", 10, 30),
            ("s2", 'R', "A", 10, 30),
            ("s2", 'S', "T", 10, 30),
        ],
    );

    let plain = scenario_config(0.0);
    let em = Config { expectation_maximization: true, ..plain.clone() };

    let SiteStatus::Evaluated(without_em) = evaluate(&text, &plain) else {
        panic!("expected evaluation");
    };
    let SiteStatus::Evaluated(with_em) = evaluate(&text, &em) else {
        panic!("expected evaluation");
    };

    // The call must agree even though posteriors may differ
    for eval in [&without_em, &with_em] {
        assert!(eval.called);
        for call in &eval.sample_calls {
            assert_eq!(call.genotype, "A/T");
        }
    }
    assert_eq!(without_em.best_overall_combo_is_het, with_em.best_overall_combo_is_het);
}

#[test]
fn test_pvl_monotonicity() {
    let build = || {
        site_text("chr1", 100, "A", &[("s1", 'R', "A", 12, 30), ("s1", 'S', "T", 8, 30)])
    };

    let mut previously_called = true;
    for pvl in [0.0, 0.5, 0.9, 0.999, 1.0] {
        let status = evaluate(&build(), &scenario_config(pvl));
        let called = matches!(status, SiteStatus::Evaluated(ref e) if e.called);
        // Raising the threshold can only turn calls off, never on
        assert!(previously_called || !called, "call set grew at PVL = {pvl}");
        previously_called = called;
    }
}

#[test]
fn test_determinism_across_runs() {
    let text = site_text(
        "chr1",
        100,
        "A",
        &[("s1", 'R', "A", 7, 31), ("s1", 'S', "T", 9, 28), ("s2", 'R', "A", 14, 33)],
    );
    let config = scenario_config(0.0);

    let SiteStatus::Evaluated(first) = evaluate(&text, &config) else {
        panic!("expected evaluation");
    };
    let SiteStatus::Evaluated(second) = evaluate(&text, &config) else {
        panic!("expected evaluation");
    };

    assert_eq!(first.p_var.to_bits(), second.p_var.to_bits());
    assert_eq!(first.p_hom.to_bits(), second.p_hom.to_bits());
    for (a, b) in first.sample_calls.iter().zip(&second.sample_calls) {
        assert_eq!(a.genotype, b.genotype);
        assert_eq!(a.log_marginal.to_bits(), b.log_marginal.to_bits());
    }
}

#[test]
fn test_indel_alternate() {
    let text =
        site_text("chr1", 100, "A", &[("s1", 'R', "A", 10, 30), ("s1", 'I', "GG", 10, 30)]);
    let SiteStatus::Evaluated(eval) = evaluate(&text, &scenario_config(0.0)) else {
        panic!("expected evaluation");
    };
    assert!(eval.called);
    assert_eq!(eval.alternates[0].allele.to_string(), "+GG");
    assert_eq!(eval.sample_calls[0].genotype, "A/GG");
}

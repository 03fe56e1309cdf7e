use bmc_chain::acceptance::{decide, AcceptanceCriterion};
use bmc_core::RngHandle;
use proptest::prelude::*;

#[test]
fn improvement_is_always_accepted() {
    let criterion = AcceptanceCriterion::new(1.0);
    let mut rng = RngHandle::from_seed(11);
    for _ in 0..1_000 {
        let decision = criterion.accept(-5.0, -4.999, 0.0, &mut rng);
        assert!(decision.accepted);
        assert!(decision.log_ratio > 0.0);
        assert_eq!(decision.coerced_log_ratio, 0.0);
    }
}

#[test]
fn impossible_proposal_is_never_accepted() {
    let criterion = AcceptanceCriterion::new(1.0);
    let mut rng = RngHandle::from_seed(3);
    for _ in 0..1_000 {
        let decision = criterion.accept(-5.0, f64::NEG_INFINITY, 0.0, &mut rng);
        assert!(!decision.accepted);
    }
}

#[test]
fn one_uniform_draw_per_decision() {
    let criterion = AcceptanceCriterion::new(1.0);
    let mut a = RngHandle::from_seed(99);
    let mut b = RngHandle::from_seed(99);
    criterion.accept(-1.0, -2.0, 0.0, &mut a);
    b.uniform();
    assert_eq!(a.state(), b.state());
}

proptest! {
    #[test]
    fn uphill_moves_accept_for_every_draw(
        old in -1e6f64..1e6,
        gain in 1e-9f64..1e3,
        u in 1e-12f64..1.0,
    ) {
        let criterion = AcceptanceCriterion::new(1.0);
        let log_ratio = criterion.log_ratio(old, old + gain, 0.0);
        prop_assert!(log_ratio > 0.0);
        prop_assert!(decide(log_ratio, u.ln()).accepted);
    }

    #[test]
    fn coerced_ratio_is_clamped(
        log_ratio in -1e3f64..1e3,
        u in 1e-12f64..1.0,
    ) {
        let decision = decide(log_ratio, u.ln());
        prop_assert!(decision.coerced_log_ratio <= 0.0);
        prop_assert_eq!(decision.coerced_log_ratio, log_ratio.min(0.0));
        prop_assert_eq!(decision.accepted, u.ln() < log_ratio);
    }

    #[test]
    fn same_draw_same_decision(seed in any::<u64>(), delta in -10.0f64..10.0) {
        let criterion = AcceptanceCriterion::new(0.7);
        let mut a = RngHandle::from_seed(seed);
        let mut b = RngHandle::from_seed(seed);
        let first = criterion.accept(0.0, delta, 0.1, &mut a);
        let second = criterion.accept(0.0, delta, 0.1, &mut b);
        prop_assert_eq!(first, second);
    }
}

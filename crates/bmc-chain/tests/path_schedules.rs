use bmc_chain::PathSchedule;
use proptest::prelude::*;

#[test]
fn linear_visits_evenly_spaced_values() {
    let thetas = PathSchedule::Linear.thetas(4).unwrap();
    assert_eq!(thetas, vec![1.0, 0.75, 0.5, 0.25, 0.0]);
}

#[test]
fn geometric_halves_then_drops_to_zero() {
    let thetas = PathSchedule::Geometric.thetas(4).unwrap();
    assert_eq!(thetas, vec![1.0, 0.5, 0.25, 0.125, 0.0]);
}

#[test]
fn beta_quantile_concentrates_near_prior() {
    let thetas = PathSchedule::BetaQuantile { alpha: 0.3 }.thetas(10).unwrap();
    assert_eq!(thetas[0], 1.0);
    assert_eq!(thetas[10], 0.0);
    // Most rungs sit close to theta = 0.
    assert!(thetas[5] < 0.2);
}

#[test]
fn fixed_path_is_used_verbatim() {
    let path = PathSchedule::Fixed {
        values: vec![1.0, 0.3, 0.05, 0.0],
    };
    assert_eq!(path.thetas(100).unwrap(), vec![1.0, 0.3, 0.05, 0.0]);
    let empty = PathSchedule::Fixed { values: Vec::new() };
    assert_eq!(empty.thetas(3).unwrap_err().code(), "empty-path");
}

#[test]
fn shapes_and_steps_are_validated() {
    let bad = PathSchedule::Beta {
        alpha: 0.0,
        beta: 1.0,
    };
    assert_eq!(bad.thetas(10).unwrap_err().code(), "path-shape");
    assert_eq!(
        PathSchedule::Linear.thetas(0).unwrap_err().code(),
        "path-steps"
    );
}

#[test]
fn yaml_selects_scheme_and_shapes() {
    let path: PathSchedule = serde_yaml::from_str("scheme: beta\nalpha: 0.3\n").unwrap();
    assert_eq!(
        path,
        PathSchedule::Beta {
            alpha: 0.3,
            beta: 0.5
        }
    );
    let path: PathSchedule = serde_yaml::from_str("scheme: one-sided-beta\n").unwrap();
    assert_eq!(path, PathSchedule::OneSidedBeta { beta: 0.5 });
}

proptest! {
    #[test]
    fn standard_paths_start_at_one_and_end_at_zero(steps in 1usize..200) {
        for path in [
            PathSchedule::Linear,
            PathSchedule::Geometric,
            PathSchedule::Beta { alpha: 0.3, beta: 1.0 },
            PathSchedule::OneSidedBeta { beta: 0.4 },
            PathSchedule::BetaQuantile { alpha: 0.3 },
            PathSchedule::Sigmoid { alpha: 2.0 },
        ] {
            let thetas = path.thetas(steps).unwrap();
            prop_assert_eq!(thetas.len(), steps + 1);
            prop_assert_eq!(thetas[0], 1.0);
            prop_assert_eq!(thetas[steps], 0.0);
            prop_assert!(thetas.iter().all(|t| (0.0..=1.0).contains(t)));
        }
    }

    #[test]
    fn beta_path_never_increases(steps in 2usize..120, alpha in 0.1f64..4.0, beta in 0.1f64..4.0) {
        let thetas = PathSchedule::Beta { alpha, beta }.thetas(steps).unwrap();
        for pair in thetas.windows(2) {
            prop_assert!(pair[1] <= pair[0] + 1e-12);
        }
    }
}

use bmc_chain::{ChainOptions, ChainRunner, OperatorSchedule, SimulationContext};
use bmc_core::{
    BmcError, Density, Operator, Parameter, PowerPosterior, RngHandle, SimulationState,
};
use criterion::{criterion_group, criterion_main, Criterion};

struct Gaussian;

impl Density for Gaussian {
    fn log_prior(&self, state: &SimulationState) -> Result<f64, BmcError> {
        Ok(state
            .parameters()
            .flat_map(|p| p.values().iter())
            .map(|v| -0.005 * v * v)
            .sum())
    }

    fn log_likelihood(&self, state: &SimulationState) -> Result<f64, BmcError> {
        Ok(state
            .parameters()
            .flat_map(|p| p.values().iter())
            .map(|v| -0.5 * (v - 1.0) * (v - 1.0))
            .sum())
    }
}

struct Walk {
    name: String,
    index: usize,
    log_window: f64,
}

impl Operator for Walk {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&mut self, state: &mut SimulationState, rng: &mut RngHandle) -> Result<f64, BmcError> {
        let window = self.log_window.exp();
        let parameter = state.parameter_mut("theta")?;
        let value = parameter.value(self.index)?;
        parameter.set_value(self.index, value + (rng.uniform() - 0.5) * 2.0 * window)?;
        Ok(0.0)
    }

    fn tunable(&self) -> Option<f64> {
        Some(self.log_window)
    }

    fn set_tunable(&mut self, value: f64) {
        self.log_window = value;
    }
}

fn context() -> SimulationContext {
    let mut state = SimulationState::new();
    state
        .add_parameter(Parameter::new("theta", vec![0.0; 8]))
        .unwrap();
    let mut schedule = OperatorSchedule::new();
    for index in 0..8 {
        schedule
            .add(
                Box::new(Walk {
                    name: format!("walk-{index}"),
                    index,
                    log_window: 0.0,
                }),
                1.0,
            )
            .unwrap();
    }
    SimulationContext::new(
        state,
        Box::new(PowerPosterior::new(Gaussian)),
        schedule,
        RngHandle::from_seed(42),
    )
}

fn bench_runner(c: &mut Criterion) {
    let options = ChainOptions::builder(10_000)
        .full_evaluation_count(1_000)
        .build()
        .unwrap();
    c.bench_function("runner_10k_steps", |b| {
        b.iter(|| {
            let mut ctx = context();
            let mut runner = ChainRunner::new(options.clone());
            runner.run(&mut ctx).unwrap();
        });
    });
}

criterion_group!(benches, bench_runner);
criterion_main!(benches);

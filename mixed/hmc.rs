//! NUTS sampling using mini-mcmc
//!
//! Any [`LogDensity`] is wrapped as a `GradientTarget`, so the No-U-Turn
//! sampler explores it with our analytical gradients and burn tensors only
//! appear at the boundary. All chains of one instance run in a single NUTS
//! run seeded from the instance seed. Each chain starts from its own random
//! point, and the first `warmup` draws of every chain are discarded while
//! the step size adapts.
//!
//! The sampler does not report divergent transitions, so fits are judged on
//! split R-hat and effective sample size alone.

use super::FitError;
use super::posterior::LogDensity;
use crate::shared::seeding::stream_rng;
use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use burn::tensor::TensorData;
use mini_mcmc::distributions::GradientTarget;
use mini_mcmc::nuts::NUTS;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Backend for NUTS. f64 keeps the Poisson likelihood precise.
pub type NutsBackend = Autodiff<NdArray<f64>>;

const INIT_ATTEMPTS: usize = 100;

/// Settings shared by every chain of every instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub chains: usize,
    /// Warm-up iterations per chain, discarded.
    pub warmup: usize,
    /// Retained draws per chain.
    pub draws: usize,
    pub target_accept: f64,
    pub seed: u64,
    /// R-hat above which a fit is flagged.
    pub rhat_threshold: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            chains: 4,
            warmup: 1000,
            draws: 1000,
            target_accept: 0.8,
            seed: 20_240_602,
            rhat_threshold: 1.05,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        let invalid = |reason: &str| Err(FitError::InvalidConfig(reason.to_string()));
        if self.chains == 0 {
            return invalid("at least one chain is required");
        }
        if self.draws < 4 {
            return invalid("at least four retained draws per chain are required");
        }
        if !(self.target_accept > 0.0 && self.target_accept < 1.0) {
            return invalid("target_accept must lie strictly between 0 and 1");
        }
        Ok(())
    }
}

/// The black-box seam between model fitting and posterior sampling.
pub trait PosteriorSampler: Sync {
    fn config(&self) -> &SamplerConfig;

    /// Runs every chain of one instance from `seed`. Returns the retained
    /// draws of each chain, shape `(draws, target.retained_dim())`.
    fn run_chains<T>(&self, target: &T, seed: u64) -> Result<Vec<Array2<f64>>, FitError>
    where
        T: LogDensity + Clone + Send + 'static;
}

/// A [`LogDensity`] seen through burn tensors.
#[derive(Clone)]
pub struct NutsTarget<T> {
    inner: T,
}

impl<T: LogDensity> NutsTarget<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    fn evaluate(&self, position: Tensor<NutsBackend, 1>) -> (f64, Array1<f64>) {
        match position.into_data().to_vec::<f64>() {
            Ok(values) => self.inner.logp_and_grad(&Array1::from_vec(values)),
            Err(_) => (f64::NEG_INFINITY, Array1::zeros(self.inner.dim())),
        }
    }
}

impl<T> GradientTarget<f64, NutsBackend> for NutsTarget<T>
where
    T: LogDensity + Clone + Send + 'static,
{
    fn unnorm_logp(&self, position: Tensor<NutsBackend, 1>) -> Tensor<NutsBackend, 1> {
        let device = position.device();
        let (logp, _) = self.evaluate(position);
        Tensor::<NutsBackend, 1>::from_data(TensorData::new(vec![logp], [1]), &device)
    }

    fn unnorm_logp_and_grad(
        &self,
        position: Tensor<NutsBackend, 1>,
    ) -> (Tensor<NutsBackend, 1>, Tensor<NutsBackend, 1>) {
        let device = position.device();
        let (logp, grad) = self.evaluate(position);
        let dim = grad.len();
        let logp_tensor = Tensor::<NutsBackend, 1>::from_data(TensorData::new(vec![logp], [1]), &device);
        let grad_tensor = Tensor::<NutsBackend, 1>::from_data(TensorData::new(grad.to_vec(), [dim]), &device);
        (logp_tensor, grad_tensor)
    }
}

#[derive(Clone, Debug, Default)]
pub struct NutsSampler {
    config: SamplerConfig,
}

impl NutsSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }
}

/// A random starting point of finite density for one chain.
fn initial_position<T: LogDensity>(target: &T, seed: u64, chain: usize) -> Result<Vec<f64>, FitError> {
    let mut rng = stream_rng(seed, &[chain as u64]);
    for _ in 0..INIT_ATTEMPTS {
        let theta = target.initial_point(&mut rng);
        let (logp, grad) = target.logp_and_grad(&theta);
        if logp.is_finite() && grad.iter().all(|g| g.is_finite()) {
            return Ok(theta.to_vec());
        }
    }
    Err(FitError::Initialisation {
        attempts: INIT_ATTEMPTS,
    })
}

impl PosteriorSampler for NutsSampler {
    fn config(&self) -> &SamplerConfig {
        &self.config
    }

    fn run_chains<T>(&self, target: &T, seed: u64) -> Result<Vec<Array2<f64>>, FitError>
    where
        T: LogDensity + Clone + Send + 'static,
    {
        let cfg = &self.config;
        let initial_positions = (0..cfg.chains)
            .map(|chain| initial_position(target, seed, chain))
            .collect::<Result<Vec<_>, _>>()?;

        let mut sampler = NUTS::<f64, NutsBackend, NutsTarget<T>>::new(
            NutsTarget::new(target.clone()),
            initial_positions,
            cfg.target_accept,
        )
        .set_seed(seed);
        let (samples, run_stats) = sampler
            .run_progress(cfg.draws, cfg.warmup)
            .map_err(|e| FitError::Sampler(e.to_string()))?;
        log::debug!("NUTS sampling complete: {}", run_stats);

        // [chains, draws, dim], row-major
        let shape = samples.dims();
        let (n_chains, n_draws, dim) = (shape[0], shape[1], shape[2]);
        let values: Vec<f64> = samples
            .into_data()
            .to_vec()
            .map_err(|e| FitError::Sampler(format!("{e:?}")))?;
        let kept = target.retained_dim();
        Ok((0..n_chains)
            .map(|chain| {
                Array2::from_shape_fn((n_draws, kept), |(i, j)| values[(chain * n_draws + i) * dim + j])
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::rngs::StdRng;

    /// Independent Gaussian with known means and scales.
    #[derive(Clone)]
    struct Gaussian {
        mean: Array1<f64>,
        sd: Array1<f64>,
    }

    impl LogDensity for Gaussian {
        fn dim(&self) -> usize {
            self.mean.len()
        }

        fn logp_and_grad(&self, theta: &Array1<f64>) -> (f64, Array1<f64>) {
            let z = (theta - &self.mean) / &self.sd;
            let logp = -0.5 * z.dot(&z);
            (logp, -(&z / &self.sd))
        }

        fn initial_point(&self, rng: &mut StdRng) -> Array1<f64> {
            (0..self.dim()).map(|_| rng.gen_range(-2.0..2.0)).collect()
        }
    }

    #[test]
    fn target_passes_analytical_gradient_through_tensors() {
        let target = NutsTarget::new(Gaussian {
            mean: ndarray::array![1.0, -1.0],
            sd: ndarray::array![0.5, 2.0],
        });
        let device = Default::default();
        let position = Tensor::<NutsBackend, 1>::from_data(TensorData::new(vec![2.0, 1.0], [2]), &device);
        let (logp, grad) = target.unnorm_logp_and_grad(position);
        let logp: Vec<f64> = logp.into_data().to_vec().unwrap();
        let grad: Vec<f64> = grad.into_data().to_vec().unwrap();
        // z = [2, 1] so logp = -0.5 * 5 and grad = -z / sd
        approx::assert_abs_diff_eq!(logp[0], -2.5, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(grad[0], -4.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(grad[1], -0.5, epsilon = 1e-12);
    }

    #[test]
    fn recovers_gaussian_moments_with_unequal_scales() {
        let target = Gaussian {
            mean: ndarray::array![1.0, -3.0],
            sd: ndarray::array![0.1, 4.0],
        };
        let sampler = NutsSampler::new(SamplerConfig {
            chains: 2,
            warmup: 500,
            draws: 1000,
            ..SamplerConfig::default()
        });
        let chains = sampler.run_chains(&target, 5).unwrap();
        assert_eq!(chains.len(), 2);
        let views: Vec<_> = chains.iter().map(|c| c.view()).collect();
        let draws = ndarray::concatenate(ndarray::Axis(0), &views).unwrap();
        assert_eq!(draws.dim(), (2000, 2));
        let mean = draws.mean_axis(ndarray::Axis(0)).unwrap();
        let sd = draws.std_axis(ndarray::Axis(0), 1.0);
        assert!((mean[0] - 1.0).abs() < 0.03, "mean {mean}");
        assert!((mean[1] + 3.0).abs() < 1.0, "mean {mean}");
        assert!((sd[0] - 0.1).abs() < 0.03, "sd {sd}");
        assert!((sd[1] - 4.0).abs() < 1.2, "sd {sd}");
    }

    #[test]
    fn same_seed_gives_same_chains() {
        let target = Gaussian {
            mean: ndarray::array![0.0],
            sd: ndarray::array![1.0],
        };
        let sampler = NutsSampler::new(SamplerConfig {
            chains: 2,
            warmup: 100,
            draws: 50,
            ..SamplerConfig::default()
        });
        let a = sampler.run_chains(&target, 9).unwrap();
        let b = sampler.run_chains(&target, 9).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].dim(), (50, 1));
    }

    #[test]
    fn every_start_outside_the_support_fails_initialisation() {
        #[derive(Clone)]
        struct Nowhere;
        impl LogDensity for Nowhere {
            fn dim(&self) -> usize {
                1
            }
            fn logp_and_grad(&self, _: &Array1<f64>) -> (f64, Array1<f64>) {
                (f64::NEG_INFINITY, Array1::zeros(1))
            }
            fn initial_point(&self, _: &mut StdRng) -> Array1<f64> {
                Array1::zeros(1)
            }
        }
        let err = NutsSampler::default().run_chains(&Nowhere, 1).unwrap_err();
        assert!(matches!(err, FitError::Initialisation { attempts: 100 }));
    }

    #[test]
    fn rejects_invalid_settings() {
        let bad = SamplerConfig {
            target_accept: 1.0,
            ..SamplerConfig::default()
        };
        assert!(bad.validate().is_err());
        assert!(SamplerConfig::default().validate().is_ok());
    }
}

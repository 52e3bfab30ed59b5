//! Detailed numerical stability tests for inference and training.
//!
//! Long sequences underflow the plain forward pass long before the scaled pass or the
//! log-space Viterbi decoder lose precision; these tests pin where each one is usable.

use assert_approx_eq::assert_approx_eq;
use hmm_engine::*;
use rand::prelude::*;

fn coin_model() -> HiddenMarkovModel {
    let mut hmm = HiddenMarkovModel::new_discrete(2, &[2]).unwrap();
    hmm.set_initial_probabilities(vec![0.6, 0.4], 1e-9).unwrap();
    hmm.set_transition_row(0, vec![0.7, 0.3], 1e-9).unwrap();
    hmm.set_transition_row(1, vec![0.4, 0.6], 1e-9).unwrap();
    let b0 = DiscreteDistribution::from_probabilities(vec![vec![0.9, 0.1]]).unwrap();
    let b1 = DiscreteDistribution::from_probabilities(vec![vec![0.2, 0.8]]).unwrap();
    hmm.set_state_distribution(0, b0.into()).unwrap();
    hmm.set_state_distribution(1, b1.into()).unwrap();
    hmm
}

fn random_symbols(len: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = SecureRng::with_seed(seed);
    (0..len).map(|_| vec![rng.gen_range(0..2) as f64]).collect()
}

/// Forward-backward stability
#[cfg(test)]
mod forward_backward_stability {
    use super::*;

    #[test]
    fn test_scaled_pass_survives_long_sequences() {
        let hmm = coin_model();
        let sequence = random_symbols(10_000, 1);

        // The plain pass underflows to zero...
        let plain = ForwardBackwardCalculator::forward(&sequence, &hmm).unwrap();
        assert_eq!(plain.probability(), 0.0);

        // ...while the scaled pass stays finite and bounded per observation.
        let scaled = ForwardBackwardScaledCalculator::forward_backward(&sequence, &hmm).unwrap();
        let ln_p = scaled.ln_probability();
        assert!(ln_p.is_finite());
        assert!(ln_p < 0.0);
        let per_observation = ln_p / sequence.len() as f64;
        assert!(per_observation > 0.1f64.ln() && per_observation < 0.0);

        assert!(scaled.scale_factors().iter().all(|&c| c > 0.0 && c.is_finite()));
        let posteriors = scaled.posteriors().unwrap();
        for row in &posteriors {
            assert!(row.iter().all(|p| p.is_finite() && *p >= 0.0));
            assert_approx_eq!(row.iter().sum::<f64>(), 1.0, 1e-9);
        }
    }

    #[test]
    fn test_scaled_matches_plain_on_short_sequences() {
        let hmm = coin_model();
        for len in [1, 2, 5, 20, 100] {
            let sequence = random_symbols(len, len as u64);
            let plain = ForwardBackwardCalculator::forward_backward(&sequence, &hmm).unwrap();
            let scaled =
                ForwardBackwardScaledCalculator::forward_backward(&sequence, &hmm).unwrap();
            assert_approx_eq!(plain.probability().ln(), scaled.ln_probability(), 1e-9);

            // Plain posteriors αβ/P agree with the scaled ones.
            let alpha = plain.alpha();
            let beta = plain.beta().unwrap();
            for t in 0..len {
                for i in 0..2 {
                    let expected = alpha[t][i] * beta[t][i] / plain.probability();
                    assert_approx_eq!(scaled.posterior(t, i).unwrap(), expected, 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_near_deterministic_model() {
        // Tiny but non-zero probabilities must not produce NaN.
        let mut hmm = HiddenMarkovModel::new_discrete(2, &[2]).unwrap();
        hmm.set_initial_probabilities(vec![1.0 - 1e-12, 1e-12], 1e-9)
            .unwrap();
        hmm.set_transition_row(0, vec![1.0 - 1e-12, 1e-12], 1e-9)
            .unwrap();
        hmm.set_transition_row(1, vec![1e-12, 1.0 - 1e-12], 1e-9)
            .unwrap();
        let b0 = DiscreteDistribution::from_probabilities(vec![vec![1.0 - 1e-12, 1e-12]]).unwrap();
        let b1 = DiscreteDistribution::from_probabilities(vec![vec![1e-12, 1.0 - 1e-12]]).unwrap();
        hmm.set_state_distribution(0, b0.into()).unwrap();
        hmm.set_state_distribution(1, b1.into()).unwrap();

        let sequence = random_symbols(2_000, 9);
        let ln_p = hmm.ln_probability(&sequence).unwrap();
        assert!(ln_p.is_finite());
        let path = hmm.states_for_sequence(&sequence).unwrap();
        assert_eq!(path.len(), sequence.len());
    }

    #[test]
    fn test_gaussian_far_outliers() {
        let mut hmm = HiddenMarkovModel::new_continuous(2, 1).unwrap();
        let wide = GaussianDistribution::new(vec![0.0], vec![vec![100.0]]).unwrap();
        hmm.set_state_distribution(1, wide.into()).unwrap();

        // Density of the standard state underflows; the wide one carries the sequence.
        let sequence = vec![vec![0.0], vec![60.0], vec![0.5]];
        let ln_p = hmm.ln_probability(&sequence).unwrap();
        assert!(ln_p.is_finite());
        let path = hmm.states_for_sequence(&sequence).unwrap();
        assert_eq!(path[1], 1);
    }
}

/// Viterbi stability
#[cfg(test)]
mod viterbi_stability {
    use super::*;

    #[test]
    fn test_log_space_decoding_of_long_sequences() {
        let hmm = coin_model();
        let sequence = random_symbols(10_000, 2);
        let viterbi = ViterbiCalculator::new(&sequence, &hmm).unwrap();
        assert_eq!(viterbi.state_sequence().len(), 10_000);
        assert!(viterbi.ln_probability().is_finite());

        // The best path can never be more likely than all paths together.
        let ln_p = hmm.ln_probability(&sequence).unwrap();
        assert!(viterbi.ln_probability() <= ln_p + 1e-9);
    }

    #[test]
    fn test_path_probability_matches_decoder_on_short_sequences() {
        let hmm = coin_model();
        let sequence = random_symbols(12, 3);
        let viterbi = ViterbiCalculator::new(&sequence, &hmm).unwrap();
        let joint = hmm
            .probability_of_path(&sequence, viterbi.state_sequence())
            .unwrap();
        assert_approx_eq!(joint.ln(), viterbi.ln_probability(), 1e-9);
    }

    #[test]
    fn test_underflowing_gaussian_emissions_decode_in_log_space() {
        // Every linear density at 40 is zero; the log densities still rank the states.
        let mut hmm = HiddenMarkovModel::new_continuous(2, 1).unwrap();
        let high = GaussianDistribution::new(vec![100.0], vec![vec![1.0]]).unwrap();
        hmm.set_state_distribution(1, high.into()).unwrap();

        let sequence = vec![vec![100.0], vec![40.0], vec![100.0]];
        let viterbi = ViterbiCalculator::new(&sequence, &hmm).unwrap();
        assert_eq!(viterbi.state_sequence(), &[1, 0, 1]);
        assert!(viterbi.ln_probability().is_finite());

        let ln_p = hmm.ln_probability(&sequence).unwrap();
        assert!(ln_p.is_finite());
        assert!(viterbi.ln_probability() <= ln_p + 1e-9);
    }

    #[test]
    fn test_impossible_sequence_still_returns_a_path() {
        let mut hmm = coin_model();
        let certain = DiscreteDistribution::from_probabilities(vec![vec![1.0, 0.0]]).unwrap();
        hmm.set_state_distribution(0, certain.clone().into()).unwrap();
        hmm.set_state_distribution(1, certain.into()).unwrap();

        let sequence = vec![vec![0.0], vec![1.0], vec![0.0]];
        let viterbi = ViterbiCalculator::new(&sequence, &hmm).unwrap();
        assert_eq!(viterbi.state_sequence().len(), 3);
        assert_eq!(viterbi.ln_probability(), f64::NEG_INFINITY);
    }
}

/// Training stability
#[cfg(test)]
mod training_stability {
    use super::*;

    fn constant_regimes() -> SequenceCorpus {
        // Each regime repeats one value exactly: the fitted covariances are singular.
        let sequence: Vec<Vec<f64>> = [1.0, 1.0, 8.0, 8.0]
            .iter()
            .map(|&x| vec![x])
            .collect();
        SequenceCorpus::new(vec![sequence.clone(), sequence]).unwrap()
    }

    #[test]
    fn test_degenerate_clusters_fail_without_regularization() {
        let template = HiddenMarkovModel::new_continuous(2, 1).unwrap();
        let mut trainer =
            KMeansTrainer::new(&template, constant_regimes(), TrainingConfig::default())
                .unwrap();
        assert!(matches!(
            trainer.iteration(),
            Err(HmmError::SingularCovariance { .. })
        ));
    }

    #[test]
    fn test_regularization_rescues_degenerate_clusters() {
        let template = HiddenMarkovModel::new_continuous(2, 1)
            .unwrap()
            .with_covariance_regularization(1e-3);
        let mut trainer =
            KMeansTrainer::new(&template, constant_regimes(), TrainingConfig::default())
                .unwrap();
        let outcome = trainer.train(20).unwrap();
        assert!(outcome.converged());

        let model = trainer.model();
        for i in 0..2 {
            match model.state_distribution(i) {
                StateDistribution::Continuous(g) => {
                    assert_approx_eq!(g.covariance()[0][0], 1e-3, 1e-12);
                    let m = g.mean()[0];
                    assert!((m - 1.0).abs() < 1e-9 || (m - 8.0).abs() < 1e-9, "mean {}", m);
                }
                other => panic!("unexpected distribution {:?}", other),
            }
        }
        let ln_p = model.ln_probability(constant_regimes().sequence(0)).unwrap();
        assert!(ln_p.is_finite());
    }

    #[test]
    fn test_baum_welch_on_long_sequences_stays_finite() {
        let hmm = coin_model();
        let mut rng = SecureRng::with_seed(17);
        let corpus = SequenceGenerator::new(&hmm)
            .unwrap()
            .corpus(2, 5_000, &mut rng)
            .unwrap();
        let mut trainer = BaumWelchTrainer::new(coin_model(), corpus, TrainingConfig::quick())
            .unwrap();
        trainer.train(5).unwrap();
        let ln_l = trainer.ln_likelihood().unwrap();
        assert!(ln_l.is_finite() && ln_l < 0.0);
        trainer.model().validate_parameters(1e-9).unwrap();
    }
}

use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::Result;

/// Fills `weights` following Glorot (Xavier) uniform initialization.
///
/// # Arguments
/// * `rng` - A random number generator.
/// * `weights` - The buffer to fill.
/// * `fan_in` - The number of input units in the weight tensor.
/// * `fan_out` - The number of output units in the weight tensor.
///
/// # Returns
/// An error if the calculated range is invalid.
pub fn glorot_uniform<R: Rng + ?Sized>(
    rng: &mut R,
    weights: &mut [f32],
    fan_in: usize,
    fan_out: usize,
) -> Result<()> {
    let range = (6. / (fan_in + fan_out) as f32).sqrt();
    let distribution = Uniform::new(-range, range)?;

    weights
        .iter_mut()
        .for_each(|w| *w = distribution.sample(rng));

    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn glorot_stays_within_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut weights = vec![0.; 512];
        glorot_uniform(&mut rng, &mut weights, 9, 32).unwrap();

        let range = (6. / 41f32).sqrt();
        assert!(weights.iter().all(|w| w.abs() <= range));
        assert!(weights.iter().any(|w| *w != 0.));
    }

    #[test]
    fn zero_fans_are_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut weights = vec![0.; 4];
        assert!(glorot_uniform(&mut rng, &mut weights, 0, 0).is_err());
    }
}

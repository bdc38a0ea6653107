use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Plain stochastic gradient descent, `w -= learning_rate * g`.
#[derive(Debug, Clone, Copy)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

impl Optimizer for GradientDescent {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;

        params
            .iter_mut()
            .zip(grad)
            .for_each(|(w, g)| *w -= self.learning_rate * g);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_against_the_gradient() {
        let mut gd = GradientDescent::new(0.5);
        let mut params = [1., 1.];
        gd.update_params(&[2., -2.], &mut params).unwrap();
        assert_eq!(params, [0., 2.]);
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let mut gd = GradientDescent::new(0.5);
        assert!(gd.update_params(&[1.], &mut [0., 0.]).is_err());
    }
}

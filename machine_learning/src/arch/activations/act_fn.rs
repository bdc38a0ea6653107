use super::{Relu, Sigmoid};

/// An element wise activation applied at the output of a parametric layer.
#[derive(Clone, Debug)]
pub enum ActFn {
    Relu(Relu),
    Sigmoid(Sigmoid),
}

impl ActFn {
    pub fn relu() -> Self {
        Self::Relu(Relu)
    }

    pub fn sigmoid(amp: f32) -> Self {
        Self::Sigmoid(Sigmoid::new(amp))
    }

    pub fn f(&self, x: f32) -> f32 {
        match self {
            Self::Relu(a) => a.f(x),
            Self::Sigmoid(a) => a.f(x),
        }
    }

    pub fn df(&self, x: f32) -> f32 {
        match self {
            Self::Relu(a) => a.df(x),
            Self::Sigmoid(a) => a.df(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_clips_negatives() {
        let act = ActFn::relu();
        assert_eq!(act.f(-3.0), 0.0);
        assert_eq!(act.f(2.5), 2.5);
        assert_eq!(act.df(-1.0), 0.0);
        assert_eq!(act.df(1.0), 1.0);
    }

    #[test]
    fn sigmoid_derivative_peaks_at_zero() {
        let act = ActFn::sigmoid(1.0);
        assert!((act.f(0.0) - 0.5).abs() < 1e-6);
        assert!((act.df(0.0) - 0.25).abs() < 1e-6);
        assert!(act.df(4.0) < act.df(0.0));
    }
}

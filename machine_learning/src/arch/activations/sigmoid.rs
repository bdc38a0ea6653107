/// Logistic curve scaled by `amp`, `amp / (1 + e^-z)`.
#[derive(Clone, Copy, Debug)]
pub struct Sigmoid {
    amp: f32,
}

impl Default for Sigmoid {
    fn default() -> Self {
        Self::new(1.)
    }
}

impl Sigmoid {
    pub fn new(amp: f32) -> Self {
        Self { amp }
    }

    /// The unscaled logistic, computed so that `e^x` never overflows.
    fn logistic(z: f32) -> f32 {
        if z >= 0. {
            1. / (1. + (-z).exp())
        } else {
            let e = z.exp();
            e / (1. + e)
        }
    }

    pub fn f(&self, z: f32) -> f32 {
        self.amp * Self::logistic(z)
    }

    pub fn df(&self, z: f32) -> f32 {
        let s = Self::logistic(z);
        self.amp * s * (1. - s)
    }
}

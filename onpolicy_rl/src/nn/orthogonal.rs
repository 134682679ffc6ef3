//! Linear layer with orthogonal weight initialization.
//!
//! Actor-critic networks initialize hidden layers with gain `sqrt(2)`, the
//! value head with gain 1 and the action head with a small gain (0.01) so
//! the initial policy is close to uniform.

use burn::module::{Module, Param};
use burn::prelude::*;
use burn::tensor::Distribution;

/// Configuration for [`OrthogonalLinear`].
#[derive(Debug, Clone)]
pub struct OrthogonalLinearConfig {
    pub d_input: usize,
    pub d_output: usize,
    /// Scale applied to the orthonormal matrix.
    pub gain: f64,
}

impl OrthogonalLinearConfig {
    pub fn new(d_input: usize, d_output: usize) -> Self {
        Self {
            d_input,
            d_output,
            gain: 1.0,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    /// Orthogonal weights, zero bias.
    pub fn init<B: Backend>(&self, device: &B::Device) -> OrthogonalLinear<B> {
        let weight = orthogonal_weights::<B>(self.d_output, self.d_input, self.gain, device);
        OrthogonalLinear {
            weight: Param::from_tensor(weight),
            bias: Param::from_tensor(Tensor::zeros([self.d_output], device)),
        }
    }
}

/// `y = x Wᵀ + b` with `W: [d_output, d_input]`.
#[derive(Module, Debug)]
pub struct OrthogonalLinear<B: Backend> {
    pub weight: Param<Tensor<B, 2>>,
    pub bias: Param<Tensor<B, 1>>,
}

impl<B: Backend> OrthogonalLinear<B> {
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        input.matmul(self.weight.val().transpose()) + self.bias.val().unsqueeze_dim(0)
    }

    pub fn d_input(&self) -> usize {
        self.weight.val().dims()[1]
    }

    pub fn d_output(&self) -> usize {
        self.weight.val().dims()[0]
    }
}

/// Random `[rows, cols]` matrix with orthonormal rows (or columns, whichever
/// is the shorter side), scaled by `gain`.
///
/// Gram-Schmidt over the shorter side of a standard normal draw.
pub fn orthogonal_weights<B: Backend>(
    rows: usize,
    cols: usize,
    gain: f64,
    device: &B::Device,
) -> Tensor<B, 2> {
    let (short, long) = if rows <= cols { (rows, cols) } else { (cols, rows) };

    // Each of the `short` vectors has length `long`.
    let draw = Tensor::<B, 2>::random([short, long], Distribution::Normal(0.0, 1.0), device);
    let mut basis: Vec<Tensor<B, 2>> = Vec::with_capacity(short);
    for i in 0..short {
        let mut v = draw.clone().slice([i..i + 1, 0..long]);
        for u in &basis {
            let projection = (v.clone() * u.clone()).sum();
            v = v - u.clone() * projection.unsqueeze::<2>();
        }
        let norm = v.clone().powf_scalar(2.0).sum().sqrt().clamp_min(1e-10);
        basis.push(v / norm.unsqueeze::<2>());
    }

    let stacked = Tensor::cat(basis, 0).mul_scalar(gain as f32);
    if rows <= cols {
        stacked
    } else {
        stacked.transpose()
    }
}

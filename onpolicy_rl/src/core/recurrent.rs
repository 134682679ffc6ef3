//! GRU cell with episode-boundary resets.
//!
//! Burn ships no GRU cell, so it is built from six linear maps. The policy
//! unrolls it one step at a time; a mask of zero for an environment wipes
//! that environment's state before the step.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Configuration for [`GruCell`].
#[derive(Debug, Clone)]
pub struct GruCellConfig {
    pub d_input: usize,
    pub d_hidden: usize,
}

impl GruCellConfig {
    pub fn new(d_input: usize, d_hidden: usize) -> Self {
        Self { d_input, d_hidden }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> GruCell<B> {
        let input_map = || LinearConfig::new(self.d_input, self.d_hidden).init(device);
        let hidden_map = || {
            LinearConfig::new(self.d_hidden, self.d_hidden)
                .with_bias(false)
                .init(device)
        };

        GruCell {
            reset_input: input_map(),
            reset_hidden: hidden_map(),
            update_input: input_map(),
            update_hidden: hidden_map(),
            candidate_input: input_map(),
            candidate_hidden: hidden_map(),
            d_hidden: self.d_hidden,
        }
    }
}

/// Gated recurrent unit.
///
/// ```text
/// r  = σ(W_ir x + W_hr h + b_r)
/// z  = σ(W_iz x + W_hz h + b_z)
/// n  = tanh(W_in x + r ⊙ (W_hn h) + b_n)
/// h' = (1 - z) ⊙ n + z ⊙ h
/// ```
#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    reset_input: Linear<B>,
    reset_hidden: Linear<B>,
    update_input: Linear<B>,
    update_hidden: Linear<B>,
    candidate_input: Linear<B>,
    candidate_hidden: Linear<B>,
    #[module(skip)]
    d_hidden: usize,
}

impl<B: Backend> GruCell<B> {
    /// One step: `[batch, d_input]`, `[batch, d_hidden]` → `[batch, d_hidden]`.
    pub fn step(&self, input: Tensor<B, 2>, hidden: Tensor<B, 2>) -> Tensor<B, 2> {
        let r = sigmoid(
            self.reset_input.forward(input.clone()) + self.reset_hidden.forward(hidden.clone()),
        );
        let z = sigmoid(
            self.update_input.forward(input.clone()) + self.update_hidden.forward(hidden.clone()),
        );
        let n = (self.candidate_input.forward(input) + r * self.candidate_hidden.forward(hidden.clone()))
            .tanh();

        let keep = z.clone();
        (z.neg() + 1.0) * n + keep * hidden
    }

    /// One step after zeroing the state of rows whose mask is zero.
    ///
    /// `masks` is `[batch, 1]` and broadcasts over the hidden width.
    pub fn step_masked(
        &self,
        input: Tensor<B, 2>,
        hidden: Tensor<B, 2>,
        masks: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        self.step(input, hidden * masks)
    }

    /// Unroll over time-major rows.
    ///
    /// `inputs` and `masks` hold `T * n` rows ordered `t * n + i`; `initial`
    /// holds the `n` starting states. Returns every step's output in the same
    /// row order, plus the final state.
    pub fn unroll(
        &self,
        inputs: Tensor<B, 2>,
        initial: Tensor<B, 2>,
        masks: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [rows, d_input] = inputs.dims();
        let [n, _] = initial.dims();
        let steps = rows / n;

        let mut hidden = initial;
        let mut outputs = Vec::with_capacity(steps);
        for t in 0..steps {
            let range = t * n..(t + 1) * n;
            let x_t = inputs.clone().slice([range.clone(), 0..d_input]);
            let m_t = masks.clone().slice([range, 0..1]);
            hidden = self.step_masked(x_t, hidden, m_t);
            outputs.push(hidden.clone());
        }

        (Tensor::cat(outputs, 0), hidden)
    }

    pub fn hidden_size(&self) -> usize {
        self.d_hidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TB = NdArray<f32>;

    fn floats(t: Tensor<TB, 2>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_step_shape() {
        let device = Default::default();
        let cell = GruCellConfig::new(4, 8).init::<TB>(&device);
        let x = Tensor::<TB, 2>::random([3, 4], Distribution::Normal(0.0, 1.0), &device);
        let h = Tensor::<TB, 2>::zeros([3, 8], &device);
        assert_eq!(cell.step(x, h).dims(), [3, 8]);
    }

    #[test]
    fn test_output_bounded() {
        // Convex combination of tanh output and a zero state stays in (-1, 1)
        let device = Default::default();
        let cell = GruCellConfig::new(2, 5).init::<TB>(&device);
        let x = Tensor::<TB, 2>::random([6, 2], Distribution::Normal(0.0, 10.0), &device);
        let h = cell.step(x, Tensor::zeros([6, 5], &device));
        assert!(floats(h).iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_zero_mask_matches_fresh_state() {
        let device = Default::default();
        let cell = GruCellConfig::new(3, 4).init::<TB>(&device);
        let x = Tensor::<TB, 2>::random([2, 3], Distribution::Normal(0.0, 1.0), &device);
        let stale = Tensor::<TB, 2>::random([2, 4], Distribution::Normal(0.0, 1.0), &device);

        let masked = cell.step_masked(x.clone(), stale, Tensor::zeros([2, 1], &device));
        let fresh = cell.step(x, Tensor::zeros([2, 4], &device));
        assert_eq!(floats(masked), floats(fresh));
    }

    #[test]
    fn test_unroll_matches_manual_steps() {
        let device = Default::default();
        let cell = GruCellConfig::new(2, 3).init::<TB>(&device);
        // T = 3 steps, n = 2 sequences
        let inputs = Tensor::<TB, 2>::random([6, 2], Distribution::Normal(0.0, 1.0), &device);
        let masks = Tensor::<TB, 1>::from_floats([1.0, 1.0, 0.0, 1.0, 1.0, 1.0], &device)
            .reshape([6, 1]);
        let h0 = Tensor::<TB, 2>::random([2, 3], Distribution::Normal(0.0, 1.0), &device);

        let (outputs, last) = cell.unroll(inputs.clone(), h0.clone(), masks.clone());
        assert_eq!(outputs.dims(), [6, 3]);

        let mut h = h0;
        for t in 0..3 {
            h = cell.step_masked(
                inputs.clone().slice([t * 2..t * 2 + 2, 0..2]),
                h,
                masks.clone().slice([t * 2..t * 2 + 2, 0..1]),
            );
        }
        assert_eq!(floats(last), floats(h));
        assert_eq!(floats(outputs.slice([4..6, 0..3])).len(), 6);
    }
}

//! The feed-forward regressor.

use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

/// Three ReLU hidden layers into a single linear output. The output lives
/// in log1p target space; the artifact wrapper undoes the transform.
#[derive(Module, Debug)]
pub struct FuelNet<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    out: Linear<B>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct FuelNetConfig {
    pub n_features: usize,
    #[config(default = 64)]
    pub hidden1: usize,
    #[config(default = 32)]
    pub hidden2: usize,
    #[config(default = 16)]
    pub hidden3: usize,
}

impl FuelNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FuelNet<B> {
        FuelNet {
            fc1: LinearConfig::new(self.n_features, self.hidden1).init(device),
            fc2: LinearConfig::new(self.hidden1, self.hidden2).init(device),
            fc3: LinearConfig::new(self.hidden2, self.hidden3).init(device),
            out: LinearConfig::new(self.hidden3, 1).init(device),
            activation: Relu::new(),
        }
    }

    pub fn hidden_sizes(&self) -> [usize; 3] {
        [self.hidden1, self.hidden2, self.hidden3]
    }
}

impl<B: Backend> FuelNet<B> {
    /// `[batch, n_features] → [batch, 1]`, in log1p space.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.activation.forward(self.fc2.forward(x));
        let x = self.activation.forward(self.fc3.forward(x));
        self.out.forward(x)
    }
}

use serde::{Deserialize, Serialize};
use tch::{Device, Tensor, nn, nn::Module};

use crate::error::{Error, Result};

/// 输出层激活函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Identity,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    pub fn apply(self, xs: &Tensor) -> Tensor {
        match self {
            Activation::Identity => xs.shallow_clone(),
            Activation::Relu => xs.relu(),
            Activation::Tanh => xs.tanh(),
            Activation::Sigmoid => xs.sigmoid(),
        }
    }
}

/// Builds a stack of `Linear` layers of the given sizes, with ReLU between
/// hidden layers and `output` after the last one.
///
/// Layers are registered under `path` as `layer0`, `layer1`, ...
pub fn construct_nn(path: &nn::Path, sizes: &[i64], output: Activation) -> Result<nn::Sequential> {
    if sizes.len() < 2 {
        return Err(Error::invalid_config(format!(
            "network needs at least an input and an output size, got {sizes:?}"
        )));
    }
    if sizes.iter().any(|&s| s <= 0) {
        return Err(Error::invalid_config(format!(
            "layer sizes must be positive, got {sizes:?}"
        )));
    }

    let last = sizes.len() - 2;
    let mut model = nn::seq();
    for (i, dims) in sizes.windows(2).enumerate() {
        model = model.add(nn::linear(
            path / format!("layer{i}"),
            dims[0],
            dims[1],
            Default::default(),
        ));
        let act = if i < last { Activation::Relu } else { output };
        if act != Activation::Identity {
            model = model.add_fn(move |xs| act.apply(xs));
        }
    }
    Ok(model)
}

pub struct MLP {
    pub model: nn::Sequential,
    pub var_store: nn::VarStore, // 参数, save/load 与 target 同步都走这里
}

impl MLP {
    pub fn new(vs: nn::VarStore, sizes: &[i64], output: Activation) -> Result<Self> {
        let model = construct_nn(&vs.root(), sizes, output)?;
        Ok(MLP {
            model,
            var_store: vs,
        })
    }

    /// Shortcut for `input -> hidden... -> output`.
    pub fn with_hidden(
        vs: nn::VarStore,
        input_dim: usize,
        hidden: &[i64],
        output_dim: usize,
        output: Activation,
    ) -> Result<Self> {
        let mut sizes = Vec::with_capacity(hidden.len() + 2);
        sizes.push(input_dim as i64);
        sizes.extend_from_slice(hidden);
        sizes.push(output_dim as i64);
        Self::new(vs, &sizes, output)
    }

    pub fn forward(&self, xs: &Tensor) -> Tensor {
        self.model.forward(xs)
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.var_store
    }

    pub fn device(&self) -> Device {
        self.var_store.device()
    }
}

pub mod mlp;

pub use mlp::{Activation, MLP, construct_nn};

use tch::nn;

use crate::error::{Error, Result};

/// Copy every variable of `source` into `target`.
pub fn hard_update(target: &mut nn::VarStore, source: &nn::VarStore) -> Result<()> {
    target.copy(source)?;
    Ok(())
}

/// Polyak averaging: `target = tau * source + (1 - tau) * target`.
pub fn soft_update(target: &nn::VarStore, source: &nn::VarStore, tau: f64) -> Result<()> {
    let source = source.variables();
    tch::no_grad(|| {
        for (name, mut dst) in target.variables() {
            let src = source
                .get(&name)
                .ok_or_else(|| Error::MissingVariable(name.clone()))?;
            let mixed = src * tau + &dst * (1.0 - tau);
            dst.copy_(&mixed);
        }
        Ok(())
    })
}

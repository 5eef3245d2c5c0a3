pub mod ddqn;
pub mod td3;

use rand::SeedableRng;
use rand::rngs::StdRng;

/// Seeds torch's global generator too when a seed is given.
pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => {
            tch::manual_seed(seed as i64);
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_os_rng(),
    }
}

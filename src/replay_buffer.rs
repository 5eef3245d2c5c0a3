use rand::Rng;
use tch::{Device, Kind, Tensor};

use crate::error::{Error, Result};

/// 一批采样结果
pub struct Batch {
    /// `[batch, obs_dim]`
    pub obs: Tensor,
    /// `[batch, act_dim]`
    pub act: Tensor,
    /// `[batch]`
    pub rew: Tensor,
    /// `[batch, obs_dim]`
    pub next_obs: Tensor,
    /// `[batch]`, 1.0 for terminal transitions
    pub done: Tensor,
}

/// Fixed-capacity transition store backed by preallocated tensors.
///
/// When full, new transitions overwrite the oldest ones.
pub struct ReplayBuffer {
    obs_buf: Tensor,
    act_buf: Tensor,
    rew_buf: Tensor,
    next_obs_buf: Tensor,
    done_buf: Tensor,
    obs_dim: usize,
    act_dim: usize,
    ptr: usize,
    size: usize,
    capacity: usize,
    device: Device,
}

fn check_width(field: &'static str, t: &Tensor, expected: usize) -> Result<()> {
    let actual = t.numel();
    if actual != expected {
        return Err(Error::ShapeMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

impl ReplayBuffer {
    pub fn new(obs_dim: usize, act_dim: usize, capacity: usize, device: Device) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_config("replay buffer capacity must be positive"));
        }
        if obs_dim == 0 || act_dim == 0 {
            return Err(Error::invalid_config(
                "replay buffer dimensions must be positive",
            ));
        }

        let options = (Kind::Float, device);
        let cap = capacity as i64;

        Ok(ReplayBuffer {
            obs_buf: Tensor::zeros([cap, obs_dim as i64], options),
            act_buf: Tensor::zeros([cap, act_dim as i64], options),
            rew_buf: Tensor::zeros([cap], options),
            next_obs_buf: Tensor::zeros([cap, obs_dim as i64], options),
            done_buf: Tensor::zeros([cap], options),
            obs_dim,
            act_dim,
            ptr: 0,
            size: 0,
            capacity,
            device,
        })
    }

    /// Store one transition at the cursor.
    pub fn put(
        &mut self,
        obs: &Tensor,
        act: &Tensor,
        rew: f32,
        next_obs: &Tensor,
        done: bool,
    ) -> Result<()> {
        check_width("obs", obs, self.obs_dim)?;
        check_width("act", act, self.act_dim)?;
        check_width("next_obs", next_obs, self.obs_dim)?;

        let row = self.ptr as i64;
        let flat = |t: &Tensor| t.reshape([-1]).to_kind(Kind::Float).to_device(self.device);

        tch::no_grad(|| {
            self.obs_buf.get(row).copy_(&flat(obs));
            self.act_buf.get(row).copy_(&flat(act));
            self.rew_buf.get(row).fill_(rew as f64);
            self.next_obs_buf.get(row).copy_(&flat(next_obs));
            self.done_buf.get(row).fill_(if done { 1.0 } else { 0.0 });
        });

        self.ptr = (self.ptr + 1) % self.capacity;
        self.size = (self.size + 1).min(self.capacity);
        Ok(())
    }

    /// Sample `batch_size` transitions uniformly, with replacement.
    pub fn sample_batch<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Batch> {
        if self.size == 0 {
            return Err(Error::EmptyBuffer);
        }

        let idx: Vec<i64> = (0..batch_size)
            .map(|_| rng.random_range(0..self.size) as i64)
            .collect();
        let idx = Tensor::from_slice(&idx).to_device(self.device);

        Ok(Batch {
            obs: self.obs_buf.index_select(0, &idx),
            act: self.act_buf.index_select(0, &idx),
            rew: self.rew_buf.index_select(0, &idx),
            next_obs: self.next_obs_buf.index_select(0, &idx),
            done: self.done_buf.index_select(0, &idx),
        })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn put_index(buffer: &mut ReplayBuffer, i: usize) {
        let v = i as f32;
        buffer.put(
            &Tensor::from_slice(&[v, v]),
            &Tensor::from_slice(&[v]),
            v,
            &Tensor::from_slice(&[v + 0.5, v + 0.5]),
            i % 2 == 0,
        )
        .unwrap();
    }

    #[test]
    fn size_saturates_at_capacity() {
        let mut buffer = ReplayBuffer::new(2, 1, 3, Device::Cpu).unwrap();
        assert!(buffer.is_empty());
        for i in 0..5 {
            put_index(&mut buffer, i);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.capacity(), 3);
    }

    #[test]
    fn oldest_entries_are_overwritten() {
        let mut buffer = ReplayBuffer::new(2, 1, 3, Device::Cpu).unwrap();
        for i in 0..5 {
            put_index(&mut buffer, i);
        }

        let mut rng = StdRng::seed_from_u64(7);
        let batch = buffer.sample_batch(64, &mut rng).unwrap();
        let rewards = Vec::<f32>::try_from(&batch.rew).unwrap();
        assert!(rewards.iter().all(|r| [2.0, 3.0, 4.0].contains(r)));

        // each row stays consistent across the stored fields
        let obs = Vec::<f32>::try_from(&batch.obs.select(1, 0)).unwrap();
        let next_obs = Vec::<f32>::try_from(&batch.next_obs.select(1, 1)).unwrap();
        let done = Vec::<f32>::try_from(&batch.done).unwrap();
        for i in 0..rewards.len() {
            assert_eq!(obs[i], rewards[i]);
            assert_eq!(next_obs[i], rewards[i] + 0.5);
            let expected_done = if rewards[i] as usize % 2 == 0 { 1.0 } else { 0.0 };
            assert_eq!(done[i], expected_done);
        }
    }

    #[test]
    fn batch_shapes() {
        let mut buffer = ReplayBuffer::new(2, 1, 10, Device::Cpu).unwrap();
        put_index(&mut buffer, 1);
        let batch = buffer.sample_batch(8, &mut rand::rng()).unwrap();
        assert_eq!(batch.obs.size(), vec![8, 2]);
        assert_eq!(batch.act.size(), vec![8, 1]);
        assert_eq!(batch.rew.size(), vec![8]);
        assert_eq!(batch.next_obs.size(), vec![8, 2]);
        assert_eq!(batch.done.size(), vec![8]);
    }

    #[test]
    fn empty_buffer_cannot_be_sampled() {
        let buffer = ReplayBuffer::new(2, 1, 10, Device::Cpu).unwrap();
        assert!(matches!(
            buffer.sample_batch(4, &mut rand::rng()),
            Err(Error::EmptyBuffer)
        ));
    }

    #[test]
    fn wrong_widths_are_rejected() {
        let mut buffer = ReplayBuffer::new(2, 1, 4, Device::Cpu).unwrap();
        let obs = Tensor::from_slice(&[1.0f32, 2.0]);
        let wide = Tensor::from_slice(&[1.0f32, 2.0, 3.0]);
        let act = Tensor::from_slice(&[0.0f32]);

        let err = buffer.put(&wide, &act, 0.0, &obs, false).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch { field: "obs", expected: 2, actual: 3 }
        ));
        assert!(buffer.put(&obs, &wide, 0.0, &obs, false).is_err());
        assert!(buffer.put(&obs, &act, 0.0, &wide, false).is_err());
        assert!(buffer.is_empty());

        // [1, 2] rows from ToTensor are accepted
        buffer
            .put(&obs.unsqueeze(0), &act, 1.0, &obs.unsqueeze(0), true)
            .unwrap();
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(ReplayBuffer::new(2, 1, 0, Device::Cpu).is_err());
    }
}
